use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use restsync_util::{Body, Priority};

/// HTTP method of a queued request, upper-cased on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// The only persisted entity in the system. Created by the mediator on
/// enqueue, optionally mutated by the sync engine (`retry_count`
/// increments), and destroyed on success, permanent failure, exhausted
/// retries, or explicit cancellation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QueuedRequest {
    pub id: String,
    pub url: String,
    pub method: Method,
    pub headers: IndexMap<String, String>,
    pub body: Body,
    pub timestamp_ms: u64,
    pub retry_count: u32,
    pub priority: Priority,
}

/// The subset of [`QueuedRequest`] a caller supplies; the rest is assigned
/// by the queue manager on enqueue.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub id: Option<String>,
    pub url: String,
    pub method: Method,
    pub headers: IndexMap<String, String>,
    pub body: Body,
    pub priority: Priority,
}
