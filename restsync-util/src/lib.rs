//! UUID generation, exponential backoff with jitter, and body/header
//! normalization shared by the queue, sync engine, and mediator.

mod backoff;
mod body;
mod headers;
mod id;
mod priority;

pub use backoff::backoff;
pub use body::{serialize_body, Body, BodyInput};
pub use headers::{normalize_headers, HeaderInput};
pub use id::{new_id, now_ms};
pub use priority::Priority;
