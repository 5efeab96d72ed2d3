use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The persisted, on-the-wire shape of a request body. Every variant here
/// is safe to store and replay byte-for-byte; `serialize_body` is the only
/// place a plain value is turned into one of these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Body {
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Multipart(Vec<(String, Body)>),
    UrlEncoded(Vec<(String, String)>),
    /// JSON text produced from a plain mapping by [`serialize_body`].
    /// Stored as text, not as a `Value`, so replay never re-encodes it.
    Json(String),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// The bytes that should be written to the wire when this body is
    /// replayed as a single entity. Never re-encodes: whatever was
    /// persisted is sent as-is. Not meaningful for `Multipart`, which has
    /// no flat byte form — a real client builds a framed `multipart/form-data`
    /// body from its parts instead (see `restsync-net::http_client`).
    pub fn as_wire_bytes(&self) -> Vec<u8> {
        match self {
            Body::Empty => Vec::new(),
            Body::Text(text) | Body::Json(text) => text.clone().into_bytes(),
            Body::Bytes(bytes) => bytes.clone(),
            Body::UrlEncoded(pairs) => serde_urlencoded_like(pairs).into_bytes(),
            Body::Multipart(parts) => {
                let mut buf = Vec::new();
                for (name, part) in parts {
                    buf.extend_from_slice(name.as_bytes());
                    buf.push(b'=');
                    buf.extend_from_slice(&part.as_wire_bytes());
                    buf.push(b'&');
                }
                buf
            }
        }
    }
}

fn serde_urlencoded_like(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// The shapes a caller is allowed to hand the mediator as a request body.
/// Everything except `Map` is structured-clone-safe in the browser sense
/// (fidelity-preserving) and is stored as-is; `Map` is the one shape that
/// must be JSON-stringified before it can be persisted.
#[derive(Debug, Clone)]
pub enum BodyInput {
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Multipart(Vec<(String, Body)>),
    UrlEncoded(Vec<(String, String)>),
    Map(IndexMap<String, Value>),
}

/// Identity for every native body shape; JSON-stringifies a plain mapping.
/// Callers passing `Map` are responsible for setting a matching
/// `Content-Type: application/json` header themselves.
pub fn serialize_body(input: BodyInput) -> Body {
    match input {
        BodyInput::Empty => Body::Empty,
        BodyInput::Text(text) => Body::Text(text),
        BodyInput::Bytes(bytes) => Body::Bytes(bytes),
        BodyInput::Multipart(parts) => Body::Multipart(parts),
        BodyInput::UrlEncoded(pairs) => Body::UrlEncoded(pairs),
        BodyInput::Map(map) => {
            let value = Value::Object(map.into_iter().collect());
            Body::Json(value.to_string())
        }
    }
}
