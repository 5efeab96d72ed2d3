use async_trait::async_trait;
use restsync_error::{make_err, Code, Error};
use restsync_store::{Method, QueuedRequest};
use restsync_util::Body;

/// A response as far as classification cares: the status code and the
/// raw body. Headers are discarded — nothing downstream of a replay
/// inspects them.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The seam the sync engine and the mediator's direct-path both execute
/// requests through. A network/DNS/timeout failure is reported as `Err`;
/// anything that got a response at all, including 4xx/5xx, is `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: &QueuedRequest) -> Result<HttpResponse, Error>;
}

/// The default client: a thin wrapper over `reqwest`.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        ReqwestHttpClient {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: &QueuedRequest) -> Result<HttpResponse, Error> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Multipart(parts) => builder.multipart(multipart_form(parts)?),
            other => builder.body(other.as_wire_bytes()),
        };
        let response = builder
            .send()
            .await
            .map_err(|err| make_err!(Code::Network, "request failed: {err}"))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| make_err!(Code::Network, "reading response body: {err}"))?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Builds a properly framed `multipart/form-data` body (boundary and part
/// headers included) from the stored parts. Built fresh on every replay —
/// the boundary is generated at send time, not persisted, since a stored
/// boundary would be meaningless across a different `reqwest::Client`.
fn multipart_form(parts: &[(String, Body)]) -> Result<reqwest::multipart::Form, Error> {
    let mut form = reqwest::multipart::Form::new();
    for (name, part) in parts {
        form = form.part(name.clone(), multipart_part(part)?);
    }
    Ok(form)
}

fn multipart_part(body: &Body) -> Result<reqwest::multipart::Part, Error> {
    match body {
        Body::Multipart(_) => Err(make_err!(
            Code::InvalidArgument,
            "multipart parts cannot themselves be multipart"
        )),
        Body::Text(text) | Body::Json(text) => Ok(reqwest::multipart::Part::text(text.clone())),
        other => Ok(reqwest::multipart::Part::bytes(other.as_wire_bytes())),
    }
}

/// Whether a response status warrants also persisting the request for
/// background replay, even though the direct call already ran. Used by
/// the mediator's online path, not the sync engine (which only ever sees
/// already-enqueued entries).
pub fn is_server_error(status: u16) -> bool {
    status >= 500
}

/// How the sync engine should react to a completed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// 401 with a refresh callback configured: retry the same entry after
    /// a successful refresh.
    RecoverableAuth,
    /// Removed from the queue and reported; never retried.
    Permanent,
    /// Backed off and retried, up to `max_retries`.
    Transient,
}

/// Classifies a completed HTTP attempt per the error classification
/// table: 2xx succeeds; 401 is recoverable only if a refresh callback is
/// configured, else permanent; 429 and 5xx are transient; every other
/// 4xx is permanent.
pub fn classify(status: u16, refresh_configured: bool) -> Outcome {
    if (200..300).contains(&status) {
        Outcome::Success
    } else if status == 401 {
        if refresh_configured {
            Outcome::RecoverableAuth
        } else {
            Outcome::Permanent
        }
    } else if status == 429 || (500..600).contains(&status) {
        Outcome::Transient
    } else {
        Outcome::Permanent
    }
}
