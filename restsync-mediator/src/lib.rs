//! The public facade: one object a caller constructs, `send`s requests
//! through, and subscribes to for lifecycle events. Wires together the
//! durable store, queue manager, network monitor, and sync engine behind
//! a single entry point.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use restsync_config::MediatorConfig;
use restsync_error::Error;
use restsync_net::{
    is_server_error, EventBus, HttpClient, HttpProbe, NetworkMonitor, ReachabilityProbe,
    ReqwestHttpClient,
};
use restsync_queue::QueueManager;
use restsync_store::{DurableStore, Method, NewRequest, QueuedRequest};
use restsync_sync::{RefreshToken, SyncConfig, SyncEngine};
use restsync_util::{new_id, normalize_headers, now_ms, serialize_body, BodyInput, HeaderInput, Priority};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{event, Level};

pub use restsync_net::Event;
pub use restsync_store::Method as RequestMethod;

/// The native analogue of a service-worker `registration.sync.register`
/// tag: identifies the work a background runner resumes against the same
/// database path.
pub const BACKGROUND_REPLAY_TAG: &str = "rest-sync-queue";

/// What a caller hands `Mediator::send`.
pub struct SendInput {
    pub url: String,
    pub method: Method,
    pub headers: HeaderInput,
    pub body: BodyInput,
}

/// Options accepted alongside a `send` call; stripped before any HTTP
/// client invocation.
pub struct SendOptions {
    pub priority: Priority,
    pub id: Option<String>,
}

impl Default for SendOptions {
    fn default() -> Self {
        SendOptions {
            priority: Priority::Normal,
            id: None,
        }
    }
}

/// Either the real response from a direct call, or a synthesized
/// deferred-acceptance response for an enqueued one.
#[derive(Debug, Clone)]
pub struct MediatorResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: Vec<u8>,
}

/// Non-serializable construction hooks that sit alongside the
/// JSON5-loadable [`MediatorConfig`]: callbacks and trait objects a config
/// file cannot represent.
#[derive(Default)]
pub struct MediatorOptions {
    pub refresh_token: Option<RefreshToken>,
    pub network_watcher: Option<Box<dyn ReachabilityProbe>>,
    pub http_client: Option<Arc<dyn HttpClient>>,
}

pub struct Mediator {
    queue: Arc<QueueManager>,
    network: Arc<NetworkMonitor>,
    sync_engine: Arc<SyncEngine>,
    http_client: Arc<dyn HttpClient>,
    events: EventBus,
    watcher_handle: JoinHandle<()>,
}

impl Mediator {
    pub async fn new(config: MediatorConfig, options: MediatorOptions) -> Result<Self, Error> {
        let store = DurableStore::open(&config.db_path).await?;
        let events = EventBus::new();
        let queue = Arc::new(QueueManager::new(store, events.clone()).await?);

        let probe: Box<dyn ReachabilityProbe> = options.network_watcher.unwrap_or_else(|| {
            Box::new(HttpProbe::new(
                config.reachability_probe_url.clone(),
                Duration::from_secs(5),
            ))
        });
        let network = Arc::new(NetworkMonitor::new(
            probe,
            events.clone(),
            config.background_poll_interval,
        ));
        network.probe_now().await;

        let http_client: Arc<dyn HttpClient> = options
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));

        let sync_config = SyncConfig {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            refresh_timeout: config.refresh_timeout,
            refresh_token: options.refresh_token,
        };
        let sync_engine = SyncEngine::new(
            queue.clone(),
            network.clone(),
            http_client.clone(),
            events.clone(),
            sync_config,
        );
        let watcher_handle = sync_engine.spawn_watcher();

        Ok(Mediator {
            queue,
            network,
            sync_engine,
            http_client,
            events,
            watcher_handle,
        })
    }

    /// Direct vs enqueue decision per the facade's send algorithm: while
    /// reachable, calls through; a 5xx or a client error falls back to
    /// enqueueing for replay and returning the synthesized acceptance.
    /// While unreachable, enqueues unconditionally.
    pub async fn send(&self, input: SendInput, options: SendOptions) -> Result<MediatorResponse, Error> {
        let headers = normalize_headers(input.headers);
        let body = serialize_body(input.body);

        if self.network.is_reachable() {
            let probe_request = QueuedRequest {
                id: options.id.clone().unwrap_or_else(new_id),
                url: input.url.clone(),
                method: input.method,
                headers: headers.clone(),
                body: body.clone(),
                timestamp_ms: now_ms(),
                retry_count: 0,
                priority: options.priority,
            };
            match self.http_client.execute(&probe_request).await {
                Ok(response) if !is_server_error(response.status) => {
                    return Ok(MediatorResponse {
                        status: response.status,
                        headers: IndexMap::new(),
                        body: response.body,
                    });
                }
                Ok(_) => {
                    event!(Level::DEBUG, "direct call returned a server error, falling back to enqueue");
                }
                Err(err) => {
                    event!(Level::DEBUG, error = %err, "direct call failed, falling back to enqueue");
                }
            }
            return self
                .enqueue_for_replay(
                    NewRequest {
                        id: options.id,
                        url: input.url,
                        method: input.method,
                        headers,
                        body,
                        priority: options.priority,
                    },
                    false,
                )
                .await;
        }

        self.enqueue_for_replay(
            NewRequest {
                id: options.id,
                url: input.url,
                method: input.method,
                headers,
                body,
                priority: options.priority,
            },
            true,
        )
        .await
    }

    async fn enqueue_for_replay(
        &self,
        partial: NewRequest,
        offline: bool,
    ) -> Result<MediatorResponse, Error> {
        let id = self.queue.enqueue(partial).await?;
        if offline {
            if let Err(err) = self.register_background_replay() {
                event!(Level::WARN, error = %err, "failed to register background replay");
            }
        }

        let mut headers = IndexMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let json = format!(r#"{{"status":"queued","offline":{offline},"id":"{id}"}}"#);
        Ok(MediatorResponse {
            status: 202,
            headers,
            body: json.into_bytes(),
        })
    }

    /// The native analogue of a service-worker `registration.sync.register`
    /// call. There is no platform hook to fail against here, but the
    /// signature stays fallible so callers treat failure identically to
    /// the platform's own sometimes-unavailable API.
    fn register_background_replay(&self) -> Result<(), Error> {
        event!(Level::DEBUG, tag = BACKGROUND_REPLAY_TAG, "registering background replay");
        Ok(())
    }

    pub async fn sync_now(&self) {
        self.sync_engine.start_sync().await;
    }

    pub async fn cancel_request(&self, id: &str) -> Result<bool, Error> {
        self.queue.cancel(id).await
    }

    pub async fn list_queue(&self) -> Result<Vec<QueuedRequest>, Error> {
        self.queue.list_all().await
    }

    pub fn set_offline_mode(&self, flag: bool) {
        self.network.set_forced_offline(flag);
    }

    pub fn is_online(&self) -> bool {
        self.network.is_reachable()
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_engine.is_draining()
    }

    pub fn queue_size(&self) -> u64 {
        self.queue.size()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

impl Drop for Mediator {
    fn drop(&mut self) {
        self.watcher_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restsync_net::HttpResponse;
    use restsync_net::StaticProbe;
    use tokio::sync::Mutex as AsyncMutex;

    struct ScriptedClient {
        responses: AsyncMutex<std::collections::VecDeque<Result<HttpResponse, Error>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<HttpResponse, Error>>) -> Self {
            ScriptedClient {
                responses: AsyncMutex::new(responses.into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for ScriptedClient {
        async fn execute(&self, _request: &QueuedRequest) -> Result<HttpResponse, Error> {
            self.responses
                .lock()
                .await
                .pop_front()
                .expect("scripted client ran out of canned responses")
        }
    }

    fn ok(status: u16) -> Result<HttpResponse, Error> {
        Ok(HttpResponse {
            status,
            body: b"{}".to_vec(),
        })
    }

    async fn mediator_with(
        reachable: bool,
        client: ScriptedClient,
    ) -> (tempfile::TempDir, Mediator) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MediatorConfig::default();
        config.db_path = dir.path().join("db").to_string_lossy().to_string();
        config.backoff_base = Duration::from_millis(1);
        config.backoff_max = Duration::from_millis(2);
        let options = MediatorOptions {
            network_watcher: Some(Box::new(StaticProbe(reachable))),
            http_client: Some(Arc::new(client)),
            ..Default::default()
        };
        let mediator = Mediator::new(config, options).await.unwrap();
        (dir, mediator)
    }

    fn basic_input() -> SendInput {
        SendInput {
            url: "https://example.test/x".to_string(),
            method: Method::Post,
            headers: HeaderInput::Pairs(Vec::new()),
            body: BodyInput::Empty,
        }
    }

    #[tokio::test]
    async fn online_send_returns_the_real_response() {
        let (_dir, mediator) = mediator_with(true, ScriptedClient::new(vec![ok(201)])).await;
        let response = mediator.send(basic_input(), SendOptions::default()).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(mediator.queue_size(), 0);
    }

    #[tokio::test]
    async fn online_send_with_server_error_enqueues_and_returns_202() {
        let (_dir, mediator) = mediator_with(true, ScriptedClient::new(vec![ok(503)])).await;
        let response = mediator.send(basic_input(), SendOptions::default()).await.unwrap();
        assert_eq!(response.status, 202);
        assert_eq!(mediator.queue_size(), 1);
        assert_eq!(
            response.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn offline_send_enqueues_and_returns_202_with_offline_true() {
        let (_dir, mediator) = mediator_with(false, ScriptedClient::new(vec![])).await;
        let response = mediator.send(basic_input(), SendOptions::default()).await.unwrap();
        assert_eq!(response.status, 202);
        let body = String::from_utf8(response.body).unwrap();
        assert!(body.contains(r#""offline":true"#));
        assert_eq!(mediator.queue_size(), 1);
    }

    #[tokio::test]
    async fn offline_enqueue_honors_caller_supplied_priority_and_id() {
        let (_dir, mediator) = mediator_with(false, ScriptedClient::new(vec![])).await;
        let options = SendOptions {
            priority: Priority::High,
            id: Some("caller-chosen".to_string()),
        };
        let response = mediator.send(basic_input(), options).await.unwrap();
        let body = String::from_utf8(response.body).unwrap();
        assert!(body.contains("caller-chosen"));

        let queued = mediator.list_queue().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, "caller-chosen");
        assert_eq!(queued[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn cancel_request_removes_a_pending_entry() {
        let (_dir, mediator) = mediator_with(false, ScriptedClient::new(vec![])).await;
        let mut events = mediator.subscribe();
        let options = SendOptions {
            priority: Priority::Normal,
            id: Some("to-cancel".to_string()),
        };
        mediator.send(basic_input(), options).await.unwrap();
        assert!(mediator.cancel_request("to-cancel").await.unwrap());
        assert_eq!(mediator.queue_size(), 0);

        let cancelled = (0..8)
            .flat_map(|_| events.try_recv())
            .any(|event| matches!(event, Event::RequestCancelled { id } if id == "to-cancel"));
        assert!(cancelled, "expected a RequestCancelled event for the cancelled id");
    }

    #[tokio::test]
    async fn sync_now_on_an_empty_queue_emits_queue_empty_between_start_and_end() {
        let (_dir, mediator) = mediator_with(true, ScriptedClient::new(vec![])).await;
        let mut events = mediator.subscribe();
        mediator.sync_now().await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        let start = seen.iter().position(|e| matches!(e, Event::SyncStart));
        let empty = seen.iter().position(|e| matches!(e, Event::QueueEmpty));
        let end = seen.iter().position(|e| matches!(e, Event::SyncEnd));
        assert!(start.is_some() && empty.is_some() && end.is_some());
        assert!(start < empty && empty < end);
    }

    #[tokio::test]
    async fn sync_now_drains_a_pending_entry_once_reachable() {
        let (_dir, mediator) = mediator_with(true, ScriptedClient::new(vec![ok(200)])).await;
        mediator.set_offline_mode(true);
        mediator.send(basic_input(), SendOptions::default()).await.unwrap();
        assert_eq!(mediator.queue_size(), 1);

        mediator.set_offline_mode(false);
        mediator.sync_now().await;
        assert_eq!(mediator.queue_size(), 0);
    }

    #[tokio::test]
    async fn set_offline_mode_overrides_a_reachable_probe() {
        let (_dir, mediator) = mediator_with(true, ScriptedClient::new(vec![])).await;
        assert!(mediator.is_online());
        mediator.set_offline_mode(true);
        assert!(!mediator.is_online());
    }
}
