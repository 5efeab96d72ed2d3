//! The cooperative single-flight drainer: wakes on a network-reachable
//! transition, walks the queue in priority order, executes each entry
//! through an [`HttpClient`], and classifies the outcome into success,
//! recoverable auth, permanent failure, or backoff-and-retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use restsync_error::Error;
use restsync_net::{classify, Event, EventBus, HttpClient, NetworkMonitor, Outcome};
use restsync_queue::QueueManager;
use restsync_util::backoff;
use tokio::task::JoinHandle;
use tracing::{event, Level};

/// Invoked on a 401 when configured. Success lets the same entry be
/// retried without mutating its retry count; failure is treated as
/// permanent.
pub type RefreshToken = Arc<dyn Fn() -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

pub struct SyncConfig {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub refresh_timeout: Duration,
    pub refresh_token: Option<RefreshToken>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            max_retries: 5,
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(30_000),
            refresh_timeout: Duration::from_secs(10),
            refresh_token: None,
        }
    }
}

pub struct SyncEngine {
    queue: Arc<QueueManager>,
    network: Arc<NetworkMonitor>,
    http_client: Arc<dyn HttpClient>,
    events: EventBus,
    config: SyncConfig,
    is_draining: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<QueueManager>,
        network: Arc<NetworkMonitor>,
        http_client: Arc<dyn HttpClient>,
        events: EventBus,
        config: SyncConfig,
    ) -> Arc<Self> {
        Arc::new(SyncEngine {
            queue,
            network,
            http_client,
            events,
            config,
            is_draining: AtomicBool::new(false),
        })
    }

    /// Spawns a task that calls [`start_sync`](Self::start_sync) on every
    /// transition to reachable. The returned handle is aborted by the
    /// owner (the mediator) on teardown.
    pub fn spawn_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = self.clone();
        let mut reachable = self.network.subscribe();
        tokio::spawn(async move {
            while reachable.changed().await.is_ok() {
                if *reachable.borrow() {
                    engine.start_sync().await;
                }
            }
        })
    }

    pub fn is_draining(&self) -> bool {
        self.is_draining.load(Ordering::SeqCst)
    }

    /// Drains the queue while reachable. A no-op if a drain is already in
    /// flight or the network is currently unreachable.
    pub async fn start_sync(&self) {
        if self
            .is_draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if !self.network.is_reachable() {
            self.is_draining.store(false, Ordering::SeqCst);
            return;
        }

        self.events.publish(Event::SyncStart);
        self.drain_loop().await;
        self.is_draining.store(false, Ordering::SeqCst);
        self.events.publish(Event::SyncEnd);
    }

    async fn drain_loop(&self) {
        while self.network.is_reachable() {
            let next = match self.queue.peek_next().await {
                Ok(next) => next,
                Err(err) => {
                    event!(Level::ERROR, error = %err, "peeking next queued entry");
                    break;
                }
            };
            let Some((key, mut item)) = next else {
                self.events.publish(Event::QueueEmpty);
                break;
            };

            let attempt = self.http_client.execute(&item).await;
            let outcome = match &attempt {
                Ok(response) => classify(response.status, self.config.refresh_token.is_some()),
                Err(_) => Outcome::Transient,
            };

            match outcome {
                Outcome::Success => {
                    let status = attempt.expect("Success implies Ok").status;
                    let _ = self.queue.dequeue(key).await;
                    self.events
                        .publish(restsync_net::request_success(&item, status));
                }
                Outcome::RecoverableAuth => {
                    let refreshed = self.try_refresh().await;
                    if refreshed {
                        continue;
                    }
                    let _ = self.queue.dequeue(key).await;
                    self.events.publish(restsync_net::request_error(&item, true));
                }
                Outcome::Permanent => {
                    let _ = self.queue.dequeue(key).await;
                    self.events.publish(restsync_net::request_error(&item, true));
                }
                Outcome::Transient => {
                    item.retry_count += 1;
                    if item.retry_count > self.config.max_retries {
                        let _ = self.queue.dequeue(key).await;
                        self.events.publish(restsync_net::request_error(&item, true));
                    } else {
                        if let Err(err) = self.queue.update(key, item.clone()).await {
                            event!(Level::ERROR, error = %err, "persisting retry_count");
                        }
                        let delay = backoff(
                            item.retry_count,
                            self.config.backoff_base,
                            self.config.backoff_max,
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Invokes the configured refresh callback, bounded by
    /// `refresh_timeout`. Returns whether the same entry should be
    /// retried without incrementing its retry count.
    async fn try_refresh(&self) -> bool {
        let Some(refresh) = &self.config.refresh_token else {
            return false;
        };
        match tokio::time::timeout(self.config.refresh_timeout, refresh()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                event!(Level::WARN, error = %err, "refresh_token callback failed");
                false
            }
            Err(_) => {
                event!(Level::WARN, "refresh_token callback timed out");
                false
            }
        }
    }
}
