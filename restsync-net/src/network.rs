use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{event, Level};

use crate::event::{Event, EventBus};

/// Observes whether the network is reachable. A real implementation
/// issues a lightweight probe on an interval (since, unlike a browser
/// tab, a long-running worker process has no `online`/`offline` DOM
/// events to subscribe to); a test implementation returns a fixed value.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Issues a `HEAD` request against a configured URL and treats any
/// successful response as "reachable". Absent a configured URL, always
/// reports reachable — the forced-offline override is the only way to
/// simulate an outage in that configuration.
pub struct HttpProbe {
    client: reqwest::Client,
    url: Option<String>,
}

impl HttpProbe {
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is always valid here");
        HttpProbe { client, url }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        let Some(url) = &self.url else {
            return true;
        };
        self.client.head(url).send().await.is_ok()
    }
}

/// A probe that always reports a fixed value. Used for tests and for the
/// `network_watcher` dependency-injection hook the mediator's constructor
/// accepts.
pub struct StaticProbe(pub bool);

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn probe(&self) -> bool {
        self.0
    }
}

struct Inner {
    probe: Box<dyn ReachabilityProbe>,
    forced_offline: AtomicBool,
    last_reported: AtomicBool,
    effective: watch::Sender<bool>,
    events: EventBus,
}

impl Inner {
    /// Recomputes the effective reachability signal from the last probe
    /// result and the forced-offline override, publishing `NetworkChange`
    /// only if the effective state actually transitioned.
    fn recompute(&self) {
        let reported = self.last_reported.load(Ordering::SeqCst);
        let forced_offline = self.forced_offline.load(Ordering::SeqCst);
        let effective = reported && !forced_offline;
        let changed = self.effective.send_if_modified(|current| {
            if *current == effective {
                false
            } else {
                *current = effective;
                true
            }
        });
        if changed {
            event!(Level::INFO, reachable = effective, "network reachability changed");
            self.events.publish(Event::NetworkChange(effective));
        }
    }
}

/// Reports a boolean reachability signal, notifies subscribers of
/// transitions, and supports a manual force-offline override. Effective
/// state = (probe-reported reachable) AND (NOT forced-offline).
pub struct NetworkMonitor {
    inner: Arc<Inner>,
    poll_task: JoinHandle<()>,
}

impl NetworkMonitor {
    pub fn new(
        probe: Box<dyn ReachabilityProbe>,
        events: EventBus,
        poll_interval: Duration,
    ) -> Self {
        let (sender, _receiver) = watch::channel(false);
        let inner = Arc::new(Inner {
            probe,
            forced_offline: AtomicBool::new(false),
            last_reported: AtomicBool::new(false),
            effective: sender,
            events,
        });

        let poll_inner = inner.clone();
        let poll_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                interval.tick().await;
                let reported = poll_inner.probe.probe().await;
                poll_inner.last_reported.store(reported, Ordering::SeqCst);
                poll_inner.recompute();
            }
        });

        NetworkMonitor { inner, poll_task }
    }

    /// Runs one probe immediately rather than waiting for the next poll
    /// tick. Called on construction by collaborators that need an initial
    /// reading before the first interval elapses.
    pub async fn probe_now(&self) {
        let reported = self.inner.probe.probe().await;
        self.inner.last_reported.store(reported, Ordering::SeqCst);
        self.inner.recompute();
    }

    pub fn is_reachable(&self) -> bool {
        *self.inner.effective.borrow()
    }

    /// A `watch` receiver that resolves on every effective-state
    /// transition. Cheaper than subscribing to the event bus when a
    /// caller only cares about the current boolean, not every event kind.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.effective.subscribe()
    }

    pub fn set_forced_offline(&self, flag: bool) {
        self.inner.forced_offline.store(flag, Ordering::SeqCst);
        self.inner.recompute();
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.poll_task.abort();
    }
}
