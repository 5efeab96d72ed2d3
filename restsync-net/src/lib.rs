//! Reachability observation and the cross-crate event bus. Everything else
//! in this workspace learns whether the network is up by asking a
//! [`NetworkMonitor`], and publishes/observes state transitions through a
//! shared [`EventBus`].

mod event;
mod http_client;
mod network;

pub use event::{queue_update, request_cancelled, request_error, request_success, Event, EventBus};
pub use http_client::{classify, is_server_error, HttpClient, HttpResponse, Outcome, ReqwestHttpClient};
pub use network::{HttpProbe, NetworkMonitor, ReachabilityProbe, StaticProbe};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn monitor_reports_static_probe_value_after_first_probe() {
        let monitor = NetworkMonitor::new(
            Box::new(StaticProbe(true)),
            EventBus::new(),
            Duration::from_secs(60),
        );
        assert!(!monitor.is_reachable());
        monitor.probe_now().await;
        assert!(monitor.is_reachable());
    }

    #[tokio::test]
    async fn forced_offline_overrides_a_reachable_probe() {
        let monitor = NetworkMonitor::new(
            Box::new(StaticProbe(true)),
            EventBus::new(),
            Duration::from_secs(60),
        );
        monitor.probe_now().await;
        assert!(monitor.is_reachable());

        monitor.set_forced_offline(true);
        assert!(!monitor.is_reachable());

        monitor.set_forced_offline(false);
        assert!(monitor.is_reachable());
    }

    #[tokio::test]
    async fn subscribers_observe_only_effective_transitions() {
        let monitor = NetworkMonitor::new(
            Box::new(StaticProbe(true)),
            EventBus::new(),
            Duration::from_secs(60),
        );
        let mut watch_rx = monitor.subscribe();

        monitor.probe_now().await;
        watch_rx.changed().await.unwrap();
        assert!(*watch_rx.borrow());

        // Forcing offline while already reachable flips the effective
        // signal even though the underlying probe never changed.
        monitor.set_forced_offline(true);
        watch_rx.changed().await.unwrap();
        assert!(!*watch_rx.borrow());
    }

    #[tokio::test]
    async fn network_change_event_is_published_on_transition() {
        let events = EventBus::new();
        let mut subscriber = events.subscribe();
        let monitor = NetworkMonitor::new(Box::new(StaticProbe(true)), events, Duration::from_secs(60));

        monitor.probe_now().await;
        match subscriber.recv().await.unwrap() {
            Event::NetworkChange(reachable) => assert!(reachable),
            other => panic!("expected NetworkChange, got {other:?}"),
        }
    }
}
