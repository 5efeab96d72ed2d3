use restsync_store::QueuedRequest;
use tokio::sync::broadcast;

/// Every event any collaborator in this workspace can publish, forwarded
/// verbatim by the mediator facade to its own subscribers.
#[derive(Debug, Clone)]
pub enum Event {
    /// The effective reachability signal changed.
    NetworkChange(bool),
    /// The queue's pending-entry count changed.
    QueueUpdate { size: u64 },
    /// A drain began.
    SyncStart,
    /// A drain found nothing to peek and stopped because the queue is
    /// empty, as opposed to stopping because reachability was lost.
    QueueEmpty,
    /// A drain finished; the queue was not necessarily emptied (it may
    /// have exited early because reachability was lost mid-drain).
    SyncEnd,
    /// An item was replayed successfully and removed from the queue.
    RequestSuccess { id: String, status: u16 },
    /// An item was removed from the queue without success: either a
    /// permanent server response, an unrecoverable auth failure, or
    /// retries exhausted.
    RequestError { id: String, permanent: bool },
    /// An item was explicitly cancelled before it could be replayed.
    RequestCancelled { id: String },
}

/// Default channel capacity for the event bus. Generous enough that a
/// normal subscriber never lags during a single drain; a genuinely slow
/// subscriber observes `Lagged` and resubscribes rather than blocking
/// publishers.
const DEFAULT_CAPACITY: usize = 256;

/// A typed multi-listener registry built over `tokio::sync::broadcast`.
/// Delivery is ordered with respect to publish order; there is no replay
/// buffer for a subscriber that joins late, matching the specification's
/// "UI consumers must initialize from the live reads, then subscribe"
/// contract.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(DEFAULT_CAPACITY);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes an event to every current subscriber. A publish with no
    /// subscribers is not an error: the bus is fire-and-forget, so a
    /// caller emitting before anyone has subscribed simply drops the
    /// event, matching the "no missed-event queue" contract.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience for building a `QueueUpdate` event from a queue manager's
/// cached size.
pub fn queue_update(size: u64) -> Event {
    Event::QueueUpdate { size }
}

/// Convenience to avoid call sites needing to reach into `QueuedRequest`
/// just to report its id.
pub fn request_success(item: &QueuedRequest, status: u16) -> Event {
    Event::RequestSuccess {
        id: item.id.clone(),
        status,
    }
}

pub fn request_error(item: &QueuedRequest, permanent: bool) -> Event {
    Event::RequestError {
        id: item.id.clone(),
        permanent,
    }
}

pub fn request_cancelled(id: impl Into<String>) -> Event {
    Event::RequestCancelled { id: id.into() }
}
