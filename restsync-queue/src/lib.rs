//! Policy layer over the durable store: assigns identity on enqueue,
//! applies the priority-then-FIFO peek order, and keeps a cached size so
//! callers don't pay a store round-trip just to read `queue_size()`.

use std::sync::atomic::{AtomicU64, Ordering};

use restsync_error::Error;
use restsync_net::EventBus;
use restsync_store::{DurableStore, Key, NewRequest, QueuedRequest};
use restsync_util::{new_id, now_ms, Priority};
use tracing::{event, Level};

pub struct QueueManager {
    store: DurableStore,
    events: EventBus,
    size: AtomicU64,
}

impl QueueManager {
    /// Seeds the cached size from the store's current count.
    pub async fn new(store: DurableStore, events: EventBus) -> Result<Self, Error> {
        let size = store.count().await?;
        Ok(QueueManager {
            store,
            events,
            size: AtomicU64::new(size),
        })
    }

    fn publish_size(&self) {
        let size = self.size.load(Ordering::SeqCst);
        self.events.publish(restsync_net::queue_update(size));
    }

    fn increment(&self) {
        self.size.fetch_add(1, Ordering::SeqCst);
        self.publish_size();
    }

    /// Clamped at zero: a concurrent cancel racing a dequeue must never
    /// drive the cached count negative.
    fn decrement(&self) {
        self.size
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(1))
            })
            .expect("fetch_update closure never returns None");
        self.publish_size();
    }

    /// Assigns `id` (the caller's, if supplied), `timestamp_ms = now`, and
    /// `retry_count = 0`; persists the entry; returns the assigned id.
    pub async fn enqueue(&self, partial: NewRequest) -> Result<String, Error> {
        let id = partial.id.unwrap_or_else(new_id);
        let item = QueuedRequest {
            id: id.clone(),
            url: partial.url,
            method: partial.method,
            headers: partial.headers,
            body: partial.body,
            timestamp_ms: now_ms(),
            retry_count: 0,
            priority: partial.priority,
        };
        self.store.add(item).await?;
        self.increment();
        event!(Level::DEBUG, id = %id, "enqueued request");
        Ok(id)
    }

    /// The next item honoring the priority-then-FIFO policy: High, then
    /// Normal, then Low, falling back to the untagged insertion-order peek
    /// for any entry the priority index somehow missed.
    pub async fn peek_next(&self) -> Result<Option<(Key, QueuedRequest)>, Error> {
        for priority in Priority::ALL {
            if let Some(found) = self.store.peek_first_by_priority(priority).await? {
                return Ok(Some(found));
            }
        }
        self.store.peek_first().await
    }

    /// Persists a mutated item (used by the sync engine to bump
    /// `retry_count`). Does not change the cached size.
    pub async fn update(&self, key: Key, item: QueuedRequest) -> Result<(), Error> {
        self.store.update(key, item).await
    }

    pub async fn dequeue(&self, key: Key) -> Result<bool, Error> {
        let removed = self.store.remove(key).await?;
        if removed {
            self.decrement();
        }
        Ok(removed)
    }

    /// Locates an entry by its logical id and removes it if found.
    pub async fn cancel(&self, id: &str) -> Result<bool, Error> {
        let removed = self.store.remove_by_field(id).await?;
        if removed {
            self.decrement();
            self.events.publish(restsync_net::request_cancelled(id));
            event!(Level::DEBUG, id, "cancelled queued request");
        }
        Ok(removed)
    }

    pub async fn list_all(&self) -> Result<Vec<QueuedRequest>, Error> {
        self.store.list_all().await
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }
}
