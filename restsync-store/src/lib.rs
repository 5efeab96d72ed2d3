//! The durable store: key-value persistence over an embedded `sled`
//! database, with an insertion-order cursor and a priority secondary
//! index. Schema is upgraded on open.

mod request;

pub use request::{Method, NewRequest, QueuedRequest};

use std::path::Path;
use std::sync::Arc;

use restsync_error::{make_err, Code, Error, ResultExt};
use restsync_util::Priority;
use tracing::{event, Level};

/// Opaque internal key identifying a stored entry. Callers treat this as a
/// handle; only the store interprets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(pub u64);

const ITEMS_TREE: &str = "request-queue";
const PRIORITY_INDEX_TREE: &str = "priority_idx";
const SCHEMA_VERSION_KEY: &[u8] = b"__schema_version__";
const CURRENT_SCHEMA_VERSION: u64 = 2;

fn priority_byte(priority: Priority) -> u8 {
    match priority {
        Priority::High => 0,
        Priority::Normal => 1,
        Priority::Low => 2,
    }
}

fn priority_index_key(priority: Priority, key: Key) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(9);
    bytes.push(priority_byte(priority));
    bytes.extend_from_slice(&key.0.to_be_bytes());
    bytes
}

/// Durable, crash-safe persistence for [`QueuedRequest`] entries. One
/// `sled` database per instance; one object store (`request-queue`) per
/// database, plus a non-unique secondary index on `priority`.
///
/// Every operation runs on the blocking thread pool via
/// `spawn_blocking`, since `sled` itself is a synchronous API; this keeps
/// the public surface asynchronous to match the rest of the workspace.
pub struct DurableStore {
    db: Arc<sled::Db>,
    items: sled::Tree,
    priority_index: sled::Tree,
}

impl DurableStore {
    /// Idempotent open. Fails with `Code::Environment` if the path cannot
    /// be opened as a `sled` database (permissions, corruption). Creates
    /// the object store and the priority index if absent, and upgrades
    /// the schema version in place.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || Self::open_blocking(&path))
            .await
            .map_err(|join_err| make_err!(Code::Environment, "store init task panicked: {join_err}"))?
    }

    fn open_blocking(path: &Path) -> Result<Self, Error> {
        let db = sled::open(path)
            .map_err(|err| make_err!(Code::Environment, "failed to open sled database: {err}"))?;
        let items = db
            .open_tree(ITEMS_TREE)
            .err_tip(|| "opening request-queue tree")?;
        let priority_index = db
            .open_tree(PRIORITY_INDEX_TREE)
            .err_tip(|| "opening priority_idx tree")?;
        Self::upgrade_schema(&db, &items, &priority_index)?;
        Ok(DurableStore {
            db: Arc::new(db),
            items,
            priority_index,
        })
    }

    /// Upgrades an older schema in place. Schema version 1 databases have
    /// the items tree but no priority index; rebuilding the index from the
    /// existing items makes the upgrade idempotent and safe to run on
    /// every open.
    fn upgrade_schema(
        db: &sled::Db,
        items: &sled::Tree,
        priority_index: &sled::Tree,
    ) -> Result<(), Error> {
        let stored_version = db
            .get(SCHEMA_VERSION_KEY)
            .err_tip(|| "reading schema version")?
            .and_then(|bytes| bytes.as_ref().try_into().ok().map(u64::from_be_bytes))
            .unwrap_or(0);

        if stored_version < CURRENT_SCHEMA_VERSION {
            event!(
                Level::INFO,
                from = stored_version,
                to = CURRENT_SCHEMA_VERSION,
                "upgrading durable store schema"
            );
            if priority_index.is_empty() {
                for entry in items.iter() {
                    let (key_bytes, value_bytes) = entry.err_tip(|| "scanning items during schema upgrade")?;
                    let key = Key(u64::from_be_bytes(
                        key_bytes.as_ref().try_into().map_err(|_| {
                            make_err!(Code::Storage, "corrupt primary key during schema upgrade")
                        })?,
                    ));
                    let item: QueuedRequest = bincode::deserialize(&value_bytes)
                        .err_tip(|| "decoding item during schema upgrade")?;
                    priority_index
                        .insert(priority_index_key(item.priority, key), &[])
                        .err_tip(|| "rebuilding priority index")?;
                }
            }
            db.insert(SCHEMA_VERSION_KEY, &CURRENT_SCHEMA_VERSION.to_be_bytes())
                .err_tip(|| "writing schema version")?;
        }
        Ok(())
    }

    /// Adds a new entry, returning the internal key it was assigned.
    pub async fn add(&self, item: QueuedRequest) -> Result<Key, Error> {
        let items = self.items.clone();
        let priority_index = self.priority_index.clone();
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let id = db
                .generate_id()
                .map_err(|err| make_err!(Code::Storage, "allocating primary key: {err}"))?;
            let key = Key(id);
            let encoded =
                bincode::serialize(&item).err_tip(|| "encoding item for storage")?;
            items
                .insert(key.0.to_be_bytes(), encoded)
                .err_tip(|| "inserting item")?;
            priority_index
                .insert(priority_index_key(item.priority, key), &[])
                .err_tip(|| "inserting priority index entry")?;
            Ok(key)
        })
        .await
        .map_err(|join_err| make_err!(Code::Storage, "add task panicked: {join_err}"))?
    }

    /// First entry in storage-ascending (insertion) order, regardless of
    /// priority.
    pub async fn peek_first(&self) -> Result<Option<(Key, QueuedRequest)>, Error> {
        let items = self.items.clone();
        tokio::task::spawn_blocking(move || {
            items
                .iter()
                .next()
                .transpose()
                .err_tip(|| "peeking first item")?
                .map(decode_entry)
                .transpose()
        })
        .await
        .map_err(|join_err| make_err!(Code::Storage, "peek_first task panicked: {join_err}"))?
    }

    /// First entry whose `priority` equals `p`, in insertion order.
    pub async fn peek_first_by_priority(
        &self,
        priority: Priority,
    ) -> Result<Option<(Key, QueuedRequest)>, Error> {
        let items = self.items.clone();
        let priority_index = self.priority_index.clone();
        tokio::task::spawn_blocking(move || {
            let prefix = [priority_byte(priority)];
            let Some(entry) = priority_index.scan_prefix(prefix).keys().next() else {
                return Ok(None);
            };
            let index_key = entry.err_tip(|| "scanning priority index")?;
            let key = Key(u64::from_be_bytes(
                index_key[1..]
                    .try_into()
                    .map_err(|_| make_err!(Code::Storage, "corrupt priority index key"))?,
            ));
            let Some(value) = items
                .get(key.0.to_be_bytes())
                .err_tip(|| "fetching item for priority index hit")?
            else {
                // Index and item tree raced with a concurrent remove; treat
                // as a miss rather than an error.
                return Ok(None);
            };
            let item: QueuedRequest =
                bincode::deserialize(&value).err_tip(|| "decoding item")?;
            Ok(Some((key, item)))
        })
        .await
        .map_err(|join_err| make_err!(Code::Storage, "peek task panicked: {join_err}"))?
    }

    pub async fn get(&self, key: Key) -> Result<Option<QueuedRequest>, Error> {
        let items = self.items.clone();
        tokio::task::spawn_blocking(move || {
            items
                .get(key.0.to_be_bytes())
                .err_tip(|| "getting item")?
                .map(|value| bincode::deserialize(&value).err_tip(|| "decoding item"))
                .transpose()
        })
        .await
        .map_err(|join_err| make_err!(Code::Storage, "get task panicked: {join_err}"))?
    }

    /// Persists a mutated item in place. Used by the sync engine to bump
    /// `retry_count` without disturbing the entry's position.
    pub async fn update(&self, key: Key, item: QueuedRequest) -> Result<(), Error> {
        let items = self.items.clone();
        let priority_index = self.priority_index.clone();
        tokio::task::spawn_blocking(move || {
            let old = items
                .get(key.0.to_be_bytes())
                .err_tip(|| "reading item before update")?
                .map(|value| bincode::deserialize::<QueuedRequest>(&value))
                .transpose()
                .err_tip(|| "decoding item before update")?;
            let encoded = bincode::serialize(&item).err_tip(|| "encoding updated item")?;
            items
                .insert(key.0.to_be_bytes(), encoded)
                .err_tip(|| "writing updated item")?;
            if let Some(old) = old {
                if old.priority != item.priority {
                    priority_index
                        .remove(priority_index_key(old.priority, key))
                        .err_tip(|| "removing stale priority index entry")?;
                    priority_index
                        .insert(priority_index_key(item.priority, key), &[])
                        .err_tip(|| "inserting updated priority index entry")?;
                }
            }
            Ok(())
        })
        .await
        .map_err(|join_err| make_err!(Code::Storage, "update task panicked: {join_err}"))?
    }

    /// Removes an entry. Tolerates the entry already being gone (e.g. a
    /// concurrent drainer already dequeued it), reporting `Ok(false)`.
    pub async fn remove(&self, key: Key) -> Result<bool, Error> {
        let items = self.items.clone();
        let priority_index = self.priority_index.clone();
        tokio::task::spawn_blocking(move || {
            let Some(old) = items
                .remove(key.0.to_be_bytes())
                .err_tip(|| "removing item")?
            else {
                return Ok(false);
            };
            let old: QueuedRequest = bincode::deserialize(&old).err_tip(|| "decoding removed item")?;
            priority_index
                .remove(priority_index_key(old.priority, key))
                .err_tip(|| "removing priority index entry")?;
            Ok(true)
        })
        .await
        .map_err(|join_err| make_err!(Code::Storage, "remove task panicked: {join_err}"))?
    }

    /// Removes the first entry whose `id` field equals `value`. Used by
    /// `cancel`, which addresses entries by their logical id rather than
    /// the internal key.
    pub async fn remove_by_field(&self, value: &str) -> Result<bool, Error> {
        let items = self.items.clone();
        let priority_index = self.priority_index.clone();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            for entry in items.iter() {
                let (key_bytes, value_bytes) = entry.err_tip(|| "scanning items")?;
                let item: QueuedRequest =
                    bincode::deserialize(&value_bytes).err_tip(|| "decoding item")?;
                if item.id == value {
                    let key = Key(u64::from_be_bytes(
                        key_bytes
                            .as_ref()
                            .try_into()
                            .map_err(|_| make_err!(Code::Storage, "corrupt primary key"))?,
                    ));
                    items
                        .remove(key_bytes)
                        .err_tip(|| "removing matched item")?;
                    priority_index
                        .remove(priority_index_key(item.priority, key))
                        .err_tip(|| "removing matched priority index entry")?;
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await
        .map_err(|join_err| make_err!(Code::Storage, "remove_by_field task panicked: {join_err}"))?
    }

    pub async fn count(&self) -> Result<u64, Error> {
        let items = self.items.clone();
        tokio::task::spawn_blocking(move || Ok(items.len() as u64))
            .await
            .map_err(|join_err| make_err!(Code::Storage, "count task panicked: {join_err}"))?
    }

    /// Snapshot of every pending entry, in insertion order.
    pub async fn list_all(&self) -> Result<Vec<QueuedRequest>, Error> {
        let items = self.items.clone();
        tokio::task::spawn_blocking(move || {
            items
                .iter()
                .values()
                .map(|value| {
                    let value = value.err_tip(|| "scanning items")?;
                    bincode::deserialize(&value).err_tip(|| "decoding item")
                })
                .collect()
        })
        .await
        .map_err(|join_err| make_err!(Code::Storage, "list_all task panicked: {join_err}"))?
    }

    pub async fn close(&self) -> Result<(), Error> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            db.flush().err_tip(|| "flushing on close")?;
            Ok(())
        })
        .await
        .map_err(|join_err| make_err!(Code::Storage, "close task panicked: {join_err}"))?
    }

    /// Deletes the database at `path` entirely. Intended for test
    /// teardown; a live instance should be `close`d first.
    pub fn delete(path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::remove_dir_all(path).or_else(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(err.into())
            }
        })
    }
}

fn decode_entry(entry: (sled::IVec, sled::IVec)) -> Result<(Key, QueuedRequest), Error> {
    let (key_bytes, value_bytes) = entry;
    let key = Key(u64::from_be_bytes(
        key_bytes
            .as_ref()
            .try_into()
            .map_err(|_| make_err!(Code::Storage, "corrupt primary key"))?,
    ));
    let item = bincode::deserialize(&value_bytes).err_tip(|| "decoding item")?;
    Ok((key, item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use restsync_util::{Body, Priority};
    use indexmap::IndexMap;

    fn sample(id: &str, priority: Priority) -> QueuedRequest {
        QueuedRequest {
            id: id.to_string(),
            url: "/x".to_string(),
            method: Method::Post,
            headers: IndexMap::new(),
            body: Body::Empty,
            timestamp_ms: 0,
            retry_count: 0,
            priority,
        }
    }

    async fn open_temp() -> (tempfile::TempDir, DurableStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::open(dir.path().join("db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let (_dir, store) = open_temp().await;
        let key = store.add(sample("a", Priority::Normal)).await.unwrap();
        let fetched = store.get(key).await.unwrap().unwrap();
        assert_eq!(fetched.id, "a");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn peek_first_is_insertion_order() {
        let (_dir, store) = open_temp().await;
        store.add(sample("a", Priority::Normal)).await.unwrap();
        store.add(sample("b", Priority::Normal)).await.unwrap();
        let (_, first) = store.peek_first().await.unwrap().unwrap();
        assert_eq!(first.id, "a");
    }

    #[tokio::test]
    async fn peek_first_by_priority_filters() {
        let (_dir, store) = open_temp().await;
        store.add(sample("lo", Priority::Low)).await.unwrap();
        store.add(sample("hi", Priority::High)).await.unwrap();
        let (_, high) = store
            .peek_first_by_priority(Priority::High)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(high.id, "hi");
        assert!(store
            .peek_first_by_priority(Priority::Normal)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn remove_drops_from_both_trees() {
        let (_dir, store) = open_temp().await;
        let key = store.add(sample("a", Priority::High)).await.unwrap();
        assert!(store.remove(key).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store
            .peek_first_by_priority(Priority::High)
            .await
            .unwrap()
            .is_none());
        // Removing an already-gone entry is a tolerated no-op.
        assert!(!store.remove(key).await.unwrap());
    }

    #[tokio::test]
    async fn remove_by_field_locates_by_logical_id() {
        let (_dir, store) = open_temp().await;
        store.add(sample("job-1", Priority::Normal)).await.unwrap();
        assert!(store.remove_by_field("job-1").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_moves_priority_index_entry() {
        let (_dir, store) = open_temp().await;
        let key = store.add(sample("a", Priority::Low)).await.unwrap();
        let mut item = store.get(key).await.unwrap().unwrap();
        item.priority = Priority::High;
        item.retry_count = 1;
        store.update(key, item).await.unwrap();
        let (_, high) = store
            .peek_first_by_priority(Priority::High)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(high.retry_count, 1);
        assert!(store
            .peek_first_by_priority(Priority::Low)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn reopening_rebuilds_priority_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = DurableStore::open(&path).await.unwrap();
            store.add(sample("a", Priority::High)).await.unwrap();
            store.close().await.unwrap();
        }
        let store = DurableStore::open(&path).await.unwrap();
        let (_, item) = store
            .peek_first_by_priority(Priority::High)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.id, "a");
    }
}
