//! Blob store: text records keyed by opaque identifiers, with a broadcast
//! event stream.
//!
//! Thin wrapper over an OpenDAL `Operator`. Absent reads come back as `None`
//! rather than an error; every mutation publishes a [`StoreEvent`] that the
//! database passes through unchanged to its own subscribers.

use opendal::Operator;
use tokio::sync::broadcast;
use tracing::debug;

use veilkv_core::types::epoch_millis;
use veilkv_core::{StoreEvent, VeilError, VeilResult};

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct BlobStore {
    op: Operator,
    events: broadcast::Sender<StoreEvent>,
}

impl BlobStore {
    pub fn new(op: Operator) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { op, events }
    }

    /// The raw OpenDAL handle, for callers that need to bypass this layer.
    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Subscribe to mutation events. Slow receivers may observe lag; events
    /// are notifications, not a replication log.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Read the record at `id`. A missing record is `None`, not an error.
    pub async fn get(&self, id: &str) -> VeilResult<Option<String>> {
        match self.op.read(id).await {
            Ok(buf) => {
                let text = String::from_utf8(buf.to_bytes().to_vec()).map_err(|e| {
                    VeilError::MalformedPayload(format!("record at {id} is not UTF-8: {e}"))
                })?;
                Ok(Some(text))
            }
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the record at `id`, overwriting any previous version.
    /// Atomic per call as far as this layer is concerned; last write wins.
    pub async fn put(&self, id: &str, text: &str) -> VeilResult<()> {
        self.op.write(id, text.as_bytes().to_vec()).await?;
        let _ = self.events.send(StoreEvent::Write {
            timestamp: epoch_millis(),
            id: id.to_string(),
        });
        Ok(())
    }

    /// Delete the record at `id`. Deleting an absent record is not an error.
    pub async fn delete(&self, id: &str) -> VeilResult<()> {
        self.op.delete(id).await?;
        let _ = self.events.send(StoreEvent::Delete {
            timestamp: epoch_millis(),
            id: id.to_string(),
        });
        Ok(())
    }

    /// List every raw record: `(id, text)` pairs. Non-UTF-8 values are
    /// skipped — they cannot be records of ours.
    pub async fn list(&self) -> VeilResult<Vec<(String, String)>> {
        let entries = self.op.list("").await?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = entry.path();
            if path.is_empty() || path.ends_with('/') {
                continue; // skip directory markers
            }
            let buf = match self.op.read(path).await {
                Ok(buf) => buf,
                Err(e) if e.kind() == opendal::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match String::from_utf8(buf.to_bytes().to_vec()) {
                Ok(text) => out.push((path.to_string(), text)),
                Err(_) => {
                    debug!(id = %path, "skipping non-UTF-8 blob in listing");
                }
            }
        }
        Ok(out)
    }

    /// Destroy every record in the backend.
    pub async fn delete_all(&self) -> VeilResult<()> {
        self.op.remove_all("").await?;
        let _ = self.events.send(StoreEvent::DeleteAll {
            timestamp: epoch_millis(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::build_memory_operator;

    fn memory_store() -> BlobStore {
        BlobStore::new(build_memory_operator().unwrap())
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = memory_store();
        store.put("abc123", "payload-text").await.unwrap();

        assert_eq!(
            store.get("abc123").await.unwrap(),
            Some("payload-text".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let store = memory_store();
        assert_eq!(store.get("nothing-here").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_last_write_wins() {
        let store = memory_store();
        store.put("id", "first").await.unwrap();
        store.put("id", "second").await.unwrap();

        assert_eq!(store.get("id").await.unwrap(), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_delete_then_get() {
        let store = memory_store();
        store.put("id", "value").await.unwrap();
        store.delete("id").await.unwrap();

        assert_eq!(store.get("id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_all_records() {
        let store = memory_store();
        store.put("a", "1").await.unwrap();
        store.put("b", "2").await.unwrap();

        let mut listed = store.list().await.unwrap();
        listed.sort();
        assert_eq!(
            listed,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = memory_store();
        store.put("a", "1").await.unwrap();
        store.put("b", "2").await.unwrap();

        store.delete_all().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_published() {
        let store = memory_store();
        let mut rx = store.subscribe();

        store.put("id", "v").await.unwrap();
        store.delete("id").await.unwrap();

        match rx.recv().await.unwrap() {
            StoreEvent::Write { id, timestamp } => {
                assert_eq!(id, "id");
                assert!(timestamp > 0);
            }
            other => panic!("expected write event, got {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            StoreEvent::Delete { .. }
        ));
    }
}
