//! In-memory blind index: logical key → storage identifier.
//!
//! Pure data-structure semantics: insertion order is not significant and a
//! put for an existing key overwrites. The table itself is persisted
//! elsewhere (sealed as one more encrypted record under the index blob id).

use std::collections::HashMap;
use tokio::sync::RwLock;

use veilkv_core::IndexEntry;

#[derive(Debug, Default)]
pub struct IndexTable {
    entries: RwLock<HashMap<String, String>>,
}

impl IndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn put(&self, key: &str, id: &str) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), id.to_string());
    }

    /// Remove one entry; returns whether it existed.
    pub async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Snapshot of entries, optionally restricted to a key prefix.
    pub async fn list(&self, prefix: Option<&str>) -> Vec<IndexEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
            .map(|(key, id)| IndexEntry {
                key: key.clone(),
                id: id.clone(),
            })
            .collect()
    }

    pub async fn export_all(&self) -> Vec<IndexEntry> {
        self.list(None).await
    }

    /// Bulk insert. Rows merge over existing entries (overwrite-on-put);
    /// use [`IndexTable::clear`] first for a wholesale replacement.
    pub async fn import_all(&self, rows: Vec<IndexEntry>) {
        let mut entries = self.entries.write().await;
        for row in rows {
            entries.insert(row.key, row.id);
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_overwrites() {
        let table = IndexTable::new();
        table.put("k", "id-1").await;
        table.put("k", "id-2").await;

        assert_eq!(table.get("k").await, Some("id-2".to_string()));
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let table = IndexTable::new();
        table.put("k", "id").await;

        assert!(table.delete("k").await);
        assert!(!table.delete("k").await);
        assert_eq!(table.get("k").await, None);
    }

    #[tokio::test]
    async fn test_list_prefix_filter() {
        let table = IndexTable::new();
        table.put("docs/a", "1").await;
        table.put("docs/b", "2").await;
        table.put("media/c", "3").await;

        let docs = table.list(Some("docs/")).await;
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|e| e.key.starts_with("docs/")));

        assert_eq!(table.list(None).await.len(), 3);
    }

    #[tokio::test]
    async fn test_import_export_roundtrip() {
        let table = IndexTable::new();
        let rows = vec![
            IndexEntry {
                key: "a".into(),
                id: "1".into(),
            },
            IndexEntry {
                key: "b".into(),
                id: "2".into(),
            },
        ];
        table.import_all(rows.clone()).await;

        let mut exported = table.export_all().await;
        exported.sort_by(|x, y| x.key.cmp(&y.key));
        assert_eq!(exported, rows);
    }

    #[tokio::test]
    async fn test_import_merges_over_existing() {
        let table = IndexTable::new();
        table.put("a", "old").await;
        table
            .import_all(vec![IndexEntry {
                key: "a".into(),
                id: "new".into(),
            }])
            .await;

        assert_eq!(table.get("a").await, Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_clear() {
        let table = IndexTable::new();
        table.put("a", "1").await;
        table.clear().await;
        assert!(table.is_empty().await);
    }
}
