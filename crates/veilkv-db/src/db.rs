//! The public database surface.
//!
//! Write path: logical key → blind hash → sealed record → backend put +
//! index put → (debounced) index persistence. Read is the mirror path.
//! Every operation ensures the session is loaded first; batch operations
//! fan out concurrently and fail as a whole if any sub-operation fails —
//! there is deliberately no partial-success isolation.

use std::sync::Arc;

use futures::future::try_join_all;
use secrecy::SecretString;
use tokio::sync::broadcast;
use tracing::{debug, info};

use veilkv_core::config::DbConfig;
use veilkv_core::types::epoch_millis;
use veilkv_core::{
    DbEvent, Entry, IndexEntry, ListQuery, Listing, StoreEvent, VeilError, VeilResult,
};
use veilkv_crypto::{
    derive_keys, index_blob_id, open_record, seal_record, CryptoProvider, EncryptedRecord,
    KeyMaterial, StdCrypto,
};
use veilkv_store::BlobStore;

use crate::index::IndexTable;
use crate::recover;
use crate::session::{LoadState, Session};

/// An encrypted view over a plaintext blob store.
///
/// Construction is cheap; key derivation and index loading happen lazily on
/// the first operation (or an explicit [`CryptoDb::load`]), exactly once per
/// session no matter how many callers race.
pub struct CryptoDb {
    crypto: Arc<dyn CryptoProvider>,
    store: BlobStore,
    index: IndexTable,
    session: Session,
    secret: SecretString,
    password: SecretString,
    config: DbConfig,
}

impl CryptoDb {
    pub fn new(
        store: BlobStore,
        secret: SecretString,
        password: SecretString,
        config: DbConfig,
    ) -> Self {
        Self::with_crypto(store, Arc::new(StdCrypto), secret, password, config)
    }

    /// Construct with an injected crypto capability (test doubles,
    /// instrumented providers).
    pub fn with_crypto(
        store: BlobStore,
        crypto: Arc<dyn CryptoProvider>,
        secret: SecretString,
        password: SecretString,
        config: DbConfig,
    ) -> Self {
        let session = Session::new(config.load_timeout_ms);
        Self {
            crypto,
            store,
            index: IndexTable::new(),
            session,
            secret,
            password,
            config,
        }
    }

    pub fn state(&self) -> LoadState {
        self.session.state()
    }

    /// Raw physical-backend handle.
    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// Backend mutation events, passed through unchanged.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    /// Initialize the session: derive the key hierarchy, fetch and import
    /// the persisted index (absence means an empty index), optionally run
    /// the recovery scanner. Single-flight: concurrent callers share one
    /// execution and await its completion.
    pub async fn load(&self) -> VeilResult<()> {
        if !self.session.acquire_load().await? {
            return Ok(());
        }
        match self.do_load().await {
            Ok(needs_save) => {
                if needs_save {
                    Box::pin(self.save_index(false)).await?;
                }
                Ok(())
            }
            Err(e) => {
                self.session.abort_load().await;
                Err(e)
            }
        }
    }

    async fn do_load(&self) -> VeilResult<bool> {
        let keys = derive_keys(&*self.crypto, &self.secret, &self.password)?;
        let index_id = index_blob_id(&*self.crypto, &keys)?;

        if let Some(text) = self.store.get(&index_id).await? {
            let record = EncryptedRecord::parse(&text)?;
            let value = open_record(&*self.crypto, &keys, &index_id, &record)?;
            let rows: Vec<IndexEntry> = serde_json::from_value(value)
                .map_err(|e| anyhow::anyhow!("persisted index rows: {e}"))?;
            debug!(rows = rows.len(), "imported persisted index");
            self.index.import_all(rows).await;
        }

        let mut needs_save = false;
        if self.config.recover_on_load {
            let recovered = recover::scan(&*self.crypto, &self.store, &keys).await?;
            if !recovered.is_empty() {
                let mut rows = Vec::with_capacity(recovered.len());
                for key in &recovered {
                    let id = match self.index.get(key).await {
                        Some(id) => id,
                        None => self.blind_id(&keys, key)?,
                    };
                    rows.push(IndexEntry {
                        key: key.clone(),
                        id,
                    });
                }
                self.index.import_all(rows).await;
                needs_save = true;
            }
        }

        self.session.complete_load(keys, index_id).await;
        info!("database session ready");
        Ok(needs_save)
    }

    /// Blind storage identifier for a logical key. Memoized through the
    /// index (the mapping is deterministic; the cache only avoids
    /// recomputation).
    pub async fn hash_path(&self, key: &str) -> VeilResult<String> {
        self.load().await?;
        self.hash_path_ready(key).await
    }

    async fn hash_path_ready(&self, key: &str) -> VeilResult<String> {
        if let Some(id) = self.index.get(key).await {
            return Ok(id);
        }
        let keys = self.session.keys().await?;
        self.blind_id(&keys, key)
    }

    fn blind_id(&self, keys: &KeyMaterial, key: &str) -> VeilResult<String> {
        self.crypto.hmac_hex(keys.index_key(), key.as_bytes())
    }

    /// Seal and store `value` under `key`; overwrites any previous record
    /// with a fresh salt at the same storage id.
    pub async fn put(&self, key: &str, value: &serde_json::Value) -> VeilResult<DbEvent> {
        self.load().await?;
        let event = self.put_ready(key, value).await?;
        if self.config.autosave_index {
            self.save_index(false).await?;
        }
        Ok(event)
    }

    async fn put_ready(&self, key: &str, value: &serde_json::Value) -> VeilResult<DbEvent> {
        let id = self.hash_path_ready(key).await?;
        let keys = self.session.keys().await?;
        let record = seal_record(&*self.crypto, &keys, key, value)?;
        self.store.put(&id, &record.encode()).await?;
        self.index.put(key, &id).await;
        Ok(DbEvent::Write {
            timestamp: epoch_millis(),
            key: key.to_string(),
        })
    }

    /// Fetch and open the record for `key`. An absent record yields
    /// `value: None`; a present record that fails authentication is an
    /// error.
    pub async fn get(&self, key: &str) -> VeilResult<Entry> {
        self.load().await?;
        self.get_ready(key).await
    }

    async fn get_ready(&self, key: &str) -> VeilResult<Entry> {
        let id = self.hash_path_ready(key).await?;
        let value = match self.store.get(&id).await? {
            None => None,
            Some(text) => {
                let record = EncryptedRecord::parse(&text)?;
                let keys = self.session.keys().await?;
                Some(open_record(&*self.crypto, &keys, key, &record)?)
            }
        };
        Ok(Entry {
            key: key.to_string(),
            value,
        })
    }

    /// Delete one or many keys. Sub-deletes run concurrently; any failure
    /// fails the whole batch. One index save is scheduled at the end.
    pub async fn del<I, S>(&self, keys: I) -> VeilResult<DbEvent>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load().await?;
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        try_join_all(keys.iter().map(|key| self.del_one(key))).await?;
        if self.config.autosave_index {
            self.save_index(false).await?;
        }
        Ok(DbEvent::Delete {
            timestamp: epoch_millis(),
            keys,
        })
    }

    async fn del_one(&self, key: &str) -> VeilResult<()> {
        let id = self.hash_path_ready(key).await?;
        self.store.delete(&id).await?;
        self.index.delete(key).await;
        Ok(())
    }

    /// List logical keys, or full entries when `query.values` is set (value
    /// resolution fans out concurrently).
    pub async fn list(&self, query: ListQuery) -> VeilResult<Listing> {
        self.load().await?;
        let rows = self.index.list(query.prefix.as_deref()).await;
        if query.values {
            let entries = try_join_all(rows.iter().map(|row| self.get_ready(&row.key))).await?;
            Ok(Listing::Entries(entries))
        } else {
            Ok(Listing::Keys(rows.into_iter().map(|row| row.key).collect()))
        }
    }

    /// Decrypt every entry: the bulk half of an export/import round trip.
    pub async fn export_db(&self) -> VeilResult<Vec<Entry>> {
        self.load().await?;
        let rows = self.index.export_all().await;
        try_join_all(rows.iter().map(|row| self.get_ready(&row.key))).await
    }

    /// Re-put every row (concurrently), then persist the index once.
    pub async fn import_db(&self, rows: &[Entry]) -> VeilResult<DbEvent> {
        self.load().await?;
        let keys: Vec<String> = rows.iter().map(|row| row.key.clone()).collect();
        try_join_all(rows.iter().map(|row| async move {
            let value = row.value.clone().unwrap_or(serde_json::Value::Null);
            self.put_ready(&row.key, &value).await
        }))
        .await?;
        if self.config.autosave_index {
            self.save_index(false).await?;
        }
        Ok(DbEvent::ImportDb {
            timestamp: epoch_millis(),
            keys,
        })
    }

    /// Destroy backend and index contents and reset the session to cold.
    /// Key material is dropped (and zeroized); the next operation starts a
    /// fresh load.
    pub async fn delete_db(&self) -> VeilResult<DbEvent> {
        self.store.delete_all().await?;
        self.index.clear().await;
        self.session.reset().await;
        info!("database destroyed, session reset");
        Ok(DbEvent::DeleteDb {
            timestamp: epoch_millis(),
        })
    }

    /// Snapshot of the in-memory index rows.
    pub async fn export_index(&self) -> VeilResult<Vec<IndexEntry>> {
        self.load().await?;
        Ok(self.index.export_all().await)
    }

    /// Hash the given logical keys (concurrently), bulk-import the mappings,
    /// and persist the index.
    pub async fn import_index(&self, keys: Vec<String>) -> VeilResult<()> {
        self.load().await?;
        let rows = try_join_all(keys.iter().map(|key| async move {
            let id = self.hash_path_ready(key).await?;
            Ok::<_, VeilError>(IndexEntry {
                key: key.clone(),
                id,
            })
        }))
        .await?;
        self.index.import_all(rows).await;
        self.save_index(false).await
    }

    /// Remove the persisted index blob and clear the in-memory table.
    /// Data records are untouched (recoverable via [`CryptoDb::recover_index`]).
    pub async fn delete_index(&self) -> VeilResult<()> {
        self.load().await?;
        let index_id = self.session.index_id().await?;
        self.store.delete(&index_id).await?;
        self.index.clear().await;
        Ok(())
    }

    /// Rebuild the index from record recovery tickets. Returns the
    /// recovered logical keys.
    pub async fn recover_index(&self) -> VeilResult<Vec<String>> {
        self.load().await?;
        let keys = self.session.keys().await?;
        let recovered = recover::scan(&*self.crypto, &self.store, &keys).await?;
        self.import_index(recovered.clone()).await?;
        Ok(recovered)
    }

    /// Persist the index blob. Debounced: while a save is in flight,
    /// non-forced requests mark pending and return, and the in-flight
    /// writer issues exactly one follow-up write capturing the latest
    /// state. `force` writes unconditionally (still serialized behind any
    /// in-flight write).
    pub async fn save_index(&self, force: bool) -> VeilResult<()> {
        self.load().await?;

        if force {
            let _guard = self.session.lock_save().await;
            return self.write_index_blob().await;
        }

        if !self.session.try_begin_save().await {
            debug!("index save already in flight, coalesced");
            return Ok(());
        }
        let _guard = self.session.lock_save().await;
        loop {
            if let Err(e) = self.write_index_blob().await {
                self.session.end_save().await;
                return Err(e);
            }
            if !self.session.finish_save_round().await {
                return Ok(());
            }
            debug!("running coalesced follow-up index save");
        }
    }

    /// Seal the current index rows as one more encrypted record, stored
    /// under the index blob id (which doubles as its logical key).
    async fn write_index_blob(&self) -> VeilResult<()> {
        let keys = self.session.keys().await?;
        let index_id = self.session.index_id().await?;
        let rows = self.index.export_all().await;
        let value = serde_json::to_value(&rows)
            .map_err(|e| anyhow::anyhow!("index serialization: {e}"))?;
        let record = seal_record(&*self.crypto, &keys, &index_id, &value)?;
        self.store.put(&index_id, &record.encode()).await?;
        debug!(rows = rows.len(), "persisted index blob");
        Ok(())
    }
}
