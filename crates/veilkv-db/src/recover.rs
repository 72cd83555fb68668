//! Best-effort index reconstruction from raw backend records.
//!
//! Scans everything the physical backend holds (not what the current index
//! claims — the index may be empty or stale), opens each candidate's
//! recovery ticket, and collects the logical keys that decrypt cleanly.
//! Failures mean "not one of ours" or "wrong key material" and are skipped,
//! never fatal.

use tracing::{debug, info};

use veilkv_core::VeilResult;
use veilkv_crypto::{
    looks_like_record, open_recovery_ticket, CryptoProvider, EncryptedRecord, KeyMaterial,
};
use veilkv_store::BlobStore;

/// Scan the backend and return every logical key recoverable from record
/// tickets. Backend listing errors propagate; per-record failures do not.
pub(crate) async fn scan(
    crypto: &dyn CryptoProvider,
    store: &BlobStore,
    keys: &KeyMaterial,
) -> VeilResult<Vec<String>> {
    let items = store.list().await?;
    let mut recovered = Vec::new();

    for (id, text) in &items {
        if !looks_like_record(text) {
            continue;
        }
        let record = match EncryptedRecord::parse(text) {
            Ok(record) => record,
            Err(e) => {
                debug!(id = %id, "skipping malformed candidate: {e}");
                continue;
            }
        };
        let path = match open_recovery_ticket(crypto, keys, &record) {
            Ok(path) => path,
            Err(e) => {
                debug!(id = %id, "recovery ticket did not open: {e}");
                continue;
            }
        };
        // A ticket that decrypts to the record's own storage id is not a
        // data record; this also excludes the persisted index blob, which is
        // sealed under its own identifier.
        if path == *id {
            debug!(id = %id, "skipping self-referential record");
            continue;
        }
        recovered.push(path);
    }

    info!(
        scanned = items.len(),
        recovered = recovered.len(),
        "recovery scan complete"
    );
    Ok(recovered)
}
