//! Session state: load single-flight and save debouncing.
//!
//! Load follows `Cold → Loading → Ready`; `delete_db` resets to `Cold` with
//! key material and index id cleared. Exactly one caller performs the load;
//! concurrent callers await a watch-channel completion signal (bounded by
//! the configured deadline) instead of polling.
//!
//! Saves are debounced with a `saving`/`pending` flag pair: while one index
//! write is in flight, later requests mark pending and return, and the
//! in-flight writer issues exactly one follow-up capturing the latest state.

use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use veilkv_core::{VeilError, VeilResult};
use veilkv_crypto::KeyMaterial;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Cold,
    Loading,
    Ready,
}

#[derive(Default)]
struct SessionInner {
    keys: Option<KeyMaterial>,
    index_id: Option<String>,
    saving: bool,
    save_pending: bool,
}

pub(crate) struct Session {
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<LoadState>,
    /// Kept alive so the channel never closes: `watch::Sender::send` drops
    /// the update if every receiver is gone.
    _state_rx: watch::Receiver<LoadState>,
    /// Serializes physical index-blob writes (forced saves queue behind the
    /// in-flight one rather than running concurrently).
    save_lock: Mutex<()>,
    load_timeout: Duration,
}

impl Session {
    pub fn new(load_timeout_ms: u64) -> Self {
        let (state_tx, state_rx) = watch::channel(LoadState::Cold);
        Self {
            inner: Mutex::new(SessionInner::default()),
            state_tx,
            _state_rx: state_rx,
            save_lock: Mutex::new(()),
            load_timeout: Duration::from_millis(load_timeout_ms),
        }
    }

    pub fn state(&self) -> LoadState {
        *self.state_tx.borrow()
    }

    /// Single-flight entry point. Returns `true` if this caller acquired the
    /// loader role (it must then call `complete_load` or `abort_load`),
    /// `false` if the session is already ready. Callers that find a load in
    /// flight wait for it to finish, bounded by the configured deadline.
    pub async fn acquire_load(&self) -> VeilResult<bool> {
        loop {
            {
                let _inner = self.inner.lock().await;
                match self.state() {
                    LoadState::Ready => return Ok(false),
                    LoadState::Cold => {
                        let _ = self.state_tx.send(LoadState::Loading);
                        return Ok(true);
                    }
                    LoadState::Loading => {}
                }
            }

            debug!("load in flight, waiting for completion signal");
            let mut rx = self.state_tx.subscribe();
            let waited = tokio::time::timeout(
                self.load_timeout,
                rx.wait_for(|state| *state != LoadState::Loading),
            )
            .await;
            match waited {
                Ok(Ok(_)) => continue,
                Ok(Err(_)) => return Err(VeilError::NotLoaded),
                Err(_) => {
                    return Err(VeilError::LoadTimeout(self.load_timeout.as_millis() as u64))
                }
            }
        }
    }

    /// Install the derived key material and index id, then signal `Ready`.
    pub async fn complete_load(&self, keys: KeyMaterial, index_id: String) {
        let mut inner = self.inner.lock().await;
        inner.keys = Some(keys);
        inner.index_id = Some(index_id);
        let _ = self.state_tx.send(LoadState::Ready);
    }

    /// A failed load returns the session to `Cold` so a later caller can
    /// retry with a fresh attempt.
    pub async fn abort_load(&self) {
        let mut inner = self.inner.lock().await;
        inner.keys = None;
        inner.index_id = None;
        let _ = self.state_tx.send(LoadState::Cold);
    }

    /// Full reset for `delete_db`: back to `Cold`, secrets-derived state
    /// cleared (the `KeyMaterial` drop zeroizes the keys).
    pub async fn reset(&self) {
        self.abort_load().await;
    }

    pub async fn keys(&self) -> VeilResult<KeyMaterial> {
        self.inner
            .lock()
            .await
            .keys
            .clone()
            .ok_or(VeilError::NotLoaded)
    }

    pub async fn index_id(&self) -> VeilResult<String> {
        self.inner
            .lock()
            .await
            .index_id
            .clone()
            .ok_or(VeilError::NotLoaded)
    }

    /// Debounce gate. Returns `true` if the caller should perform the write;
    /// `false` means a save is already in flight and this request has been
    /// recorded as pending (the in-flight writer will pick it up).
    pub async fn try_begin_save(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.saving {
            inner.save_pending = true;
            return false;
        }
        inner.saving = true;
        inner.save_pending = false;
        true
    }

    /// Called by the active writer after each completed write. Returns
    /// `true` if a coalesced follow-up round is needed; otherwise clears the
    /// saving flag and returns `false`.
    pub async fn finish_save_round(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.save_pending {
            inner.save_pending = false;
            true
        } else {
            inner.saving = false;
            false
        }
    }

    /// Clear the saving flag after a failed write so later saves can run.
    pub async fn end_save(&self) {
        let mut inner = self.inner.lock().await;
        inner.saving = false;
        inner.save_pending = false;
    }

    pub async fn lock_save(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.save_lock.lock().await
    }
}
