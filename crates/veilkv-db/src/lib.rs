//! veilkv-db: encryption-at-rest layer over a plaintext key-value backend
//!
//! Logical keys ("paths") are never stored in the clear: the backend sees
//! only blind HMAC identifiers and authenticated-encrypted records. Each
//! record carries an independently keyed recovery ticket, so the full
//! logical-key set can be rebuilt from the records alone if the index is
//! lost.
//!
//! ```no_run
//! use secrecy::SecretString;
//! use veilkv_core::config::DbConfig;
//! use veilkv_db::CryptoDb;
//! use veilkv_store::{build_memory_operator, BlobStore};
//!
//! # async fn demo() -> veilkv_core::VeilResult<()> {
//! let store = BlobStore::new(build_memory_operator()?);
//! let db = CryptoDb::new(
//!     store,
//!     SecretString::from("s1"),
//!     SecretString::from("p1"),
//!     DbConfig::default(),
//! );
//! db.put("a/b", &serde_json::json!({"n": 1})).await?;
//! let entry = db.get("a/b").await?;
//! assert_eq!(entry.value, Some(serde_json::json!({"n": 1})));
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod index;
pub mod recover;
pub mod session;

pub use db::CryptoDb;
pub use index::IndexTable;
pub use session::LoadState;
