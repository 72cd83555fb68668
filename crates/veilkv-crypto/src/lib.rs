//! veilkv-crypto: the cryptographic protocol behind veilkv
//!
//! Key hierarchy (all keys 256-bit, memory-only, derived from two secrets):
//! ```text
//! index_key    = KDF(secret,    password,  "SECRET")    — blind path MAC + index blob id
//! value_key    = KDF(password,  secret,    "PASSWORD")  — per-record encryption root
//! recovery_key = KDF(value_key, index_key, "RECOVERY")  — recovery ticket root
//! ```
//!
//! Record format: 5 dot-delimited base64 fields,
//! `salt . value_nonce . value_ct . ticket_nonce . ticket_ct`. The value half
//! is AEAD-bound to the logical key via derived associated data; the ticket
//! half encrypts the logical key itself under a per-record key so the index
//! can be rebuilt from records alone.

pub mod keys;
pub mod provider;
pub mod record;

pub use keys::{derive_keys, index_blob_id, KeyMaterial};
pub use provider::{CryptoProvider, StdCrypto};
pub use record::{
    looks_like_record, open_record, open_recovery_ticket, seal_record, EncryptedRecord,
};

/// Size of every derived symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-record random salt in bytes
pub const SALT_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Domain-separation context labels. Verbatim values are part of the wire
/// format; changing one breaks compatibility with existing stores.
pub mod context {
    pub const SECRET: &[u8] = b"SECRET";
    pub const PASSWORD: &[u8] = b"PASSWORD";
    pub const RECOVERY: &[u8] = b"RECOVERY";
    pub const INDEX: &[u8] = b"INDEX";
    pub const ENCRYPT: &[u8] = b"ENCRYPT";
    pub const RECOVER: &[u8] = b"RECOVER";
}
