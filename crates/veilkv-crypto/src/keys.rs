//! Key hierarchy: two caller secrets → three session keys

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use veilkv_core::VeilResult;

use crate::provider::{hex, CryptoProvider};
use crate::{context, KEY_SIZE};

/// The three 256-bit session keys. Held only in memory for the lifetime of an
/// open database session, never persisted, zeroized on drop.
///
/// Re-deriving with the same two secrets always yields the same three keys.
#[derive(Clone)]
pub struct KeyMaterial {
    index_key: [u8; KEY_SIZE],
    value_key: [u8; KEY_SIZE],
    recovery_key: [u8; KEY_SIZE],
}

impl KeyMaterial {
    /// Authorizes blind path hashing and identifies the persisted index blob.
    pub fn index_key(&self) -> &[u8; KEY_SIZE] {
        &self.index_key
    }

    /// Root key for per-record value encryption.
    pub fn value_key(&self) -> &[u8; KEY_SIZE] {
        &self.value_key
    }

    /// Root key for per-record recovery tickets.
    pub fn recovery_key(&self) -> &[u8; KEY_SIZE] {
        &self.recovery_key
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.index_key.zeroize();
        self.value_key.zeroize();
        self.recovery_key.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("index_key", &"[REDACTED]")
            .field("value_key", &"[REDACTED]")
            .field("recovery_key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the session key hierarchy from the two caller secrets.
///
/// Pure function, no I/O. Argument order into the KDF and the verbatim
/// context labels are load-bearing for cross-implementation compatibility.
pub fn derive_keys(
    crypto: &dyn CryptoProvider,
    secret: &SecretString,
    password: &SecretString,
) -> VeilResult<KeyMaterial> {
    let secret_bytes = secret.expose_secret().as_bytes();
    let password_bytes = password.expose_secret().as_bytes();

    let index_key = derive_one(crypto, secret_bytes, password_bytes, context::SECRET)?;
    let value_key = derive_one(crypto, password_bytes, secret_bytes, context::PASSWORD)?;
    let recovery_key = derive_one(crypto, &value_key, &index_key, context::RECOVERY)?;

    Ok(KeyMaterial {
        index_key,
        value_key,
        recovery_key,
    })
}

/// Storage identifier of the persisted index blob:
/// `hex(KDF(index_key, value_key, "INDEX", 256))`.
pub fn index_blob_id(crypto: &dyn CryptoProvider, keys: &KeyMaterial) -> VeilResult<String> {
    let okm = crypto.kdf(&keys.index_key, &keys.value_key, context::INDEX, 256)?;
    Ok(hex::encode(&okm))
}

fn derive_one(
    crypto: &dyn CryptoProvider,
    ikm: &[u8],
    salt: &[u8],
    ctx: &[u8],
) -> VeilResult<[u8; KEY_SIZE]> {
    let okm = crypto.kdf(ikm, salt, ctx, 256)?;
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&okm);
    Ok(key)
}
