//! The crypto capability contract and its default implementation.
//!
//! The protocol layer never touches a primitive directly; everything goes
//! through [`CryptoProvider`] so tests can substitute instrumented or broken
//! doubles without touching core logic.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use veilkv_core::{VeilError, VeilResult};

use crate::{KEY_SIZE, NONCE_SIZE};

/// Primitive crypto operations consumed (not designed) by veilkv.
pub trait CryptoProvider: Send + Sync {
    /// Derive `bits / 8` output bytes from input key material, a salt, and a
    /// verbatim domain-separation context label.
    fn kdf(&self, ikm: &[u8], salt: &[u8], ctx: &[u8], bits: usize) -> VeilResult<Vec<u8>>;

    /// Keyed MAC of `message`, hex-encoded (safe for use as a storage id).
    fn hmac_hex(&self, key: &[u8], message: &[u8]) -> VeilResult<String>;

    /// `n` bytes from a cryptographically secure RNG.
    fn random_bytes(&self, n: usize) -> Vec<u8>;

    /// Authenticated encryption with a fresh random nonce.
    /// Returns `(nonce, ciphertext)` — the two wire fields of an AEAD output.
    fn aead_encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8; KEY_SIZE],
        aad: Option<&[u8]>,
    ) -> VeilResult<(Vec<u8>, Vec<u8>)>;

    /// Reverse of [`CryptoProvider::aead_encrypt`]. Authentication mismatch
    /// is a [`VeilError::Decryption`].
    fn aead_decrypt(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        key: &[u8; KEY_SIZE],
        aad: Option<&[u8]>,
    ) -> VeilResult<Vec<u8>>;
}

/// Default provider: HKDF-SHA256, HMAC-SHA256, XChaCha20-Poly1305, OS RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdCrypto;

impl CryptoProvider for StdCrypto {
    fn kdf(&self, ikm: &[u8], salt: &[u8], ctx: &[u8], bits: usize) -> VeilResult<Vec<u8>> {
        let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
        let mut okm = vec![0u8; bits / 8];
        hkdf.expand(ctx, &mut okm)
            .map_err(|e| anyhow::anyhow!("HKDF expand ({} bits): {e}", bits))?;
        Ok(okm)
    }

    fn hmac_hex(&self, key: &[u8], message: &[u8]) -> VeilResult<String> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
            .map_err(|e| anyhow::anyhow!("HMAC key setup: {e}"))?;
        mac.update(message);
        Ok(hex::encode(mac.finalize().into_bytes().as_slice()))
    }

    fn random_bytes(&self, n: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; n];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    fn aead_encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8; KEY_SIZE],
        aad: Option<&[u8]>,
    ) -> VeilResult<(Vec<u8>, Vec<u8>)> {
        let cipher = XChaCha20Poly1305::new(key.into());
        let nonce_bytes = self.random_bytes(NONCE_SIZE);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad: aad.unwrap_or(&[]),
        };
        let ciphertext = cipher
            .encrypt(nonce, payload)
            .map_err(|e| anyhow::anyhow!("AEAD encryption failed: {e}"))?;

        Ok((nonce_bytes, ciphertext))
    }

    fn aead_decrypt(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        key: &[u8; KEY_SIZE],
        aad: Option<&[u8]>,
    ) -> VeilResult<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(VeilError::Decryption(format!(
                "bad nonce length: {} bytes (expected {NONCE_SIZE})",
                nonce.len()
            )));
        }
        let cipher = XChaCha20Poly1305::new(key.into());
        let payload = Payload {
            msg: ciphertext,
            aad: aad.unwrap_or(&[]),
        };
        cipher
            .decrypt(XNonce::from_slice(nonce), payload)
            .map_err(|_| {
                VeilError::Decryption("authentication failed: wrong key or corrupted data".into())
            })
    }
}

/// Base64 text encoding for record fields (standard alphabet — never emits
/// the `.` field delimiter).
pub fn b64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

pub fn b64_decode(s: &str) -> VeilResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|e| VeilError::MalformedPayload(format!("base64 field: {e}")))
}

/// Lowercase hex encoding for blind identifiers.
pub mod hex {
    pub fn encode(data: &[u8]) -> String {
        let mut s = String::with_capacity(data.len() * 2);
        for byte in data {
            s.push_str(&format!("{:02x}", byte));
        }
        s
    }
}
