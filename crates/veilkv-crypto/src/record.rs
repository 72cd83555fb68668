//! Authenticated record format with embedded recovery tickets.
//!
//! Wire layout is a text string of exactly 5 dot-delimited base64 fields:
//!
//! ```text
//! salt . value_nonce . value_ct . ticket_nonce . ticket_ct
//! ```
//!
//! Parsing is positional. Anything other than 5 fields is malformed — there
//! is no delimiter-scanning heuristic, so the value and ticket halves can
//! never be confused.

use zeroize::Zeroize;

use veilkv_core::{VeilError, VeilResult};

use crate::keys::KeyMaterial;
use crate::provider::{b64_decode, b64_encode, CryptoProvider};
use crate::{context, KEY_SIZE, SALT_SIZE};

/// Number of dot-delimited fields in an encoded record
pub const RECORD_FIELDS: usize = 5;

/// A sealed record: random salt, AEAD of the JSON value (bound to the logical
/// key), and an independently keyed recovery ticket holding the logical key.
///
/// Records are immutable once written; an update writes a new record with a
/// fresh salt at the same storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    pub salt: Vec<u8>,
    pub value_nonce: Vec<u8>,
    pub value_ct: Vec<u8>,
    pub ticket_nonce: Vec<u8>,
    pub ticket_ct: Vec<u8>,
}

impl EncryptedRecord {
    /// Encode to the 5-field wire text.
    pub fn encode(&self) -> String {
        [
            b64_encode(&self.salt),
            b64_encode(&self.value_nonce),
            b64_encode(&self.value_ct),
            b64_encode(&self.ticket_nonce),
            b64_encode(&self.ticket_ct),
        ]
        .join(".")
    }

    /// Positional parse of the wire text. Any field count other than 5 is a
    /// [`VeilError::MalformedPayload`].
    pub fn parse(text: &str) -> VeilResult<Self> {
        let fields: Vec<&str> = text.split('.').collect();
        if fields.len() != RECORD_FIELDS {
            return Err(VeilError::MalformedPayload(format!(
                "expected {RECORD_FIELDS} fields, found {}",
                fields.len()
            )));
        }

        let record = Self {
            salt: b64_decode(fields[0])?,
            value_nonce: b64_decode(fields[1])?,
            value_ct: b64_decode(fields[2])?,
            ticket_nonce: b64_decode(fields[3])?,
            ticket_ct: b64_decode(fields[4])?,
        };
        if record.salt.len() != SALT_SIZE {
            return Err(VeilError::MalformedPayload(format!(
                "salt is {} bytes (expected {SALT_SIZE})",
                record.salt.len()
            )));
        }
        Ok(record)
    }
}

/// Cheap shape test used by the recovery scanner to pick candidates out of a
/// raw backend listing.
pub fn looks_like_record(text: &str) -> bool {
    text.split('.').count() == RECORD_FIELDS
}

/// Seal `value` for `logical_key` with a fresh 32-byte salt.
pub fn seal_record(
    crypto: &dyn CryptoProvider,
    keys: &KeyMaterial,
    logical_key: &str,
    value: &serde_json::Value,
) -> VeilResult<EncryptedRecord> {
    let salt = crypto.random_bytes(SALT_SIZE);

    let (mut cipher_key, aad) = value_key_and_aad(crypto, keys, logical_key, &salt)?;
    let plaintext = serde_json::to_vec(value)
        .map_err(|e| anyhow::anyhow!("value serialization: {e}"))?;
    let (value_nonce, value_ct) = crypto.aead_encrypt(&plaintext, &cipher_key, Some(&aad))?;
    cipher_key.zeroize();

    let mut ticket_key = ticket_key(crypto, keys, &salt)?;
    let (ticket_nonce, ticket_ct) =
        crypto.aead_encrypt(logical_key.as_bytes(), &ticket_key, None)?;
    ticket_key.zeroize();

    Ok(EncryptedRecord {
        salt,
        value_nonce,
        value_ct,
        ticket_nonce,
        ticket_ct,
    })
}

/// Open the value half of a record. The claimed `logical_key` participates in
/// key and AAD derivation, so a wrong or tampered key fails authentication.
pub fn open_record(
    crypto: &dyn CryptoProvider,
    keys: &KeyMaterial,
    logical_key: &str,
    record: &EncryptedRecord,
) -> VeilResult<serde_json::Value> {
    let (mut cipher_key, aad) = value_key_and_aad(crypto, keys, logical_key, &record.salt)?;
    let plaintext = crypto.aead_decrypt(
        &record.value_nonce,
        &record.value_ct,
        &cipher_key,
        Some(&aad),
    );
    cipher_key.zeroize();

    serde_json::from_slice(&plaintext?)
        .map_err(|e| VeilError::Decryption(format!("decrypted value is not JSON: {e}")))
}

/// Open a record's recovery ticket, yielding its logical key.
///
/// Needs only the session's recovery key and the record's own salt — no prior
/// knowledge of the logical key. Used by the recovery scanner, where failures
/// are non-fatal.
pub fn open_recovery_ticket(
    crypto: &dyn CryptoProvider,
    keys: &KeyMaterial,
    record: &EncryptedRecord,
) -> VeilResult<String> {
    let mut key = ticket_key(crypto, keys, &record.salt)?;
    let plaintext = crypto.aead_decrypt(&record.ticket_nonce, &record.ticket_ct, &key, None);
    key.zeroize();

    String::from_utf8(plaintext?)
        .map_err(|e| VeilError::Decryption(format!("recovered key is not UTF-8: {e}")))
}

/// `KDF(value_key, salt || logical_key, "ENCRYPT", 512)` split into the
/// 32-byte cipher key and 32 bytes of associated data.
fn value_key_and_aad(
    crypto: &dyn CryptoProvider,
    keys: &KeyMaterial,
    logical_key: &str,
    salt: &[u8],
) -> VeilResult<([u8; KEY_SIZE], Vec<u8>)> {
    let mut per_write = Vec::with_capacity(salt.len() + logical_key.len());
    per_write.extend_from_slice(salt);
    per_write.extend_from_slice(logical_key.as_bytes());

    let mut okm = crypto.kdf(keys.value_key(), &per_write, context::ENCRYPT, 512)?;
    let mut cipher_key = [0u8; KEY_SIZE];
    cipher_key.copy_from_slice(&okm[..KEY_SIZE]);
    let aad = okm[KEY_SIZE..].to_vec();
    okm.zeroize();

    Ok((cipher_key, aad))
}

/// `KDF(recovery_key, salt, "RECOVER", 256)`: a per-record ticket key, so no
/// two records share one even though the recovery root is shared.
fn ticket_key(
    crypto: &dyn CryptoProvider,
    keys: &KeyMaterial,
    salt: &[u8],
) -> VeilResult<[u8; KEY_SIZE]> {
    let mut okm = crypto.kdf(keys.recovery_key(), salt, context::RECOVER, 256)?;
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&okm);
    okm.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::derive_keys;
    use crate::provider::StdCrypto;
    use secrecy::SecretString;

    fn test_keys() -> KeyMaterial {
        derive_keys(
            &StdCrypto,
            &SecretString::from("s1"),
            &SecretString::from("p1"),
        )
        .unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let crypto = StdCrypto;
        let keys = test_keys();
        let value = serde_json::json!({"n": 1, "nested": {"list": [1, 2, 3]}});

        let record = seal_record(&crypto, &keys, "a/b", &value).unwrap();
        let opened = open_record(&crypto, &keys, "a/b", &record).unwrap();

        assert_eq!(opened, value);
    }

    #[test]
    fn test_open_with_wrong_claimed_key_fails() {
        let crypto = StdCrypto;
        let keys = test_keys();
        let record = seal_record(&crypto, &keys, "a/b", &serde_json::json!("v")).unwrap();

        let result = open_record(&crypto, &keys, "a/c", &record);
        assert!(matches!(result, Err(VeilError::Decryption(_))));
    }

    #[test]
    fn test_open_with_wrong_key_material_fails() {
        let crypto = StdCrypto;
        let keys = test_keys();
        let other = derive_keys(
            &crypto,
            &SecretString::from("s2"),
            &SecretString::from("p2"),
        )
        .unwrap();

        let record = seal_record(&crypto, &keys, "a/b", &serde_json::json!("v")).unwrap();
        assert!(open_record(&crypto, &other, "a/b", &record).is_err());
    }

    #[test]
    fn test_wire_roundtrip() {
        let crypto = StdCrypto;
        let keys = test_keys();
        let record = seal_record(&crypto, &keys, "k", &serde_json::json!(42)).unwrap();

        let text = record.encode();
        assert_eq!(text.split('.').count(), RECORD_FIELDS);

        let parsed = EncryptedRecord::parse(&text).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(
            open_record(&crypto, &keys, "k", &parsed).unwrap(),
            serde_json::json!(42)
        );
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        for text in ["", "a.b", "a.b.c.d", "a.b.c.d.e.f"] {
            let result = EncryptedRecord::parse(text);
            assert!(
                matches!(result, Err(VeilError::MalformedPayload(_))),
                "{text:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_rejects_bad_base64() {
        let crypto = StdCrypto;
        let keys = test_keys();
        let mut text = seal_record(&crypto, &keys, "k", &serde_json::json!(1))
            .unwrap()
            .encode();
        text.replace_range(0..4, "!!!!");

        assert!(matches!(
            EncryptedRecord::parse(&text),
            Err(VeilError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_fresh_salt_every_seal() {
        let crypto = StdCrypto;
        let keys = test_keys();
        let value = serde_json::json!("same");

        let a = seal_record(&crypto, &keys, "k", &value).unwrap();
        let b = seal_record(&crypto, &keys, "k", &value).unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.value_ct, b.value_ct);
    }

    #[test]
    fn test_recovery_ticket_without_logical_key() {
        let crypto = StdCrypto;
        let keys = test_keys();
        let record = seal_record(&crypto, &keys, "lost/key", &serde_json::json!(null)).unwrap();

        // Only the record and the session keys — no logical key supplied.
        let recovered = open_recovery_ticket(&crypto, &keys, &record).unwrap();
        assert_eq!(recovered, "lost/key");
    }

    #[test]
    fn test_recovery_ticket_wrong_session_fails() {
        let crypto = StdCrypto;
        let keys = test_keys();
        let other = derive_keys(
            &crypto,
            &SecretString::from("sX"),
            &SecretString::from("pX"),
        )
        .unwrap();

        let record = seal_record(&crypto, &keys, "k", &serde_json::json!(1)).unwrap();
        assert!(open_recovery_ticket(&crypto, &other, &record).is_err());
    }

    #[test]
    fn test_looks_like_record() {
        let crypto = StdCrypto;
        let keys = test_keys();
        let text = seal_record(&crypto, &keys, "k", &serde_json::json!(1))
            .unwrap()
            .encode();

        assert!(looks_like_record(&text));
        assert!(!looks_like_record("plain text"));
        assert!(!looks_like_record("a.b.c.d"));
    }

    proptest::proptest! {
        #[test]
        fn prop_roundtrip_any_key_and_value(
            key in "[a-zA-Z0-9/_.-]{1,64}",
            value in "\\PC{0,128}",
        ) {
            let crypto = StdCrypto;
            let keys = test_keys();
            let json = serde_json::json!({ "v": value });

            let record = seal_record(&crypto, &keys, &key, &json).unwrap();
            let text = record.encode();
            let parsed = EncryptedRecord::parse(&text).unwrap();

            proptest::prop_assert_eq!(open_record(&crypto, &keys, &key, &parsed).unwrap(), json);
            proptest::prop_assert_eq!(open_recovery_ticket(&crypto, &keys, &parsed).unwrap(), key);
        }
    }
}
