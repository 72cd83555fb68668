//! Shared record, index, and event types.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A logical entry as seen by callers: the plaintext key and, when resolved,
/// its JSON value. A missing record decrypts to `value: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: Option<serde_json::Value>,
}

/// One row of the blind index: logical key → opaque storage identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    /// hex(HMAC-SHA256(index_key, key))
    pub id: String,
}

/// Query options for list operations
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Resolve and decrypt stored values (fan-out per entry)
    pub values: bool,
    /// Restrict to logical keys with this prefix
    pub prefix: Option<String>,
}

/// Result of a list: bare keys, or full entries when values were requested.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Keys(Vec<String>),
    Entries(Vec<Entry>),
}

impl Listing {
    /// The logical keys in this listing, whichever shape it has.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Listing::Keys(keys) => keys.clone(),
            Listing::Entries(entries) => entries.iter().map(|e| e.key.clone()).collect(),
        }
    }
}

/// Receipt emitted by mutating database operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DbEvent {
    #[serde(rename = "write")]
    Write { timestamp: u64, key: String },
    #[serde(rename = "delete")]
    Delete { timestamp: u64, keys: Vec<String> },
    #[serde(rename = "importDB")]
    ImportDb { timestamp: u64, keys: Vec<String> },
    #[serde(rename = "deleteDB")]
    DeleteDb { timestamp: u64 },
}

/// Notification published by the physical backend on mutation, exposed
/// unchanged to database subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum StoreEvent {
    #[serde(rename = "write")]
    Write { timestamp: u64, id: String },
    #[serde(rename = "delete")]
    Delete { timestamp: u64, id: String },
    #[serde(rename = "deleteAll")]
    DeleteAll { timestamp: u64 },
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
