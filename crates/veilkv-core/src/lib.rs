pub mod config;
pub mod error;
pub mod types;

pub use error::{VeilError, VeilResult};
pub use types::{DbEvent, Entry, IndexEntry, ListQuery, Listing, StoreEvent};
