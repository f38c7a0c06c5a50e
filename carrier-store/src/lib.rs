//! Keyed record store used as the persistence layer for email records.
//!
//! Records are attribute maps addressed by an opaque string key. Partial
//! updates are expressed as a [`ChangeSet`] whose entries either set an
//! attribute or remove it, and declared [`IndexDefinition`]s give ordered,
//! sparse secondary indexes over an equality partition.

pub mod backends;
pub mod config;
pub mod error;
mod index;
pub mod store;
pub mod types;

pub use backends::{FileRecordStore, MemoryRecordStore, TestRecordStore};
pub use config::StoreConfig;
pub use error::{Result, SerializationError, StoreError};
pub use store::RecordStore;
pub use types::{AttributeValue, Change, ChangeSet, IndexDefinition, Item, ScanPage};
