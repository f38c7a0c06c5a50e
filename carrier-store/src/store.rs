use async_trait::async_trait;

use crate::types::{AttributeValue, ChangeSet, Item, ScanPage};

/// Keyed record storage.
///
/// Every call is a potential network round trip from the caller's point of
/// view and may fail with a transient error. Per-record operations are
/// atomic; nothing spans more than one record.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Fetch one record
    ///
    /// # Errors
    /// [`StoreError::NotFound`](crate::StoreError::NotFound) if no record has this key
    async fn get_item(&self, key: &str) -> crate::Result<Item>;

    /// Store `item` under `key`, replacing any existing record
    async fn put_item(&self, key: &str, item: Item) -> crate::Result<()>;

    /// Apply a partial update and return the record as it now stands
    ///
    /// # Errors
    /// [`StoreError::NotFound`](crate::StoreError::NotFound) if no record has this key
    async fn update_item(&self, key: &str, changes: &ChangeSet) -> crate::Result<Item>;

    /// Remove a record
    ///
    /// # Errors
    /// [`StoreError::NotFound`](crate::StoreError::NotFound) if no record has this key
    async fn delete_item(&self, key: &str) -> crate::Result<()>;

    /// Up to `limit` members of one partition of a declared index, in
    /// ascending sort-key order
    async fn scan_index(
        &self,
        index: &str,
        partition: &AttributeValue,
        limit: usize,
    ) -> crate::Result<Vec<Item>>;

    /// One page of the whole table in key order, starting after `start_after`
    async fn scan(&self, start_after: Option<&str>, limit: usize) -> crate::Result<ScanPage>;
}

/// Keys double as file names in some backends, so only a conservative
/// alphabet is accepted everywhere.
pub(crate) fn validate_key(key: &str) -> crate::Result<()> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(crate::StoreError::InvalidKey(key.to_string()))
    }
}

pub(crate) fn validate_limit(limit: usize) -> crate::Result<()> {
    if limit == 0 {
        Err(crate::StoreError::InvalidQuery(
            "limit must be at least 1".to_string(),
        ))
    } else {
        Ok(())
    }
}
