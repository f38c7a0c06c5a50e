use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;

use crate::{
    StoreError,
    index::SecondaryIndex,
    store::{RecordStore, validate_key, validate_limit},
    types::{AttributeValue, ChangeSet, IndexDefinition, Item, ScanPage},
};

#[derive(Debug, Default)]
struct Inner {
    items: BTreeMap<String, Item>,
    indexes: HashMap<String, SecondaryIndex>,
}

impl Inner {
    fn index_insert(&mut self, key: &str, item: &Item) {
        for index in self.indexes.values_mut() {
            index.insert(key, item);
        }
    }

    fn index_remove(&mut self, key: &str, item: &Item) {
        for index in self.indexes.values_mut() {
            index.remove(key, item);
        }
    }
}

/// In-memory record store
///
/// Records live in a `BTreeMap` behind an `RwLock`, so full scans come out in
/// key order for free. Every declared index is updated in the same critical
/// section as the record it describes, so an index query never observes a
/// half-applied update.
///
/// # Performance
/// - Get / Put / Update / Delete: O(log n) plus O(log m) per declared index
/// - Index scan: O(log m + limit)
/// - Table scan: O(log n + limit)
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRecordStore {
    /// Create an empty store with no secondary indexes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that maintains the given secondary indexes
    #[must_use]
    pub fn with_indexes(definitions: impl IntoIterator<Item = IndexDefinition>) -> Self {
        let indexes = definitions
            .into_iter()
            .map(|definition| (definition.name.clone(), SecondaryIndex::new(definition)))
            .collect();

        Self {
            inner: Arc::new(RwLock::new(Inner {
                items: BTreeMap::new(),
                indexes,
            })),
        }
    }

    /// Number of stored records
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record, keeping index declarations
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.items.clear();
        for index in inner.indexes.values_mut() {
            *index = SecondaryIndex::new(index.definition().clone());
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_item(&self, key: &str) -> crate::Result<Item> {
        validate_key(key)?;

        self.inner
            .read()?
            .items
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put_item(&self, key: &str, item: Item) -> crate::Result<()> {
        validate_key(key)?;

        let mut inner = self.inner.write()?;
        if let Some(previous) = inner.items.remove(key) {
            inner.index_remove(key, &previous);
        }
        inner.index_insert(key, &item);
        inner.items.insert(key.to_string(), item);

        Ok(())
    }

    async fn update_item(&self, key: &str, changes: &ChangeSet) -> crate::Result<Item> {
        validate_key(key)?;

        let mut inner = self.inner.write()?;
        let previous = inner
            .items
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let mut updated = previous.clone();
        changes.apply(&mut updated);

        inner.index_remove(key, &previous);
        inner.index_insert(key, &updated);
        inner.items.insert(key.to_string(), updated.clone());

        Ok(updated)
    }

    async fn delete_item(&self, key: &str) -> crate::Result<()> {
        validate_key(key)?;

        let mut inner = self.inner.write()?;
        let removed = inner
            .items
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        inner.index_remove(key, &removed);

        Ok(())
    }

    async fn scan_index(
        &self,
        index: &str,
        partition: &AttributeValue,
        limit: usize,
    ) -> crate::Result<Vec<Item>> {
        validate_limit(limit)?;

        let inner = self.inner.read()?;
        let keys = inner
            .indexes
            .get(index)
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?
            .query(partition, limit);

        Ok(keys
            .iter()
            .filter_map(|key| inner.items.get(key).cloned())
            .collect())
    }

    async fn scan(&self, start_after: Option<&str>, limit: usize) -> crate::Result<ScanPage> {
        validate_limit(limit)?;

        let inner = self.inner.read()?;
        let lower = start_after.map_or(Bound::Unbounded, |key| Bound::Excluded(key.to_string()));

        let mut range = inner.items.range((lower, Bound::Unbounded));
        let items: Vec<(String, Item)> = range
            .by_ref()
            .take(limit)
            .map(|(key, item)| (key.clone(), item.clone()))
            .collect();

        let last_key = if range.next().is_some() {
            items.last().map(|(key, _)| key.clone())
        } else {
            None
        };

        Ok(ScanPage { items, last_key })
    }
}
