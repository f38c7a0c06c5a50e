use std::collections::{BTreeSet, HashMap};

use crate::types::{AttributeValue, IndexDefinition, Item};

/// Incrementally maintained secondary index.
///
/// Members are bucketed by partition value; each bucket is ordered by
/// `(sort value, key)` so a query touches only the requested partition.
#[derive(Debug, Clone)]
pub(crate) struct SecondaryIndex {
    definition: IndexDefinition,
    partitions: HashMap<AttributeValue, BTreeSet<(AttributeValue, String)>>,
}

impl SecondaryIndex {
    pub(crate) fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            partitions: HashMap::new(),
        }
    }

    pub(crate) const fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub(crate) fn insert(&mut self, key: &str, item: &Item) {
        if let Some((partition, sort)) = self.definition.entry_for(item) {
            self.partitions
                .entry(partition.clone())
                .or_default()
                .insert((sort.clone(), key.to_string()));
        }
    }

    pub(crate) fn remove(&mut self, key: &str, item: &Item) {
        let Some((partition, sort)) = self.definition.entry_for(item) else {
            return;
        };

        if let Some(bucket) = self.partitions.get_mut(partition) {
            bucket.remove(&(sort.clone(), key.to_string()));
            if bucket.is_empty() {
                self.partitions.remove(partition);
            }
        }
    }

    /// Keys of up to `limit` members of `partition`, in index order
    pub(crate) fn query(&self, partition: &AttributeValue, limit: usize) -> Vec<String> {
        self.partitions
            .get(partition)
            .map(|bucket| {
                bucket
                    .iter()
                    .take(limit)
                    .map(|(_, key)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.partitions.values().map(BTreeSet::len).sum()
    }
}
