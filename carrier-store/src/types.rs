use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single stored attribute value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeValue {
    String(String),
    Number(i64),
    StringList(Vec<String>),
    StringMap(BTreeMap<String, String>),
    Bool(bool),
}

impl AttributeValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            Self::StringList(list) => Some(list),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_string_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::StringMap(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::StringList(_) => "string list",
            Self::StringMap(_) => "string map",
            Self::Bool(_) => "bool",
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

impl From<BTreeMap<String, String>> for AttributeValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::StringMap(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A stored record: attribute name to value
pub type Item = BTreeMap<String, AttributeValue>;

/// One entry of a partial update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    Set(AttributeValue),
    /// Drop the attribute entirely, taking the record out of any index
    /// keyed on it
    Remove,
}

/// Partial update addressed to one record.
///
/// Attributes not mentioned are left untouched; mentioning an attribute
/// twice keeps the last change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<String, Change>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(attribute, Change::Set(value.into()));
        self
    }

    #[must_use]
    pub fn remove(mut self, attribute: impl Into<String>) -> Self {
        self.insert(attribute, Change::Remove);
        self
    }

    pub fn insert(&mut self, attribute: impl Into<String>, change: Change) {
        self.changes.insert(attribute.into(), change);
    }

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Change> {
        self.changes.get(attribute)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Change)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Attributes this change set removes
    pub fn removals(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, change)| matches!(change, Change::Remove))
            .map(|(attribute, _)| attribute)
    }

    /// Apply every change to `item` in place
    pub fn apply(&self, item: &mut Item) {
        for (attribute, change) in &self.changes {
            match change {
                Change::Set(value) => {
                    item.insert(attribute.clone(), value.clone());
                }
                Change::Remove => {
                    item.remove(attribute);
                }
            }
        }
    }
}

/// Declaration of a sparse secondary index.
///
/// An item is a member only while it carries both the partition and the
/// sort attribute. Queries select one partition value and return members
/// in ascending sort-value order, ties broken by record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub partition_key: String,
    pub sort_key: String,
}

impl IndexDefinition {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// The `(partition, sort)` pair under which `item` is indexed, if any
    #[must_use]
    pub fn entry_for<'a>(
        &self,
        item: &'a Item,
    ) -> Option<(&'a AttributeValue, &'a AttributeValue)> {
        Some((item.get(&self.partition_key)?, item.get(&self.sort_key)?))
    }
}

/// One page of a full-table scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// `(key, item)` pairs in ascending key order
    pub items: Vec<(String, Item)>,
    /// Pass back as `start_after` to fetch the following page
    pub last_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn change_set_apply() {
        let mut record = item(&[
            ("status", AttributeValue::Number(1)),
            ("scheduled_at", AttributeValue::from("2024-01-01T00:00:00.000000Z")),
            ("template", AttributeValue::from("welcome")),
        ]);

        let changes = ChangeSet::new()
            .set("status", 3_i64)
            .set("provider_id", "tx-1")
            .remove("scheduled_at");
        changes.apply(&mut record);

        assert_eq!(
            record,
            item(&[
                ("status", AttributeValue::Number(3)),
                ("provider_id", AttributeValue::from("tx-1")),
                ("template", AttributeValue::from("welcome")),
            ])
        );
        assert_eq!(changes.removals().collect::<Vec<_>>(), vec!["scheduled_at"]);
    }

    #[test]
    fn later_change_wins() {
        let changes = ChangeSet::new().remove("scheduled_at").set("scheduled_at", "later");
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes.get("scheduled_at"),
            Some(&Change::Set(AttributeValue::from("later")))
        );
    }

    #[test]
    fn index_membership_is_sparse() {
        let index = IndexDefinition::new("queue", "status", "scheduled_at");

        let member = item(&[
            ("status", AttributeValue::Number(1)),
            ("scheduled_at", AttributeValue::from("2024-01-01T00:00:00.000000Z")),
        ]);
        assert!(index.entry_for(&member).is_some());

        let missing_sort = item(&[("status", AttributeValue::Number(1))]);
        assert!(index.entry_for(&missing_sort).is_none());
    }
}
