use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use carrier_common::internal;
use tokio::{fs, sync::Mutex};

use crate::{
    SerializationError, StoreError,
    store::{RecordStore, validate_key, validate_limit},
    types::{AttributeValue, ChangeSet, IndexDefinition, Item, ScanPage},
};

const RECORD_SUFFIX: &str = ".bin";
const TEMP_PREFIX: &str = ".tmp_";
const DELETED_SUFFIX: &str = ".deleted";

/// File-based record store
///
/// Each record is a single `{key}.bin` file holding the bincode encoding of
/// its attribute map.
///
/// # Atomicity
/// Writes go to `.tmp_{key}.bin` and are renamed into place, so a crash never
/// leaves a torn record behind. Deletes rename to `{key}.bin.deleted` before
/// removing. Leftovers of either kind are swept by [`FileRecordStore::init`].
/// Read-modify-write updates are serialised through a store-wide lock.
///
/// # Performance
/// - Get / Put / Delete: O(1) file operations
/// - Update: one read and one write under the store lock
/// - Index scan / table scan: O(n), the directory is read in full
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    path: PathBuf,
    indexes: Vec<IndexDefinition>,
    write_lock: Arc<Mutex<()>>,
}

impl FileRecordStore {
    /// Create a new `FileRecordStore` builder
    #[must_use]
    pub fn builder() -> FileRecordStoreBuilder {
        FileRecordStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reject store paths that are relative, contain `..`, or point into
    /// system directories
    pub(crate) fn validate_path(path: &Path) -> crate::Result<()> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(StoreError::InvalidPath(format!(
                "store path cannot contain '..' components: {}",
                path.display()
            )));
        }

        if !path.is_absolute() {
            return Err(StoreError::InvalidPath(format!(
                "store path must be absolute: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = ["/etc", "/bin", "/sbin", "/boot", "/sys", "/proc", "/dev"];
        if let Some(prefix) = sensitive_prefixes.iter().find(|p| path.starts_with(p)) {
            return Err(StoreError::InvalidPath(format!(
                "store path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Create the store directory if needed and sweep partial writes and
    /// deletes left by a previous crash
    ///
    /// # Errors
    /// - If the directory cannot be created
    /// - If the path exists but is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising record store at {}", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(StoreError::InvalidPath(format!(
                "expected {} to be a directory",
                self.path.display()
            )));
        }

        let mut cleaned = 0_usize;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name.starts_with(TEMP_PREFIX) || name.ends_with(DELETED_SUFFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned files from record store"
            );
        }

        Ok(())
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{key}{RECORD_SUFFIX}"))
    }

    fn index(&self, name: &str) -> crate::Result<&IndexDefinition> {
        self.indexes
            .iter()
            .find(|definition| definition.name == name)
            .ok_or_else(|| StoreError::UnknownIndex(name.to_string()))
    }

    async fn read_record(&self, key: &str) -> crate::Result<Option<Item>> {
        match fs::read(self.record_path(key)).await {
            Ok(bytes) => {
                let (item, _) =
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(SerializationError::from)?;
                Ok(Some(item))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, key: &str, item: &Item) -> crate::Result<()> {
        let bytes = bincode::serde::encode_to_vec(item, bincode::config::standard())
            .map_err(SerializationError::from)?;

        let temp_path = self.path.join(format!("{TEMP_PREFIX}{key}{RECORD_SUFFIX}"));
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, self.record_path(key)).await?;

        Ok(())
    }

    /// Read a record for a listing. Undecodable files are skipped so one
    /// corrupt record cannot take every scan down with it.
    async fn read_listed(&self, key: &str) -> crate::Result<Option<Item>> {
        match self.read_record(key).await {
            Err(StoreError::Serialization(e)) => {
                tracing::warn!(key, error = %e, "Skipping undecodable record");
                Ok(None)
            }
            other => other,
        }
    }

    /// Every stored key, in ascending order
    async fn keys(&self) -> crate::Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            if let Some(key) = name
                .strip_suffix(RECORD_SUFFIX)
                .filter(|key| validate_key(key).is_ok())
            {
                keys.push(key.to_string());
            }
        }

        keys.sort_unstable();
        Ok(keys)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_item(&self, key: &str) -> crate::Result<Item> {
        validate_key(key)?;

        self.read_record(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    #[tracing::instrument(level = "debug", skip(self, item))]
    async fn put_item(&self, key: &str, item: Item) -> crate::Result<()> {
        validate_key(key)?;

        let _guard = self.write_lock.lock().await;
        self.write_record(key, &item).await
    }

    #[tracing::instrument(level = "debug", skip(self, changes))]
    async fn update_item(&self, key: &str, changes: &ChangeSet) -> crate::Result<Item> {
        validate_key(key)?;

        let _guard = self.write_lock.lock().await;
        let mut item = self
            .read_record(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        changes.apply(&mut item);
        self.write_record(key, &item).await?;

        Ok(item)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_item(&self, key: &str) -> crate::Result<()> {
        validate_key(key)?;

        let _guard = self.write_lock.lock().await;
        let path = self.record_path(key);
        let deleted_path = self.path.join(format!("{key}{RECORD_SUFFIX}{DELETED_SUFFIX}"));

        match fs::rename(&path, &deleted_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        fs::remove_file(&deleted_path).await?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn scan_index(
        &self,
        index: &str,
        partition: &AttributeValue,
        limit: usize,
    ) -> crate::Result<Vec<Item>> {
        validate_limit(limit)?;
        let definition = self.index(index)?;

        let mut members = Vec::new();
        for key in self.keys().await? {
            // Deleted between listing and reading, or undecodable.
            let Some(item) = self.read_listed(&key).await? else {
                continue;
            };

            let sort = match definition.entry_for(&item) {
                Some((p, sort)) if p == partition => sort.clone(),
                _ => continue,
            };
            members.push((sort, key, item));
        }

        members.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        Ok(members
            .into_iter()
            .take(limit)
            .map(|(_, _, item)| item)
            .collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn scan(&self, start_after: Option<&str>, limit: usize) -> crate::Result<ScanPage> {
        validate_limit(limit)?;

        let mut keys = self
            .keys()
            .await?
            .into_iter()
            .filter(|key| start_after.is_none_or(|after| key.as_str() > after));

        let mut items = Vec::new();
        for key in keys.by_ref() {
            if let Some(item) = self.read_listed(&key).await? {
                items.push((key, item));
                if items.len() == limit {
                    break;
                }
            }
        }

        let last_key = if keys.next().is_some() {
            items.last().map(|(key, _)| key.clone())
        } else {
            None
        };

        Ok(ScanPage { items, last_key })
    }
}

/// Builder for `FileRecordStore`
#[derive(Debug, Default)]
pub struct FileRecordStoreBuilder {
    path: PathBuf,
    indexes: Vec<IndexDefinition>,
}

impl FileRecordStoreBuilder {
    /// Set the store directory path
    #[must_use]
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Declare a secondary index
    #[must_use]
    pub fn index(mut self, definition: IndexDefinition) -> Self {
        self.indexes.push(definition);
        self
    }

    /// Build the final `FileRecordStore`
    ///
    /// # Errors
    /// Returns an error if the path is invalid or potentially dangerous
    pub fn build(self) -> crate::Result<FileRecordStore> {
        FileRecordStore::validate_path(&self.path)?;
        Ok(FileRecordStore {
            path: self.path,
            indexes: self.indexes,
            write_lock: Arc::new(Mutex::new(())),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn store_in(dir: &TempDir) -> FileRecordStore {
        let store = FileRecordStore::builder()
            .path(dir.path().to_path_buf())
            .index(IndexDefinition::new("queue", "status", "scheduled_at"))
            .build()
            .expect("Failed to build store");
        store.init().expect("Failed to init store");
        store
    }

    fn record(status: i64, scheduled_at: &str) -> Item {
        [
            ("status".to_string(), AttributeValue::Number(status)),
            ("scheduled_at".to_string(), AttributeValue::from(scheduled_at)),
            (
                "recipients".to_string(),
                AttributeValue::StringList(vec!["a@example.com".to_string()]),
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_path_validation() {
        assert!(FileRecordStore::validate_path(Path::new("/var/lib/carrier")).is_ok());
        assert!(FileRecordStore::validate_path(Path::new("relative/path")).is_err());
        assert!(FileRecordStore::validate_path(Path::new("/var/lib/../../etc")).is_err());
        assert!(FileRecordStore::validate_path(Path::new("/etc/carrier")).is_err());
    }

    #[tokio::test]
    async fn test_file_store_basic_operations() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        let item = record(1, "2024-01-01T00:00:00.000000Z");

        store.put_item("a", item.clone()).await.expect("Failed to put");
        assert!(dir.path().join("a.bin").exists());
        assert_eq!(store.get_item("a").await.expect("Failed to get"), item);

        let updated = store
            .update_item("a", &ChangeSet::new().set("status", 3_i64))
            .await
            .expect("Failed to update");
        assert_eq!(updated.get("status"), Some(&AttributeValue::Number(3)));
        assert_eq!(store.get_item("a").await.expect("Failed to get"), updated);

        store.delete_item("a").await.expect("Failed to delete");
        assert!(!dir.path().join("a.bin").exists());
        assert!(store.get_item("a").await.expect_err("expected an error").is_not_found());
        assert!(store.delete_item("a").await.expect_err("expected an error").is_not_found());
        assert!(
            store
                .update_item("a", &ChangeSet::new())
                .await
                .expect_err("expected an error")
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let item = record(1, "2024-01-01T00:00:00.000000Z");
        store_in(&dir)
            .put_item("a", item.clone())
            .await
            .expect("Failed to put");

        let reopened = store_in(&dir);
        assert_eq!(reopened.get_item("a").await.expect("Failed to get"), item);
    }

    #[tokio::test]
    async fn test_init_sweeps_orphans() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join(".tmp_a.bin"), b"partial").expect("write");
        std::fs::write(dir.path().join("b.bin.deleted"), b"gone").expect("write");

        let store = store_in(&dir);
        assert!(!dir.path().join(".tmp_a.bin").exists());
        assert!(!dir.path().join("b.bin.deleted").exists());
        assert!(store.scan(None, 10).await.expect("Failed to scan").items.is_empty());
    }

    #[tokio::test]
    async fn test_index_scan() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);

        store
            .put_item("b", record(1, "2024-01-01T00:00:02.000000Z"))
            .await
            .expect("Failed to put");
        store
            .put_item("a", record(1, "2024-01-01T00:00:02.000000Z"))
            .await
            .expect("Failed to put");
        store
            .put_item("c", record(1, "2024-01-01T00:00:01.000000Z"))
            .await
            .expect("Failed to put");
        store
            .put_item("d", record(3, "2024-01-01T00:00:00.000000Z"))
            .await
            .expect("Failed to put");

        let items = store
            .scan_index("queue", &AttributeValue::Number(1), 2)
            .await
            .expect("Failed to scan");
        assert_eq!(
            items,
            vec![
                record(1, "2024-01-01T00:00:01.000000Z"),
                record(1, "2024-01-01T00:00:02.000000Z"),
            ]
        );

        assert!(matches!(
            store.scan_index("other", &AttributeValue::Number(1), 2).await,
            Err(StoreError::UnknownIndex(_))
        ));
    }

    #[tokio::test]
    async fn test_scans_skip_undecodable_records() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        store
            .put_item("a", record(1, "2024-01-01T00:00:00.000000Z"))
            .await
            .expect("Failed to put");
        std::fs::write(dir.path().join("ZZZZ.bin"), [0xff_u8; 16]).expect("write");

        let items = store
            .scan_index("queue", &AttributeValue::Number(1), 10)
            .await
            .expect("Corrupt record should not fail the index scan");
        assert_eq!(items, vec![record(1, "2024-01-01T00:00:00.000000Z")]);

        let page = store
            .scan(None, 10)
            .await
            .expect("Corrupt record should not fail the table scan");
        let keys: Vec<_> = page.items.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a"]);

        assert!(matches!(
            store.get_item("ZZZZ").await,
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_pages() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        for key in ["c", "a", "b"] {
            store
                .put_item(key, record(1, "2024-01-01T00:00:00.000000Z"))
                .await
                .expect("Failed to put");
        }

        let first = store.scan(None, 2).await.expect("Failed to scan");
        let keys: Vec<_> = first.items.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);

        let second = store
            .scan(first.last_key.as_deref(), 2)
            .await
            .expect("Failed to scan");
        let keys: Vec<_> = second.items.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["c"]);
        assert_eq!(second.last_key, None);
    }
}
