use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    backends::{FileRecordStore, MemoryRecordStore},
    store::RecordStore,
    types::IndexDefinition,
};

/// Configuration for the record store backend
///
/// # Examples
///
/// File-backed store in RON config:
/// ```ron
/// Carrier (
///     store: File(
///         path: "/var/lib/carrier/emails",
///     ),
/// )
/// ```
///
/// Memory-backed store for development:
/// ```ron
/// Carrier (
///     store: Memory,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StoreConfig {
    /// Records held in process memory and lost on exit
    Memory,
    /// One file per record under `path`
    File { path: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("/var/lib/carrier/emails"),
        }
    }
}

impl StoreConfig {
    /// Filesystem path for file-backed stores
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory => None,
        }
    }

    /// Build the configured store, declaring `indexes` on it
    ///
    /// File-backed stores are initialised (directory created, orphans swept)
    /// before being returned.
    ///
    /// # Errors
    /// Returns an error if the file store path is invalid or cannot be
    /// initialised
    pub fn into_store(
        self,
        indexes: impl IntoIterator<Item = IndexDefinition>,
    ) -> crate::Result<Arc<dyn RecordStore>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryRecordStore::with_indexes(indexes))),
            Self::File { path } => {
                let store = indexes
                    .into_iter()
                    .fold(FileRecordStore::builder().path(path), |builder, index| {
                        builder.index(index)
                    })
                    .build()?;
                store.init()?;
                Ok(Arc::new(store))
            }
        }
    }
}
