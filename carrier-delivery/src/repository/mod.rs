//! Typed persistence façade over the record store

mod changes;
pub(crate) mod codec;

use std::sync::Arc;

use carrier_common::{
    SendStatus,
    tracing::{debug, warn},
};
use carrier_store::{IndexDefinition, Item, RecordStore};
use chrono::{DateTime, SubsecRound, Utc};

pub use self::changes::EmailChanges;
use self::codec::attr;
use crate::{
    error::RepositoryError,
    types::{EmailId, EmailRecord, NewEmail},
};

/// Name of the secondary index over `(send_status, scheduled_at)`
pub const QUEUE_INDEX: &str = "send_status-scheduled_at";

/// Largest page accepted by [`EmailRepository::list`]
pub const MAX_PAGE_LIMIT: usize = 200;

/// Stored timestamps carry microseconds; round in-memory values the same way
/// so a returned record equals what a later read produces.
fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Email records over a [`RecordStore`].
///
/// Every call is a round trip to the store and may fail transiently.
/// Records are keyed by their [`EmailId`].
#[derive(Debug, Clone)]
pub struct EmailRepository {
    store: Arc<dyn RecordStore>,
}

impl EmailRepository {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// The index the store must declare for [`EmailRepository::list_queued`]
    #[must_use]
    pub fn queue_index() -> IndexDefinition {
        IndexDefinition::new(QUEUE_INDEX, attr::SEND_STATUS, attr::SCHEDULED_AT)
    }

    fn decode(key: &str, item: &Item) -> Result<EmailRecord, RepositoryError> {
        codec::from_item(item).map_err(|source| RepositoryError::Codec {
            key: key.to_string(),
            source,
        })
    }

    /// Decode a batch, logging and dropping anything malformed
    fn decode_all<'a>(items: impl IntoIterator<Item = (&'a str, &'a Item)>) -> Vec<EmailRecord> {
        items
            .into_iter()
            .filter_map(|(key, item)| match Self::decode(key, item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key, error = %e, "Skipping malformed email record");
                    None
                }
            })
            .collect()
    }

    /// Fetch one record
    ///
    /// # Errors
    /// [`RepositoryError::NotFound`] if absent, otherwise storage or codec errors
    pub async fn get(&self, id: &EmailId) -> Result<EmailRecord, RepositoryError> {
        let key = id.to_string();
        let item = self
            .store
            .get_item(&key)
            .await
            .map_err(|e| RepositoryError::for_record(*id, e))?;
        Self::decode(&key, &item)
    }

    /// Up to `max_count` queued records, earliest `scheduled_at` first
    ///
    /// Served from the queue index, so the cost does not depend on how many
    /// completed or failed records the table holds.
    ///
    /// # Errors
    /// Returns an error if the store cannot be queried
    pub async fn list_queued(&self, max_count: usize) -> Result<Vec<EmailRecord>, RepositoryError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let items = self
            .store
            .scan_index(QUEUE_INDEX, &codec::status(SendStatus::Queued), max_count)
            .await?;

        let records = Self::decode_all(items.iter().map(|item| {
            let key = item.get(attr::ID).and_then(|id| id.as_str()).unwrap_or("<unknown>");
            (key, item)
        }));
        debug!(count = records.len(), max_count, "Listed queued emails");

        Ok(records)
    }

    /// Apply a partial update, stamping `updated_at`, and return the new state
    ///
    /// # Errors
    /// [`RepositoryError::NotFound`] if absent, otherwise storage or codec errors
    pub async fn update(
        &self,
        id: &EmailId,
        changes: EmailChanges,
    ) -> Result<EmailRecord, RepositoryError> {
        let key = id.to_string();
        let change_set = changes.into_change_set(Utc::now());
        let item = self
            .store
            .update_item(&key, &change_set)
            .await
            .map_err(|e| RepositoryError::for_record(*id, e))?;
        Self::decode(&key, &item)
    }

    /// Persist a new record with a fresh identifier and creation timestamps
    ///
    /// # Errors
    /// Returns an error if the store rejects the write
    pub async fn store(
        &self,
        email: NewEmail,
        send_status: SendStatus,
        scheduled_at: DateTime<Utc>,
    ) -> Result<EmailRecord, RepositoryError> {
        let now = stored_precision(Utc::now());
        let record = EmailRecord {
            id: EmailId::generate(),
            recipients: email.recipients,
            template: email.template,
            substitutions: email.substitutions,
            provider_id: None,
            send_status,
            scheduled_at: Some(stored_precision(scheduled_at)),
            attempts: 0,
            accepted: 0,
            rejected: 0,
            last_attempt_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store
            .put_item(&record.id.to_string(), codec::to_item(&record))
            .await?;
        debug!(email_id = %record.id, status = %send_status, "Stored email");

        Ok(record)
    }

    /// One page of all records in creation order
    ///
    /// `page` starts at 1; `limit` must be between 1 and [`MAX_PAGE_LIMIT`].
    ///
    /// # Errors
    /// [`RepositoryError::InvalidPagination`] for out-of-range arguments,
    /// otherwise storage errors
    pub async fn list(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<Vec<EmailRecord>, RepositoryError> {
        if page == 0 {
            return Err(RepositoryError::InvalidPagination(
                "page must be at least 1".to_string(),
            ));
        }
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(RepositoryError::InvalidPagination(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {limit}"
            )));
        }

        let mut start_after: Option<String> = None;
        for _ in 1..page {
            match self.store.scan(start_after.as_deref(), limit).await?.last_key {
                Some(key) => start_after = Some(key),
                None => return Ok(Vec::new()),
            }
        }

        let page = self.store.scan(start_after.as_deref(), limit).await?;
        Ok(Self::decode_all(
            page.items.iter().map(|(key, item)| (key.as_str(), item)),
        ))
    }

    /// Remove a record
    ///
    /// # Errors
    /// [`RepositoryError::NotFound`] if absent, otherwise storage errors
    pub async fn delete(&self, id: &EmailId) -> Result<(), RepositoryError> {
        self.store
            .delete_item(&id.to_string())
            .await
            .map_err(|e| RepositoryError::for_record(*id, e))?;
        debug!(email_id = %id, "Deleted email");
        Ok(())
    }
}
