use std::collections::BTreeMap;

use carrier_common::SendStatus;
use carrier_store::{AttributeValue, ChangeSet};
use chrono::{DateTime, Utc};

use super::codec::{self, attr};
use crate::provider::Transmission;

/// Typed partial update for an email record.
///
/// Each setter records an explicit `Set`, and [`clear_scheduled_at`] records
/// an explicit `Remove`, so "leave untouched" and "clear" never collapse
/// into one another. `updated_at` is stamped by the repository when the
/// change set is applied.
///
/// [`clear_scheduled_at`]: EmailChanges::clear_scheduled_at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailChanges {
    changes: ChangeSet,
}

impl EmailChanges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn recipients(self, recipients: Vec<String>) -> Self {
        self.set(attr::RECIPIENTS, AttributeValue::from(recipients))
    }

    #[must_use]
    pub fn template(self, template: impl Into<String>) -> Self {
        self.set(attr::TEMPLATE, AttributeValue::String(template.into()))
    }

    #[must_use]
    pub fn substitutions(self, substitutions: BTreeMap<String, String>) -> Self {
        self.set(attr::SUBSTITUTIONS, AttributeValue::from(substitutions))
    }

    #[must_use]
    pub fn send_status(self, status: SendStatus) -> Self {
        self.set(attr::SEND_STATUS, codec::status(status))
    }

    #[must_use]
    pub fn scheduled_at(self, at: DateTime<Utc>) -> Self {
        self.set(attr::SCHEDULED_AT, codec::timestamp(at))
    }

    /// Drop the schedule, taking the record out of the queue index
    #[must_use]
    pub fn clear_scheduled_at(self) -> Self {
        Self {
            changes: self.changes.remove(attr::SCHEDULED_AT),
        }
    }

    #[must_use]
    pub fn attempts(self, attempts: u32) -> Self {
        self.set(attr::ATTEMPTS, AttributeValue::from(attempts))
    }

    #[must_use]
    pub fn last_attempt_at(self, at: DateTime<Utc>) -> Self {
        self.set(attr::LAST_ATTEMPT_AT, codec::timestamp(at))
    }

    #[must_use]
    pub fn provider_id(self, provider_id: impl Into<String>) -> Self {
        self.set(attr::PROVIDER_ID, AttributeValue::String(provider_id.into()))
    }

    #[must_use]
    pub fn accepted(self, accepted: u32) -> Self {
        self.set(attr::ACCEPTED, AttributeValue::from(accepted))
    }

    #[must_use]
    pub fn rejected(self, rejected: u32) -> Self {
        self.set(attr::REJECTED, AttributeValue::from(rejected))
    }

    /// Terminal success after attempt number `attempts`
    #[must_use]
    pub fn completed(attempts: u32, transmission: &Transmission, at: DateTime<Utc>) -> Self {
        Self::new()
            .attempts(attempts)
            .send_status(SendStatus::Complete)
            .clear_scheduled_at()
            .provider_id(transmission.provider_id.as_str())
            .accepted(transmission.accepted)
            .rejected(transmission.rejected)
            .last_attempt_at(at)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn set(self, attribute: &str, value: AttributeValue) -> Self {
        Self {
            changes: self.changes.set(attribute, value),
        }
    }

    pub(crate) fn into_change_set(self, updated_at: DateTime<Utc>) -> ChangeSet {
        self.changes
            .set(attr::UPDATED_AT, codec::timestamp(updated_at))
    }
}
