//! Typed errors for the email queue.
//!
//! Storage and codec failures are separated so callers can tell a missing
//! record from an unreachable store from a record that no longer decodes.
//! Provider errors live with the provider abstraction.

use carrier_common::UnknownStatus;
use carrier_store::StoreError;
use thiserror::Error;

use crate::{provider::ProviderInitError, types::EmailId};

/// A stored item could not be turned back into an [`EmailRecord`](crate::EmailRecord).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("missing attribute `{0}`")]
    Missing(&'static str),

    #[error("attribute `{attribute}` should be a {expected}, found a {found}")]
    WrongType {
        attribute: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("attribute `{attribute}` is out of range: {value}")]
    OutOfRange { attribute: &'static str, value: i64 },

    #[error("attribute `{attribute}` is not an RFC 3339 timestamp: {source}")]
    Timestamp {
        attribute: &'static str,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid email id: {0}")]
    Id(#[from] ulid::DecodeError),

    #[error(transparent)]
    Status(#[from] UnknownStatus),
}

/// Errors surfaced by [`EmailRepository`](crate::EmailRepository).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested record does not exist.
    #[error("Email not found: {0}")]
    NotFound(EmailId),

    /// The record store failed; usually transient.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// A stored record could not be decoded.
    #[error("Malformed email record {key}: {source}")]
    Codec {
        key: String,
        #[source]
        source: CodecError,
    },

    /// Page or limit outside the accepted range.
    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),
}

impl RepositoryError {
    /// Map a store error for a specific record, keeping `NotFound` distinct
    pub(crate) fn for_record(id: EmailId, error: StoreError) -> Self {
        if error.is_not_found() {
            Self::NotFound(id)
        } else {
            Self::Storage(error)
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Failures worth retrying later without any change on the caller's side
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Reasons a [`NewEmail`](crate::NewEmail) is refused at intake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one recipient is required")]
    NoRecipients,

    #[error("invalid recipient address: {0:?}")]
    InvalidRecipient(String),

    #[error("template must be between 2 and 255 characters, got {0}")]
    TemplateLength(usize),

    #[error("an amendment must change at least one field")]
    NoChanges,
}

/// Errors surfaced by the intake helpers.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Invalid email: {0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors that abort a whole queue invocation.
///
/// Per-record failures never surface here; they are folded into the
/// record's state and the [`InvocationReport`](crate::InvocationReport).
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue could not be listed; nothing was mutated.
    #[error("Unable to list queued emails: {0}")]
    Listing(#[source] RepositoryError),

    /// The delivery provider could not be prepared; nothing was mutated.
    #[error("Unable to initialise delivery provider: {0}")]
    ProviderInit(#[from] ProviderInitError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_record() {
        let id = EmailId::generate();
        let err = RepositoryError::for_record(id, StoreError::NotFound(id.to_string()));
        assert!(err.is_not_found());
        assert!(!err.is_transient());

        let err = RepositoryError::for_record(id, StoreError::Unavailable("busy".to_string()));
        assert!(!err.is_not_found());
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ValidationError::TemplateLength(1).to_string(),
            "template must be between 2 and 255 characters, got 1"
        );
        let err = QueueError::Listing(RepositoryError::Storage(StoreError::Unavailable(
            "throttled".to_string(),
        )));
        assert!(err.to_string().contains("throttled"));
    }
}
