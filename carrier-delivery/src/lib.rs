//! Email delivery queue for carrier
//!
//! This crate provides:
//! - The typed [`EmailRecord`] and its persistence façade [`EmailRepository`]
//! - The [`DeliveryProvider`] abstraction with SparkPost and mock implementations
//! - The [`RetryPolicy`] deciding eligibility, backoff and permanent failure
//! - The [`QueueProcessor`] that drains due records and applies the policy
//! - Intake helpers to queue an email or send it straight away

mod error;
pub mod intake;
pub mod policy;
pub mod processor;
pub mod provider;
pub mod repository;
mod types;

pub use carrier_common::SendStatus;
pub use error::{CodecError, IntakeError, QueueError, RepositoryError, ValidationError};
pub use policy::RetryPolicy;
pub use processor::{InvocationReport, QueueProcessor, StopReason};
pub use provider::{
    DeliveryProvider, MockProvider, ProviderError, ProviderInitError, SendCall, SparkPostConfig,
    SparkPostProvider, Transmission,
};
pub use repository::{EmailChanges, EmailRepository, MAX_PAGE_LIMIT, QUEUE_INDEX};
pub use types::{EmailId, EmailRecord, NewEmail};
