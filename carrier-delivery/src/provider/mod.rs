//! Delivery provider abstraction
//!
//! A provider is prepared once with [`DeliveryProvider::initialize`] and
//! then asked to [`send`](DeliveryProvider::send) any number of templated
//! emails. The retry policy does not distinguish between failure causes, so
//! [`ProviderError`] variants exist for logging only.

mod mock;
mod sparkpost;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::{
    mock::{MockProvider, SendCall},
    sparkpost::{SparkPostConfig, SparkPostProvider},
};

/// Outcome of a successful send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transmission {
    /// Identifier the provider assigned to this transmission
    pub provider_id: String,
    pub accepted: u32,
    pub rejected: u32,
}

/// A send attempt failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// `send` was called before a successful `initialize`.
    #[error("Provider used before initialisation")]
    NotInitialized,

    /// The request never produced a response (connect, TLS, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with an error status.
    #[error("Provider rejected transmission ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider answered successfully but the body made no sense.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// The provider could not be prepared for sending.
#[derive(Debug, Error)]
pub enum ProviderInitError {
    #[error("No API key configured (set `api_key` or SPARKPOST_API_KEY)")]
    MissingApiKey,

    #[error("Invalid provider endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Unable to build HTTP client: {0}")]
    Client(String),
}

/// A transactional email service.
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    /// Prepare for sending (credentials, endpoint, connection pool)
    async fn initialize(&mut self) -> Result<(), ProviderInitError>;

    /// Transmit one templated email to every recipient
    async fn send(
        &self,
        recipients: &[String],
        template: &str,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<Transmission, ProviderError>;
}
