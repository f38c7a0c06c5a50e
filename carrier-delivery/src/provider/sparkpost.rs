use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use carrier_common::outgoing;
use serde::{Deserialize, Serialize};

use super::{DeliveryProvider, ProviderError, ProviderInitError, Transmission};

const API_KEY_ENV: &str = "SPARKPOST_API_KEY";

fn default_base_url() -> String {
    "https://api.sparkpost.com".to_string()
}

const fn default_api_version() -> u32 {
    1
}

const fn default_timeout_secs() -> u64 {
    30
}

/// SparkPost connection settings
///
/// ```ron
/// provider: (
///     base_url: "https://api.eu.sparkpost.com",
///     api_key: "...",
/// )
/// ```
///
/// When `api_key` is omitted it is read from `SPARKPOST_API_KEY` at
/// initialisation time.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SparkPostConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: u32,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SparkPostConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for SparkPostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparkPostConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SparkPostConfig {
    /// Configured key, else the environment; blank values count as missing
    fn resolve_api_key(&self, env: Option<String>) -> Result<String, ProviderInitError> {
        self.api_key
            .clone()
            .or(env)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ProviderInitError::MissingApiKey)
    }

    fn transmissions_url(&self) -> Result<String, ProviderInitError> {
        let base = self.base_url.trim_end_matches('/');
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ProviderInitError::InvalidEndpoint(self.base_url.clone()));
        }
        if self.api_version == 0 {
            return Err(ProviderInitError::InvalidEndpoint(format!(
                "API version must be at least 1, got {}",
                self.api_version
            )));
        }
        Ok(format!("{base}/api/v{}/transmissions", self.api_version))
    }
}

#[derive(Debug)]
struct Session {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

/// Delivery through the SparkPost transmissions API
#[derive(Debug)]
pub struct SparkPostProvider {
    config: SparkPostConfig,
    session: Option<Session>,
}

impl SparkPostProvider {
    #[must_use]
    pub const fn new(config: SparkPostConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    address: Address<'a>,
    substitution_data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    template_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TransmissionRequest<'a> {
    recipients: Vec<Recipient<'a>>,
    content: Content<'a>,
}

impl<'a> TransmissionRequest<'a> {
    fn new(
        recipients: &'a [String],
        template: &'a str,
        substitutions: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            recipients: recipients
                .iter()
                .map(|email| Recipient {
                    address: Address { email },
                    substitution_data: substitutions,
                })
                .collect(),
            content: Content {
                template_id: template,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TransmissionResults {
    id: String,
    total_accepted_recipients: u32,
    total_rejected_recipients: u32,
}

#[derive(Debug, Deserialize)]
struct TransmissionResponse {
    results: TransmissionResults,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    errors: Vec<ApiError>,
}

fn parse_success(body: &str) -> Result<Transmission, ProviderError> {
    let response: TransmissionResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    if response.results.id.trim().is_empty() {
        return Err(ProviderError::InvalidResponse(
            "transmission id is empty".to_string(),
        ));
    }

    Ok(Transmission {
        provider_id: response.results.id,
        accepted: response.results.total_accepted_recipients,
        rejected: response.results.total_rejected_recipients,
    })
}

/// Best-effort summary of an error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body).map_or_else(
        |_| body.trim().to_string(),
        |response| {
            response
                .errors
                .iter()
                .map(|e| match &e.description {
                    Some(description) => format!("{}: {description}", e.message),
                    None => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ")
        },
    )
}

#[async_trait]
impl DeliveryProvider for SparkPostProvider {
    async fn initialize(&mut self) -> Result<(), ProviderInitError> {
        let api_key = self
            .config
            .resolve_api_key(std::env::var(API_KEY_ENV).ok())?;
        let url = self.config.transmissions_url()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| ProviderInitError::Client(e.to_string()))?;

        outgoing!(level = DEBUG, %url, "SparkPost client initialised");
        self.session = Some(Session {
            client,
            url,
            api_key,
        });

        Ok(())
    }

    async fn send(
        &self,
        recipients: &[String],
        template: &str,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<Transmission, ProviderError> {
        let session = self.session.as_ref().ok_or(ProviderError::NotInitialized)?;
        let request = TransmissionRequest::new(recipients, template, substitutions);

        let response = session
            .client
            .post(&session.url)
            .header(reqwest::header::AUTHORIZATION, &session.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let transmission = parse_success(&body)?;
        outgoing!(
            level = DEBUG,
            provider_id = %transmission.provider_id,
            accepted = transmission.accepted,
            rejected = transmission.rejected,
            "SparkPost transmission accepted"
        );

        Ok(transmission)
    }
}
