use std::{collections::BTreeMap, str::FromStr};

use carrier_common::SendStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for an email record
///
/// A ULID, so identifiers sort by creation time and double as safe record
/// store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmailId {
    id: ulid::Ulid,
}

impl EmailId {
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a new unique email ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }
}

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl FromStr for EmailId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self::new)
    }
}

impl Serialize for EmailId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> Deserialize<'de> for EmailId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A request to send one templated email, before it has been persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmail {
    pub recipients: Vec<String>,
    pub template: String,
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,
}

impl NewEmail {
    #[must_use]
    pub fn new(recipients: Vec<String>, template: impl Into<String>) -> Self {
        Self {
            recipients,
            template: template.into(),
            substitutions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_substitution(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.substitutions.insert(key.into(), value.into());
        self
    }
}

/// A persisted email and its delivery state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: EmailId,
    pub recipients: Vec<String>,
    pub template: String,
    pub substitutions: BTreeMap<String, String>,
    /// Transmission ID assigned by the provider once a send succeeds
    pub provider_id: Option<String>,
    pub send_status: SendStatus,
    /// Earliest time the next attempt may run; absent once terminal
    pub scheduled_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailRecord {
    /// Whether this record may be attempted at `now`
    ///
    /// A queued record without a schedule is treated as due.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.send_status == SendStatus::Queued && self.scheduled_at.is_none_or(|at| at <= now)
    }
}
