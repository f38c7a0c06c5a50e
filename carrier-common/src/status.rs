use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of an email record.
///
/// Persisted as a small integer. Progression is `Queued -> Processing ->
/// Complete | Failed`, with `Processing -> Queued` as the only backward
/// step (transient failure).
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Queued = 1,
    Processing = 2,
    Complete = 3,
    Failed = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown send status code: {0}")]
pub struct UnknownStatus(pub i64);

impl SendStatus {
    /// Terminal states never receive further delivery attempts
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<i64> for SendStatus {
    type Error = UnknownStatus;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Queued),
            2 => Ok(Self::Processing),
            3 => Ok(Self::Complete),
            4 => Ok(Self::Failed),
            _ => Err(UnknownStatus(value)),
        }
    }
}

impl From<SendStatus> for i64 {
    fn from(value: SendStatus) -> Self {
        value.code()
    }
}

impl Display for SendStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{SendStatus, UnknownStatus};

    #[test]
    fn status_codes() {
        assert_eq!(i64::from(SendStatus::Queued), 1);
        assert_eq!(i64::from(SendStatus::Processing), 2);
        assert_eq!(i64::from(SendStatus::Complete), 3);
        assert_eq!(i64::from(SendStatus::Failed), 4);

        assert_eq!(SendStatus::try_from(3), Ok(SendStatus::Complete));
        assert_eq!(SendStatus::try_from(0), Err(UnknownStatus(0)));
        assert_eq!(SendStatus::try_from(5), Err(UnknownStatus(5)));
    }

    #[test]
    fn terminal() {
        assert!(!SendStatus::Queued.is_terminal());
        assert!(!SendStatus::Processing.is_terminal());
        assert!(SendStatus::Complete.is_terminal());
        assert!(SendStatus::Failed.is_terminal());
    }

    #[test]
    fn display_and_serde() {
        assert_eq!(SendStatus::Processing.to_string(), "processing");
        assert_eq!(
            serde_json::to_string(&SendStatus::Failed).unwrap_or_default(),
            "\"failed\""
        );
    }
}
