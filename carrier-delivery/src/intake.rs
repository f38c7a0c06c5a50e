//! Accepting new emails: validation, queueing and immediate sends, plus
//! operator amendments to stored ones

use carrier_common::{
    SendStatus,
    tracing::{info, warn},
};
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{
    error::{IntakeError, ValidationError},
    provider::DeliveryProvider,
    repository::{EmailChanges, EmailRepository},
    types::{EmailId, EmailRecord, NewEmail},
};

const TEMPLATE_LENGTH: std::ops::RangeInclusive<usize> = 2..=255;

/// `local@domain` with a dotted domain and no whitespace
fn is_plausible_address(address: &str) -> bool {
    let Some((local, domain)) = address.rsplit_once('@') else {
        return false;
    };

    !local.is_empty()
        && !local.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace)
}

/// Check an email before it is stored
///
/// # Errors
/// The first problem found, recipients before template.
pub fn validate(email: &NewEmail) -> Result<(), ValidationError> {
    validate_recipients(&email.recipients)?;
    validate_template(&email.template)
}

fn validate_recipients(recipients: &[String]) -> Result<(), ValidationError> {
    if recipients.is_empty() {
        return Err(ValidationError::NoRecipients);
    }

    if let Some(bad) = recipients
        .iter()
        .find(|address| !is_plausible_address(address))
    {
        return Err(ValidationError::InvalidRecipient(bad.clone()));
    }

    Ok(())
}

fn validate_template(template: &str) -> Result<(), ValidationError> {
    let length = template.chars().count();
    if !TEMPLATE_LENGTH.contains(&length) {
        return Err(ValidationError::TemplateLength(length));
    }

    Ok(())
}

/// Queue an email for the processor to send at or after `at`
///
/// # Errors
/// Validation failures, or the store refusing the write.
pub async fn enqueue(
    repository: &EmailRepository,
    email: NewEmail,
    at: DateTime<Utc>,
) -> Result<EmailRecord, IntakeError> {
    validate(&email)?;
    let record = repository.store(email, SendStatus::Queued, at).await?;
    info!(email_id = %record.id, scheduled_at = %at, "Email queued");
    Ok(record)
}

/// Store an email and attempt delivery straight away
///
/// A failed attempt leaves the email queued at its submission time, so the
/// processor picks it up on its next run. Provider initialisation failure
/// counts as no attempt at all.
///
/// # Errors
/// Validation failures, or the store refusing a write. Delivery failures
/// are not errors; they are visible in the returned record's status.
pub async fn send_now(
    repository: &EmailRepository,
    provider: &mut dyn DeliveryProvider,
    email: NewEmail,
    now: DateTime<Utc>,
) -> Result<EmailRecord, IntakeError> {
    validate(&email)?;
    let record = repository.store(email, SendStatus::Processing, now).await?;
    let id = record.id;

    if let Err(e) = provider.initialize().await {
        warn!(email_id = %id, error = %e, "Provider unavailable, email queued instead");
        let record = repository
            .update(&id, EmailChanges::new().send_status(SendStatus::Queued))
            .await?;
        return Ok(record);
    }

    let attempts = record.attempts.saturating_add(1);
    let changes = match provider
        .send(&record.recipients, &record.template, &record.substitutions)
        .await
    {
        Ok(transmission) => {
            info!(
                email_id = %id,
                provider_id = %transmission.provider_id,
                "Email sent"
            );
            EmailChanges::completed(attempts, &transmission, now)
        }
        Err(e) => {
            warn!(email_id = %id, attempts, error = %e, "Immediate send failed, email queued");
            EmailChanges::new()
                .send_status(SendStatus::Queued)
                .attempts(attempts)
                .last_attempt_at(now)
        }
    };

    Ok(repository.update(&id, changes).await?)
}

/// What to do with a record's schedule when amending it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reschedule {
    At(DateTime<Utc>),
    /// Remove the schedule, taking the record out of the queue
    Clear,
}

/// Operator edits to a stored email. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Amendment {
    pub recipients: Option<Vec<String>>,
    pub template: Option<String>,
    pub substitutions: Option<BTreeMap<String, String>>,
    pub send_status: Option<SendStatus>,
    pub schedule: Option<Reschedule>,
    /// Start the attempt count from zero again
    pub reset_attempts: bool,
}

impl Amendment {
    fn into_changes(self) -> Result<EmailChanges, ValidationError> {
        let mut changes = EmailChanges::new();

        if let Some(recipients) = self.recipients {
            validate_recipients(&recipients)?;
            changes = changes.recipients(recipients);
        }
        if let Some(template) = self.template {
            validate_template(&template)?;
            changes = changes.template(template);
        }
        if let Some(substitutions) = self.substitutions {
            changes = changes.substitutions(substitutions);
        }
        if let Some(status) = self.send_status {
            changes = changes.send_status(status);
        }
        changes = match self.schedule {
            Some(Reschedule::At(at)) => changes.scheduled_at(at),
            Some(Reschedule::Clear) => changes.clear_scheduled_at(),
            None => changes,
        };
        if self.reset_attempts {
            changes = changes.attempts(0);
        }

        if changes.is_empty() {
            return Err(ValidationError::NoChanges);
        }
        Ok(changes)
    }
}

/// Apply operator edits to a stored email
///
/// Moving a record to `Queued` without a schedule, when it has none, queues
/// it at `now` so the processor can see it.
///
/// # Errors
/// Validation failures (including an amendment that changes nothing),
/// [`RepositoryError::NotFound`](crate::RepositoryError::NotFound), or the
/// store refusing the write.
pub async fn amend(
    repository: &EmailRepository,
    id: &EmailId,
    amendment: Amendment,
    now: DateTime<Utc>,
) -> Result<EmailRecord, IntakeError> {
    let requeue =
        amendment.send_status == Some(SendStatus::Queued) && amendment.schedule.is_none();
    let mut changes = amendment.into_changes()?;

    if requeue && repository.get(id).await?.scheduled_at.is_none() {
        changes = changes.scheduled_at(now);
    }

    let record = repository.update(id, changes).await?;
    info!(
        email_id = %id,
        send_status = %record.send_status,
        scheduled_at = ?record.scheduled_at,
        "Email amended"
    );
    Ok(record)
}
