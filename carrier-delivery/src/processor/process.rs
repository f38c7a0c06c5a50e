//! One queue invocation: list, gate on schedule, attempt, record outcome

use carrier_common::{
    SendStatus, internal,
    tracing::{debug, info, warn},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::QueueError,
    policy::RetryPolicy,
    processor::QueueProcessor,
    provider::DeliveryProvider,
    repository::{EmailChanges, EmailRepository},
    types::EmailRecord,
};

/// Why an invocation stopped taking records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every listed record was handled and the queue held no more
    #[default]
    QueueDrained,
    /// The next record in schedule order is not due yet
    NotYetDue,
    /// The batch limit was reached
    BatchLimit,
}

/// What one invocation did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvocationReport {
    /// Queued records returned by the listing
    pub listed: usize,
    /// Delivery attempts made
    pub attempted: usize,
    pub completed: usize,
    /// Failed attempts pushed back into the queue
    pub rescheduled: usize,
    /// Failed attempts that used up the attempt limit
    pub failed: usize,
    /// Status updates that could not be persisted
    pub update_failures: usize,
    pub stop_reason: StopReason,
}

impl InvocationReport {
    pub fn log(&self) {
        info!(
            listed = self.listed,
            attempted = self.attempted,
            completed = self.completed,
            rescheduled = self.rescheduled,
            failed = self.failed,
            update_failures = self.update_failures,
            stop_reason = ?self.stop_reason,
            "Queue invocation finished"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Rescheduled(DateTime<Utc>),
    Failed,
}

/// State after a failed attempt number `attempts`
fn after_failure(
    policy: &RetryPolicy,
    record: &EmailRecord,
    attempts: u32,
    now: DateTime<Utc>,
) -> (EmailChanges, Outcome) {
    let changes = EmailChanges::new().attempts(attempts).last_attempt_at(now);

    let next = if policy.is_exhausted(attempts) {
        None
    } else {
        policy.next_attempt_at(record.scheduled_at.unwrap_or(now), attempts)
    };

    match next {
        Some(at) => (
            changes.send_status(SendStatus::Queued).scheduled_at(at),
            Outcome::Rescheduled(at),
        ),
        None => (
            changes.send_status(SendStatus::Failed).clear_scheduled_at(),
            Outcome::Failed,
        ),
    }
}

async fn attempt(
    policy: &RetryPolicy,
    repository: &EmailRepository,
    provider: &dyn DeliveryProvider,
    record: &EmailRecord,
    now: DateTime<Utc>,
    report: &mut InvocationReport,
) {
    let id = record.id;

    // Advisory only; the send goes ahead even if this does not persist.
    if let Err(e) = repository
        .update(&id, EmailChanges::new().send_status(SendStatus::Processing))
        .await
    {
        warn!(email_id = %id, error = %e, "Unable to mark email as processing");
        report.update_failures += 1;
    }

    let attempts = record.attempts.saturating_add(1);
    report.attempted += 1;

    let (changes, outcome) = match provider
        .send(&record.recipients, &record.template, &record.substitutions)
        .await
    {
        Ok(transmission) => {
            debug!(
                email_id = %id,
                attempts,
                provider_id = %transmission.provider_id,
                "Email sent"
            );
            (
                EmailChanges::completed(attempts, &transmission, now),
                Outcome::Completed,
            )
        }
        Err(e) => {
            let (changes, outcome) = after_failure(policy, record, attempts, now);
            match outcome {
                Outcome::Rescheduled(next_attempt_at) => warn!(
                    email_id = %id,
                    attempts,
                    error = %e,
                    %next_attempt_at,
                    "Delivery attempt failed, rescheduled"
                ),
                _ => warn!(
                    email_id = %id,
                    attempts,
                    error = %e,
                    "Delivery attempt failed, giving up"
                ),
            }
            (changes, outcome)
        }
    };

    match outcome {
        Outcome::Completed => report.completed += 1,
        Outcome::Rescheduled(_) => report.rescheduled += 1,
        Outcome::Failed => report.failed += 1,
    }

    if let Err(e) = repository.update(&id, changes).await {
        warn!(
            email_id = %id,
            attempts,
            error = %e,
            "Unable to record delivery outcome"
        );
        report.update_failures += 1;
    }
}

/// Drain due records from the queue, earliest schedule first
///
/// The provider is initialised only once the first due record is found,
/// and at most once per invocation.
///
/// # Errors
/// Listing failures and provider initialisation failures abort the
/// invocation before any record is touched. Everything else is logged and
/// counted in the report.
#[tracing::instrument(level = "debug", skip_all, fields(batch_limit = processor.batch_limit))]
pub async fn process_queue(
    processor: &QueueProcessor,
    repository: &EmailRepository,
    provider: &mut dyn DeliveryProvider,
    now: DateTime<Utc>,
) -> Result<InvocationReport, QueueError> {
    let queued = repository
        .list_queued(processor.batch_limit)
        .await
        .map_err(QueueError::Listing)?;

    let mut report = InvocationReport {
        listed: queued.len(),
        stop_reason: if queued.len() >= processor.batch_limit {
            StopReason::BatchLimit
        } else {
            StopReason::QueueDrained
        },
        ..InvocationReport::default()
    };

    let mut initialized = false;
    for record in &queued {
        // Ascending schedule order: nothing after this one is due either.
        if !record.is_due(now) {
            debug!(
                email_id = %record.id,
                scheduled_at = ?record.scheduled_at,
                "Next queued email not yet due"
            );
            report.stop_reason = StopReason::NotYetDue;
            break;
        }

        if !initialized {
            provider.initialize().await?;
            initialized = true;
            internal!(level = DEBUG, "Delivery provider initialised");
        }

        attempt(
            &processor.retry,
            repository,
            &*provider,
            record,
            now,
            &mut report,
        )
        .await;
    }

    Ok(report)
}
