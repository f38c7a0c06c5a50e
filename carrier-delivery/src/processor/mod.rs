//! Queue processor orchestration

pub mod process;

use std::time::Duration;

use carrier_common::{Signal, internal, tracing::error};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::{sync::broadcast, time::MissedTickBehavior};

pub use process::{InvocationReport, StopReason};

use crate::{
    error::QueueError, policy::RetryPolicy, provider::DeliveryProvider,
    repository::EmailRepository,
};

const fn default_interval() -> u64 {
    60
}

const fn default_batch_limit() -> usize {
    25
}

/// Processor for draining the email queue
///
/// Each invocation lists queued emails earliest schedule first, attempts
/// the ones that are due and applies the retry policy to failures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueProcessor {
    /// How often to run an invocation (in seconds)
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Maximum number of delivery attempts per invocation
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for QueueProcessor {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            batch_limit: default_batch_limit(),
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueProcessor {
    /// Reject settings under which the processor would make no progress
    ///
    /// # Errors
    /// Returns [`QueueError::Configuration`] naming the offending setting.
    pub fn validate(&self) -> Result<(), QueueError> {
        let problem = if self.interval_secs == 0 {
            "interval_secs must be at least 1"
        } else if self.batch_limit == 0 {
            "batch_limit must be at least 1"
        } else if self.retry.attempt_limit == 0 {
            "retry.attempt_limit must be at least 1"
        } else if self.retry.backoff_unit_secs == 0 {
            "retry.backoff_unit_secs must be at least 1"
        } else {
            return Ok(());
        };

        Err(QueueError::Configuration(problem.to_string()))
    }

    /// Run one invocation against the current time
    ///
    /// # Errors
    /// See [`QueueProcessor::run_at`].
    pub async fn run_once(
        &self,
        repository: &EmailRepository,
        provider: &mut dyn DeliveryProvider,
    ) -> Result<InvocationReport, QueueError> {
        self.run_at(repository, provider, Utc::now()).await
    }

    /// Run one invocation as if the time were `now`
    ///
    /// # Errors
    /// Fails on invalid configuration, when the queue cannot be listed or
    /// when the provider cannot be initialised. No record is modified in
    /// any of those cases.
    pub async fn run_at(
        &self,
        repository: &EmailRepository,
        provider: &mut dyn DeliveryProvider,
        now: DateTime<Utc>,
    ) -> Result<InvocationReport, QueueError> {
        self.validate()?;
        process::process_queue(self, repository, provider, now).await
    }

    /// Run invocations until a shutdown signal arrives
    ///
    /// The first invocation starts immediately. A fresh provider is built
    /// for every invocation. A shutdown signal is only observed between
    /// invocations, so one that is running always finishes.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid. Failed invocations
    /// are logged and retried on the next tick.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve<F>(
        &self,
        repository: &EmailRepository,
        mut make_provider: F,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), QueueError>
    where
        F: FnMut() -> Box<dyn DeliveryProvider> + Send,
    {
        self.validate()?;
        internal!(
            level = INFO,
            interval_secs = self.interval_secs,
            batch_limit = self.batch_limit,
            attempt_limit = self.retry.attempt_limit,
            "Queue processor starting"
        );

        let mut timer = tokio::time::interval(Duration::from_secs(self.interval_secs));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!(level = INFO, "Queue processor received shutdown signal");
                            break;
                        }
                        Err(e) => {
                            error!("Queue processor shutdown channel error: {e}");
                            break;
                        }
                    }
                }
                _ = timer.tick() => {
                    let mut provider = make_provider();
                    match self.run_once(repository, provider.as_mut()).await {
                        Ok(report) => report.log(),
                        Err(e) => error!(error = %e, "Queue invocation aborted"),
                    }
                }
            }
        }

        internal!(level = INFO, "Queue processor shutdown complete");
        Ok(())
    }
}
