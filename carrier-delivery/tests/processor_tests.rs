//! Integration tests for the queue processor

mod support;

use carrier_delivery::{
    MockProvider, QueueError, QueueProcessor, RetryPolicy, SendStatus, StopReason,
};
use carrier_store::{AttributeValue, Change};
use chrono::TimeDelta;
use pretty_assertions::assert_eq;

use support::{Harness, t};

fn processor() -> QueueProcessor {
    QueueProcessor::default()
}

#[tokio::test]
async fn test_first_attempt_success_completes_record() {
    let harness = Harness::new();
    let record = harness.queued(1, 0, t(0)).await;

    let report = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(5))
        .await
        .expect("Invocation failed");

    let record = harness.get(&record.id).await;
    assert_eq!(record.send_status, SendStatus::Complete);
    assert_eq!(record.scheduled_at, None);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.provider_id.as_deref(), Some("mock-1"));
    assert_eq!(record.accepted, 1);
    assert_eq!(record.rejected, 0);
    assert_eq!(record.last_attempt_at, Some(t(5)));

    assert_eq!(report.attempted, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.stop_reason, StopReason::QueueDrained);
}

#[tokio::test]
async fn test_failure_at_attempt_limit_is_terminal() {
    let harness = Harness::with_provider(MockProvider::failing());
    let record = harness.queued(1, 4, t(0)).await;

    let report = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await
        .expect("Invocation failed");

    let record = harness.get(&record.id).await;
    assert_eq!(record.attempts, 5);
    assert_eq!(record.send_status, SendStatus::Failed);
    assert_eq!(record.scheduled_at, None);
    assert_eq!(record.last_attempt_at, Some(t(0)));
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_failure_backs_off_from_previous_schedule() {
    let harness = Harness::with_provider(MockProvider::failing());
    let record = harness.queued(1, 1, t(0)).await;

    // The processor runs late; the backoff still counts from t(0).
    let report = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(3))
        .await
        .expect("Invocation failed");

    let record = harness.get(&record.id).await;
    assert_eq!(record.attempts, 2);
    assert_eq!(record.send_status, SendStatus::Queued);
    assert_eq!(record.scheduled_at, Some(t(4)));
    assert_eq!(report.rescheduled, 1);
}

#[tokio::test]
async fn test_batch_limit_caps_attempts() {
    let harness = Harness::new();
    let mut records = Vec::new();
    for n in 0..30 {
        records.push(harness.queued(n, 0, t(i64::try_from(n).expect("small"))).await);
    }

    let report = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(60))
        .await
        .expect("Invocation failed");

    assert_eq!(report.listed, 25);
    assert_eq!(report.attempted, 25);
    assert_eq!(report.stop_reason, StopReason::BatchLimit);
    assert_eq!(harness.provider.send_count(), 25);

    for (n, seeded) in records.iter().enumerate() {
        let record = harness.get(&seeded.id).await;
        if n < 25 {
            assert_eq!(record.send_status, SendStatus::Complete);
        } else {
            assert_eq!(&record, seeded, "record {n} should be untouched");
        }
    }
}

#[tokio::test]
async fn test_stops_at_first_record_not_yet_due() {
    let harness = Harness::new();
    let first = harness.queued(1, 0, t(0)).await;
    let second = harness.queued(2, 0, t(1)).await;
    let future = harness.queued(3, 0, t(60)).await;

    let report = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(10))
        .await
        .expect("Invocation failed");

    assert_eq!(report.listed, 3);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.stop_reason, StopReason::NotYetDue);
    assert_eq!(harness.get(&first.id).await.send_status, SendStatus::Complete);
    assert_eq!(harness.get(&second.id).await.send_status, SendStatus::Complete);
    assert_eq!(harness.get(&future.id).await, future);
}

#[tokio::test]
async fn test_records_are_attempted_in_schedule_order() {
    let harness = Harness::new();
    harness.queued(1, 0, t(5)).await;
    harness.queued(2, 0, t(1)).await;
    harness.queued(3, 0, t(3)).await;

    processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(10))
        .await
        .expect("Invocation failed");

    let order: Vec<_> = harness
        .provider
        .sends()
        .into_iter()
        .map(|call| call.recipients[0].clone())
        .collect();
    assert_eq!(
        order,
        vec![
            "user2@example.com".to_string(),
            "user3@example.com".to_string(),
            "user1@example.com".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_send_receives_record_contents() {
    let harness = Harness::new();
    harness.queued(7, 0, t(0)).await;

    processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await
        .expect("Invocation failed");

    let sends = harness.provider.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].recipients, vec!["user7@example.com".to_string()]);
    assert_eq!(sends[0].template, "welcome");
    assert_eq!(sends[0].substitutions["n"], "7");
}

#[tokio::test]
async fn test_every_due_record_progresses() {
    let harness = Harness::new();
    harness.provider.script([true, false, false, true, false]);
    harness.provider.set_failing(true);

    let mut seeded = Vec::new();
    for (n, attempts) in [0, 1, 4, 2, 3, 0].into_iter().enumerate() {
        let minutes = i64::try_from(n).expect("small");
        seeded.push(harness.queued(n, attempts, t(minutes)).await);
    }

    processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(30))
        .await
        .expect("Invocation failed");

    let policy = RetryPolicy::default();
    for before in &seeded {
        let after = harness.get(&before.id).await;
        assert_eq!(after.attempts, before.attempts + 1);

        match after.send_status {
            SendStatus::Complete => assert_eq!(after.scheduled_at, None),
            SendStatus::Failed => {
                assert!(policy.is_exhausted(after.attempts));
                assert_eq!(after.scheduled_at, None);
            }
            SendStatus::Queued => {
                assert!(!policy.is_exhausted(after.attempts));
                assert!(after.scheduled_at > before.scheduled_at);
            }
            SendStatus::Processing => panic!("record {} left processing", after.id),
        }
    }
}

#[tokio::test]
async fn test_repeated_failures_until_terminal() {
    let harness = Harness::with_provider(MockProvider::failing());
    let seeded = harness.queued(1, 0, t(0)).await;
    let processor = processor();

    let mut previous = seeded.scheduled_at.expect("seeded with a schedule");
    let mut now = t(0);
    for attempt in 1..=5_u32 {
        processor
            .run_at(&harness.repository, &mut harness.provider_handle(), now)
            .await
            .expect("Invocation failed");

        let record = harness.get(&seeded.id).await;
        assert_eq!(record.attempts, attempt);

        if attempt < 5 {
            let next = record.scheduled_at.expect("still queued");
            assert_eq!(record.send_status, SendStatus::Queued);
            assert!(next >= previous + TimeDelta::minutes(1_i64 << (attempt - 1)));
            previous = next;
            now = next;
        } else {
            assert_eq!(record.send_status, SendStatus::Failed);
            assert_eq!(record.scheduled_at, None);
        }
    }

    // Terminal records are never attempted again.
    let report = processor
        .run_at(&harness.repository, &mut harness.provider_handle(), t(100_000))
        .await
        .expect("Invocation failed");
    assert_eq!(report.attempted, 0);
    assert_eq!(harness.provider.send_count(), 5);
}

#[tokio::test]
async fn test_rescheduled_record_waits_for_next_invocation() {
    let harness = Harness::with_provider(MockProvider::failing());
    let record = harness.queued(1, 0, t(0)).await;

    // The new schedule, t(2), is already in the past, yet only one attempt runs.
    processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(100))
        .await
        .expect("Invocation failed");

    assert_eq!(harness.provider.send_count(), 1);
    assert_eq!(harness.get(&record.id).await.scheduled_at, Some(t(2)));
}

#[tokio::test]
async fn test_empty_queue_never_initialises_provider() {
    let harness = Harness::new();

    let report = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await
        .expect("Invocation failed");

    assert_eq!(report.listed, 0);
    assert_eq!(report.stop_reason, StopReason::QueueDrained);
    assert_eq!(harness.provider.init_calls(), 0);
}

#[tokio::test]
async fn test_nothing_due_never_initialises_provider() {
    let harness = Harness::new();
    harness.queued(1, 0, t(60)).await;

    let report = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await
        .expect("Invocation failed");

    assert_eq!(report.stop_reason, StopReason::NotYetDue);
    assert_eq!(harness.provider.init_calls(), 0);
    assert!(harness.store.updates().is_empty());
}

#[tokio::test]
async fn test_provider_initialised_once_per_invocation() {
    let harness = Harness::new();
    for n in 0..4 {
        harness.queued(n, 0, t(0)).await;
    }

    let processor = processor();
    processor
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await
        .expect("Invocation failed");
    assert_eq!(harness.provider.init_calls(), 1);
    assert_eq!(harness.provider.send_count(), 4);
}

#[tokio::test]
async fn test_provider_init_failure_mutates_nothing() {
    let harness = Harness::with_provider(MockProvider::broken());
    let record = harness.queued(1, 0, t(0)).await;

    let result = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await;

    assert!(matches!(result, Err(QueueError::ProviderInit(_))));
    assert!(harness.store.updates().is_empty());
    assert_eq!(harness.get(&record.id).await, record);
}

#[tokio::test]
async fn test_listing_failure_aborts_invocation() {
    let harness = Harness::new();
    let record = harness.queued(1, 0, t(0)).await;
    harness.store.fail_scans(true);

    let result = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await;

    assert!(matches!(result, Err(QueueError::Listing(_))));
    assert_eq!(harness.provider.init_calls(), 0);
    assert!(harness.store.updates().is_empty());

    // The next invocation retries the listing.
    harness.store.fail_scans(false);
    processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await
        .expect("Invocation failed");
    assert_eq!(harness.get(&record.id).await.send_status, SendStatus::Complete);
}

#[tokio::test]
async fn test_processing_update_failure_does_not_block_send() {
    let harness = Harness::new();
    let record = harness.queued(1, 0, t(0)).await;
    let processing = Change::Set(AttributeValue::Number(SendStatus::Processing.code()));
    harness
        .store
        .fail_updates_where(move |_, changes| changes.get("send_status") == Some(&processing));

    let report = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await
        .expect("Invocation failed");

    assert_eq!(report.update_failures, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(harness.provider.send_count(), 1);
    assert_eq!(harness.get(&record.id).await.send_status, SendStatus::Complete);
}

#[tokio::test]
async fn test_update_failures_do_not_stop_the_batch() {
    let harness = Harness::new();
    let first = harness.queued(1, 0, t(0)).await;
    let second = harness.queued(2, 0, t(1)).await;
    let failing_key = first.id.to_string();
    harness
        .store
        .fail_updates_where(move |key, _| key == failing_key);

    let report = processor()
        .run_at(&harness.repository, &mut harness.provider_handle(), t(5))
        .await
        .expect("Invocation failed");

    assert_eq!(report.attempted, 2);
    assert_eq!(report.update_failures, 2);
    assert_eq!(harness.store.updates_for(&first.id.to_string()).len(), 2);

    // The first record's outcome was lost; it is still queued for the next run.
    assert_eq!(harness.get(&first.id).await, first);
    assert_eq!(harness.get(&second.id).await.send_status, SendStatus::Complete);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let harness = Harness::new();
    harness.queued(1, 0, t(0)).await;

    let processor = QueueProcessor {
        batch_limit: 0,
        ..QueueProcessor::default()
    };
    let result = processor
        .run_at(&harness.repository, &mut harness.provider_handle(), t(0))
        .await;

    assert!(matches!(result, Err(QueueError::Configuration(_))));
    assert_eq!(harness.provider.init_calls(), 0);
}
