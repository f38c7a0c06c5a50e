//! Shared fixtures for queue processor tests
#![allow(dead_code)] // Not every helper is used by every test binary

use std::sync::Arc;

use carrier_delivery::{
    EmailChanges, EmailId, EmailRecord, EmailRepository, MockProvider, NewEmail, SendStatus,
};
use carrier_store::TestRecordStore;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

/// Fixed reference time; `t(n)` is `n` minutes after it
pub fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid time")
        + TimeDelta::minutes(minutes)
}

/// A repository over a failure-injecting store, plus a shared mock provider
pub struct Harness {
    pub store: TestRecordStore,
    pub repository: EmailRepository,
    pub provider: MockProvider,
    /// Writes directly to the wrapped store, invisible to the update log
    seeder: EmailRepository,
}

impl Harness {
    pub fn new() -> Self {
        let store = TestRecordStore::with_indexes([EmailRepository::queue_index()]);
        Self {
            repository: EmailRepository::new(Arc::new(store.clone())),
            seeder: EmailRepository::new(Arc::new(store.inner().clone())),
            store,
            provider: MockProvider::new(),
        }
    }

    pub fn with_provider(provider: MockProvider) -> Self {
        Self {
            provider,
            ..Self::new()
        }
    }

    /// A fresh handle onto the shared provider for the code under test
    pub fn provider_handle(&self) -> MockProvider {
        self.provider.clone()
    }

    /// Seed a queued record with `attempts` prior attempts
    pub async fn queued(&self, n: usize, attempts: u32, scheduled_at: DateTime<Utc>) -> EmailRecord {
        let email = NewEmail::new(vec![format!("user{n}@example.com")], "welcome")
            .with_substitution("n", n.to_string());

        let record = self
            .seeder
            .store(email, SendStatus::Queued, scheduled_at)
            .await
            .expect("Failed to seed record");

        if attempts == 0 {
            return record;
        }

        self.seeder
            .update(&record.id, EmailChanges::new().attempts(attempts))
            .await
            .expect("Failed to seed attempts")
    }

    pub async fn get(&self, id: &EmailId) -> EmailRecord {
        self.seeder.get(id).await.expect("Record should exist")
    }
}
