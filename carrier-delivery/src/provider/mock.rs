use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{DeliveryProvider, ProviderError, ProviderInitError, Transmission};

/// One recorded call to [`MockProvider::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCall {
    pub recipients: Vec<String>,
    pub template: String,
    pub substitutions: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    fail_init: bool,
    failing: bool,
    initialized: bool,
    init_calls: usize,
    script: VecDeque<bool>,
    sends: Vec<SendCall>,
}

/// Scripted provider for tests
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect calls through another. Unless scripted otherwise every send
/// succeeds with all recipients accepted and a provider ID of `mock-{n}`.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<State>>,
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose every send fails
    #[must_use]
    pub fn failing() -> Self {
        let provider = Self::new();
        provider.set_failing(true);
        provider
    }

    /// A provider whose initialisation fails
    #[must_use]
    pub fn broken() -> Self {
        let provider = Self::new();
        provider.state.lock().fail_init = true;
        provider
    }

    /// Change the outcome of unscripted sends
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Queue explicit outcomes (`true` = success) consumed before the default
    pub fn script(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.state.lock().script.extend(outcomes);
    }

    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.state.lock().init_calls
    }

    #[must_use]
    pub fn sends(&self) -> Vec<SendCall> {
        self.state.lock().sends.clone()
    }

    #[must_use]
    pub fn send_count(&self) -> usize {
        self.state.lock().sends.len()
    }
}

#[async_trait]
impl DeliveryProvider for MockProvider {
    async fn initialize(&mut self) -> Result<(), ProviderInitError> {
        let mut state = self.state.lock();
        state.init_calls += 1;
        if state.fail_init {
            return Err(ProviderInitError::Client("mock initialisation failure".to_string()));
        }
        state.initialized = true;
        Ok(())
    }

    async fn send(
        &self,
        recipients: &[String],
        template: &str,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<Transmission, ProviderError> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(ProviderError::NotInitialized);
        }

        state.sends.push(SendCall {
            recipients: recipients.to_vec(),
            template: template.to_string(),
            substitutions: substitutions.clone(),
        });

        let succeed = state.script.pop_front().unwrap_or(!state.failing);
        if succeed {
            Ok(Transmission {
                provider_id: format!("mock-{}", state.sends.len()),
                accepted: u32::try_from(recipients.len()).unwrap_or(u32::MAX),
                rejected: 0,
            })
        } else {
            Err(ProviderError::Transport("mock send failure".to_string()))
        }
    }
}
