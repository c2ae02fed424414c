use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use super::{JobStatusProvider, ProviderConnector, ProviderError};
use crate::core::models::{Credentials, RawJobSnapshot, RawJobState};

/// One scripted answer to a status query.
#[derive(Debug, Clone)]
pub enum SimulatedStep {
    State(RawJobState),
    Error(String),
}

#[derive(Default)]
struct SimulatedState {
    cursor: usize,
    status_calls: usize,
    cancel_requests: usize,
    cancel_pending: bool,
}

/// Plays back a scripted sequence of job states.
///
/// The last step repeats once the script is exhausted. A cancel request makes
/// every following query report `CANCELLED`.
pub struct SimulatedProvider {
    script: Vec<SimulatedStep>,
    error_message: Option<String>,
    query_delay: Duration,
    state: Mutex<SimulatedState>,
}

impl SimulatedProvider {
    pub fn new(states: impl IntoIterator<Item = RawJobState>) -> Self {
        Self::scripted(states.into_iter().map(SimulatedStep::State).collect())
    }

    pub fn scripted(script: Vec<SimulatedStep>) -> Self {
        Self {
            script,
            error_message: None,
            query_delay: Duration::ZERO,
            state: Mutex::new(SimulatedState::default()),
        }
    }

    /// Pending, three running polls, then done.
    pub fn demo() -> Self {
        Self::new([
            RawJobState::Ready,
            RawJobState::Running,
            RawJobState::Running,
            RawJobState::Running,
            RawJobState::Completed,
        ])
    }

    /// Error message reported alongside `FAILED` or `UNSUBMITTED` states.
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn status_calls(&self) -> usize {
        self.lock().status_calls
    }

    pub fn cancel_requests(&self) -> usize {
        self.lock().cancel_requests
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_step(&self) -> Option<SimulatedStep> {
        let mut state = self.lock();
        state.status_calls += 1;

        if state.cancel_pending {
            return Some(SimulatedStep::State(RawJobState::Cancelled));
        }

        let index = state.cursor.min(self.script.len().checked_sub(1)?);
        state.cursor += 1;
        self.script.get(index).cloned()
    }
}

#[async_trait]
impl JobStatusProvider for SimulatedProvider {
    async fn status(&self, job_id: &str) -> Result<RawJobSnapshot, ProviderError> {
        if !self.query_delay.is_zero() {
            sleep(self.query_delay).await;
        }

        match self.next_step() {
            Some(SimulatedStep::State(state)) => {
                let mut snapshot = RawJobSnapshot::new(job_id, state);
                snapshot.description = format!("Simulated export {}", job_id);
                if matches!(state, RawJobState::Failed | RawJobState::Unsubmitted) {
                    snapshot.error_message = self.error_message.clone();
                }
                Ok(snapshot)
            }
            Some(SimulatedStep::Error(message)) => Err(ProviderError::Unavailable(message)),
            None => Err(ProviderError::NotFound(job_id.to_string())),
        }
    }

    async fn request_cancel(&self, _job_id: &str) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.cancel_requests += 1;
        state.cancel_pending = true;
        Ok(())
    }
}

/// Hands out a shared [`SimulatedProvider`], or refuses to bind at all.
pub struct SimulatedConnector {
    provider: Option<Arc<SimulatedProvider>>,
}

impl SimulatedConnector {
    pub fn new(provider: Arc<SimulatedProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A connector whose every bind fails.
    pub fn unavailable() -> Self {
        Self { provider: None }
    }
}

#[async_trait]
impl ProviderConnector for SimulatedConnector {
    async fn bind(
        &self,
        _credentials: &Credentials,
    ) -> Result<Arc<dyn JobStatusProvider>, ProviderError> {
        match &self.provider {
            Some(provider) => Ok(provider.clone()),
            None => Err(ProviderError::Unavailable(
                "simulated provider offline".to_string(),
            )),
        }
    }
}
