mod http;
mod simulated;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppConfig;
use crate::core::models::{Credentials, RawJobSnapshot};

pub use http::{HttpConnector, HttpProvider};
pub use simulated::{SimulatedConnector, SimulatedProvider, SimulatedStep};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Access token expired")]
    TokenExpired,

    #[error("Failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Query and control jobs on the compute platform.
#[async_trait]
pub trait JobStatusProvider: Send + Sync {
    /// Fetch the current snapshot of a job.
    async fn status(&self, job_id: &str) -> Result<RawJobSnapshot, ProviderError>;

    /// Ask the platform to cancel a job. Does not wait for the cancellation to land.
    async fn request_cancel(&self, job_id: &str) -> Result<(), ProviderError>;
}

/// Binds credentials to a provider session for the calling execution context.
///
/// The monitor binds once when its polling task starts; nothing is stored in
/// process-wide state.
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    async fn bind(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn JobStatusProvider>, ProviderError>;
}

/// Factory function to create a connector based on config
pub fn create_connector(config: &AppConfig) -> Arc<dyn ProviderConnector> {
    if config.simulation {
        let provider = SimulatedProvider::demo();
        return Arc::new(SimulatedConnector::new(Arc::new(provider)));
    }

    Arc::new(HttpConnector::new(
        config.provider_url.clone(),
        config.request_timeout(),
    ))
}
