pub mod board;
pub mod listener;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod provider;
pub mod translate;

pub use board::StatusBoard;
pub use listener::{ChannelListener, FanoutListener, LogListener, StatusListener};
pub use models::{
    Credentials, Destination, ExportStep, NormalizedStatus, RawJobSnapshot, RawJobState,
    StatusState,
};
pub use monitor::{JobStatusMonitor, MonitorError, MonitorOptions};
pub use orchestrator::{Orchestrator, WatchOutcome};
pub use provider::{JobStatusProvider, ProviderConnector, ProviderError};
pub use translate::normalize;
