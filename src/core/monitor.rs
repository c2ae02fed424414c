//! Background polling of a single export job.
//!
//! Every [`JobStatusMonitor`] owns one OS thread running a current-thread
//! tokio runtime. The thread binds credentials once, then polls the provider
//! at a fixed interval and hands each normalized status to the listener until
//! a terminal status has been delivered or the monitor is stopped.

use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

use super::listener::StatusListener;
use super::models::{Credentials, Destination, NormalizedStatus};
use super::provider::{JobStatusProvider, ProviderConnector, ProviderError};
use super::translate::{failure_description, normalize};

/// Time between two status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("Failed to start monitor thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to build monitor runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Monitor thread panicked")]
    Panicked,
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    /// Stopping this token stops the monitor too.
    pub shutdown: Option<CancellationToken>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown: None,
        }
    }
}

/// State shared between the handle and the polling thread.
struct MonitorContext {
    job_id: String,
    credentials: Credentials,
    destination: Destination,
    connector: Arc<dyn ProviderConnector>,
    listener: Arc<dyn StatusListener>,
    running: CancellationToken,
}

impl MonitorContext {
    fn stop(&self) {
        if !self.running.is_cancelled() {
            debug!(job_id = %self.job_id, "Stopping export status monitor");
            self.running.cancel();
        }
    }

    async fn poll(&self, poll_interval: Duration) {
        debug!(job_id = %self.job_id, "Starting polling status of export job");

        let provider = match self.connector.bind(&self.credentials).await {
            Ok(provider) => Some(provider),
            Err(e) => {
                self.log_failure(&e);
                None
            }
        };

        while !self.running.is_cancelled() {
            let status = match &provider {
                Some(provider) => self.query(provider.as_ref()).await,
                None => NormalizedStatus::failed(failure_description(self.destination)),
            };

            // A stop that raced the query wins; nothing is delivered after it.
            if self.running.is_cancelled() {
                debug!(job_id = %self.job_id, "Monitor stopped during query, dropping status");
                break;
            }

            let terminal = status.is_terminal();
            self.listener.update_status(status).await;

            if terminal {
                self.stop();
                break;
            }

            tokio::select! {
                _ = self.running.cancelled() => break,
                _ = sleep(poll_interval) => {}
            }
        }

        debug!(job_id = %self.job_id, "Export status polling finished");
    }

    async fn query(&self, provider: &dyn JobStatusProvider) -> NormalizedStatus {
        match provider.status(&self.job_id).await {
            Ok(snapshot) => normalize(&snapshot, self.destination),
            Err(e) => {
                self.log_failure(&e);
                NormalizedStatus::failed(failure_description(self.destination))
            }
        }
    }

    fn log_failure(&self, e: &ProviderError) {
        error!(
            job_id = %self.job_id,
            error = %e,
            "Export to {} failed",
            self.destination.label()
        );
    }
}

/// Handle to a running export status monitor.
pub struct JobStatusMonitor {
    ctx: Arc<MonitorContext>,
    thread: JoinHandle<()>,
}

impl JobStatusMonitor {
    /// Start monitoring `job_id` with the default options.
    pub fn start(
        job_id: impl Into<String>,
        credentials: Credentials,
        destination: Destination,
        listener: Arc<dyn StatusListener>,
        connector: Arc<dyn ProviderConnector>,
    ) -> Result<Self, MonitorError> {
        Self::start_with(
            job_id,
            credentials,
            destination,
            listener,
            connector,
            MonitorOptions::default(),
        )
    }

    pub fn start_with(
        job_id: impl Into<String>,
        credentials: Credentials,
        destination: Destination,
        listener: Arc<dyn StatusListener>,
        connector: Arc<dyn ProviderConnector>,
        options: MonitorOptions,
    ) -> Result<Self, MonitorError> {
        let job_id = job_id.into();
        if job_id.is_empty() || job_id.contains('\0') {
            return Err(MonitorError::InvalidJobId(job_id));
        }

        let running = match &options.shutdown {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        let ctx = Arc::new(MonitorContext {
            job_id,
            credentials,
            destination,
            connector,
            listener,
            running,
        });

        let span = info_span!(
            "export_status",
            job_id = %ctx.job_id,
            destination = %ctx.destination
        );
        let poll_interval = options.poll_interval;
        let thread_ctx = ctx.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        // The runtime is created and dropped on the monitor thread, never on
        // the caller's (possibly async) context.
        let thread = thread::Builder::new()
            .name(format!("export-status-{}", ctx.job_id))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        thread_ctx.stop();
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                runtime.block_on(thread_ctx.poll(poll_interval).instrument(span));
            })
            .map_err(MonitorError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { ctx, thread }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(MonitorError::Runtime(e))
            }
            Err(_) => {
                ctx.stop();
                Err(MonitorError::Panicked)
            }
        }
    }

    pub fn job_id(&self) -> &str {
        &self.ctx.job_id
    }

    pub fn destination(&self) -> Destination {
        self.ctx.destination
    }

    pub fn is_running(&self) -> bool {
        !self.ctx.running.is_cancelled()
    }

    /// Stop polling. Does not wait for the thread; an in-flight query or sleep
    /// finishes without delivering anything further.
    pub fn stop(&self) {
        self.ctx.stop();
    }

    /// Stop polling and ask the provider to cancel the job.
    ///
    /// Best effort: if the job cannot be looked up, the cancel request is
    /// skipped and nothing is reported.
    pub async fn cancel(&self) {
        self.stop();

        let provider = match self.ctx.connector.bind(&self.ctx.credentials).await {
            Ok(provider) => provider,
            Err(e) => {
                debug!(job_id = %self.ctx.job_id, error = %e, "Cannot bind provider, skipping cancel");
                return;
            }
        };

        let snapshot = match provider.status(&self.ctx.job_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(job_id = %self.ctx.job_id, error = %e, "Job lookup failed, skipping cancel");
                return;
            }
        };

        debug!(job_id = %snapshot.id, "Cancelling export job");
        if let Err(e) = provider.request_cancel(&snapshot.id).await {
            warn!(job_id = %snapshot.id, error = %e, "Cancel request was rejected");
        }
    }

    /// Block until the polling thread exits.
    pub fn join(self) -> Result<(), MonitorError> {
        self.thread.join().map_err(|_| MonitorError::Panicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::listener::ChannelListener;
    use crate::core::models::{ExportStep, RawJobState, StatusState};
    use crate::core::provider::{SimulatedConnector, SimulatedProvider, SimulatedStep};

    fn options() -> MonitorOptions {
        MonitorOptions {
            poll_interval: Duration::from_millis(5),
            shutdown: None,
        }
    }

    fn creds() -> Credentials {
        Credentials::new("token", None)
    }

    fn start(
        provider: Arc<SimulatedProvider>,
        destination: Destination,
    ) -> (JobStatusMonitor, tokio::sync::mpsc::UnboundedReceiver<NormalizedStatus>) {
        let (listener, rx) = ChannelListener::new();
        let monitor = JobStatusMonitor::start_with(
            "job-1",
            creds(),
            destination,
            Arc::new(listener),
            Arc::new(SimulatedConnector::new(provider)),
            options(),
        )
        .unwrap();
        (monitor, rx)
    }

    fn drain(
        monitor: JobStatusMonitor,
        mut rx: tokio::sync::mpsc::UnboundedReceiver<NormalizedStatus>,
    ) -> Vec<NormalizedStatus> {
        monitor.join().unwrap();
        let mut statuses = Vec::new();
        while let Some(status) = rx.blocking_recv() {
            statuses.push(status);
        }
        statuses
    }

    #[test]
    fn test_remote_asset_export_runs_to_completion() {
        let provider = Arc::new(SimulatedProvider::new([
            RawJobState::Ready,
            RawJobState::Running,
            RawJobState::Completed,
        ]));
        let (monitor, rx) = start(provider.clone(), Destination::RemoteAsset);

        let statuses = drain(monitor, rx);
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].description(), "Export to remote asset store pending...");
        assert_eq!(statuses[1].step(), Some(ExportStep::Exporting));
        assert_eq!(statuses[2], NormalizedStatus::completed());
        assert_eq!(provider.status_calls(), 3);
    }

    #[test]
    fn test_local_staging_completion_keeps_polling() {
        let provider = Arc::new(SimulatedProvider::new([
            RawJobState::Running,
            RawJobState::Completed,
        ]));
        let (monitor, mut rx) = start(provider.clone(), Destination::LocalStaging);

        assert_eq!(rx.blocking_recv().unwrap().step(), Some(ExportStep::Exporting));
        let exported = rx.blocking_recv().unwrap();
        assert_eq!(exported.state(), StatusState::Active);
        assert_eq!(exported.step(), Some(ExportStep::Exported));

        // Still polling the completed job
        rx.blocking_recv().unwrap();
        assert!(monitor.is_running());

        monitor.stop();
        monitor.join().unwrap();
        assert!(provider.status_calls() >= 3);
    }

    #[test]
    fn test_query_error_delivers_generic_failure_and_stops() {
        let provider = Arc::new(SimulatedProvider::scripted(vec![
            SimulatedStep::State(RawJobState::Running),
            SimulatedStep::Error("connection reset".into()),
            SimulatedStep::State(RawJobState::Completed),
        ]));
        let (monitor, rx) = start(provider.clone(), Destination::LocalStaging);

        let statuses = drain(monitor, rx);
        assert_eq!(statuses.len(), 2);
        assert_eq!(
            statuses[1],
            NormalizedStatus::failed("Export to local staging area failed")
        );
        assert_eq!(provider.status_calls(), 2);
    }

    #[test]
    fn test_bind_failure_is_contained() {
        let (listener, rx) = ChannelListener::new();
        let monitor = JobStatusMonitor::start_with(
            "job-2",
            creds(),
            Destination::RemoteAsset,
            Arc::new(listener),
            Arc::new(SimulatedConnector::unavailable()),
            options(),
        )
        .unwrap();

        let statuses = drain(monitor, rx);
        assert_eq!(
            statuses,
            vec![NormalizedStatus::failed("Export to remote asset store failed")]
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let provider = Arc::new(SimulatedProvider::new([RawJobState::Running]));
        let (monitor, mut rx) = start(provider, Destination::RemoteAsset);

        rx.blocking_recv().unwrap();
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
        monitor.join().unwrap();

        // Only ACTIVE statuses were ever delivered
        while let Some(status) = rx.blocking_recv() {
            assert_eq!(status.state(), StatusState::Active);
        }
    }

    #[test]
    fn test_stop_after_self_termination_is_noop() {
        let provider = Arc::new(SimulatedProvider::new([RawJobState::Cancelled]));
        let (monitor, mut rx) = start(provider, Destination::LocalStaging);

        assert_eq!(rx.blocking_recv().unwrap(), NormalizedStatus::canceled());
        monitor.stop();
        assert!(!monitor.is_running());
        monitor.join().unwrap();
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn test_stop_during_query_delivers_nothing() {
        let provider = Arc::new(
            SimulatedProvider::new([RawJobState::Running])
                .with_query_delay(Duration::from_millis(200)),
        );
        let (monitor, rx) = start(provider.clone(), Destination::RemoteAsset);

        std::thread::sleep(Duration::from_millis(50));
        monitor.stop();

        let statuses = drain(monitor, rx);
        assert!(statuses.is_empty());
        assert!(provider.status_calls() <= 1);
    }

    #[test]
    fn test_parent_shutdown_stops_monitor() {
        let shutdown = CancellationToken::new();
        let provider = Arc::new(SimulatedProvider::new([RawJobState::Running]));
        let (listener, mut rx) = ChannelListener::new();
        let monitor = JobStatusMonitor::start_with(
            "job-3",
            creds(),
            Destination::RemoteAsset,
            Arc::new(listener),
            Arc::new(SimulatedConnector::new(provider)),
            MonitorOptions {
                poll_interval: Duration::from_millis(5),
                shutdown: Some(shutdown.clone()),
            },
        )
        .unwrap();

        rx.blocking_recv().unwrap();
        shutdown.cancel();
        assert!(!monitor.is_running());
        monitor.join().unwrap();
    }

    #[tokio::test]
    async fn test_start_from_async_context() {
        let provider = Arc::new(SimulatedProvider::new([RawJobState::Running]));
        let (monitor, mut rx) = start(provider, Destination::RemoteAsset);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.state(), StatusState::Active);

        monitor.stop();
        tokio::task::spawn_blocking(move || monitor.join())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_invalid_job_id_is_rejected() {
        for job_id in ["", "job\0id"] {
            let (listener, _rx) = ChannelListener::new();
            let result = JobStatusMonitor::start_with(
                job_id,
                creds(),
                Destination::RemoteAsset,
                Arc::new(listener),
                Arc::new(SimulatedConnector::unavailable()),
                options(),
            );
            assert!(matches!(result, Err(MonitorError::InvalidJobId(id)) if id == job_id));
        }
    }
}
