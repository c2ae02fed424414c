use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::info;

use crate::context::AppContext;
use crate::core::listener::{self, ChannelListener, FanoutListener, LogListener, StatusListener};
use crate::core::models::{Destination, ExportStep, NormalizedStatus, StatusState};
use crate::core::monitor::{JobStatusMonitor, MonitorOptions};
use crate::core::translate::normalize;

/// Final view of a watch run.
#[derive(Debug, Clone)]
pub struct WatchOutcome {
    pub statuses: Vec<(String, Option<NormalizedStatus>)>,
    pub interrupted: bool,
}

impl WatchOutcome {
    /// True when every export finished on the provider side.
    ///
    /// A local-staging export counts once it reached `EXPORTED`; the download
    /// that follows is someone else's job.
    pub fn succeeded(&self) -> bool {
        !self.interrupted
            && self.statuses.iter().all(|(_, status)| {
                status.as_ref().is_some_and(|s| {
                    s.state() == StatusState::Completed || s.step() == Some(ExportStep::Exported)
                })
            })
    }
}

pub struct Orchestrator {
    ctx: AppContext,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(ctx: AppContext) -> Self {
        let poll_interval = ctx.config.poll_interval();
        Self { ctx, poll_interval }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// One-shot query of a job, translated for `destination`.
    pub async fn query(&self, job_id: &str, destination: Destination) -> Result<NormalizedStatus> {
        let credentials = self.ctx.config.credentials()?;
        let provider = self
            .ctx
            .connector
            .bind(&credentials)
            .await
            .context("Failed to bind provider credentials")?;
        let snapshot = provider
            .status(job_id)
            .await
            .with_context(|| format!("Failed to query job {}", job_id))?;

        Ok(normalize(&snapshot, destination))
    }

    /// Monitor every job until each has finished on the provider side, or
    /// until `interrupt` resolves, in which case all remaining jobs are
    /// cancelled.
    pub async fn watch(
        &self,
        job_ids: &[String],
        destination: Destination,
        interrupt: impl Future<Output = ()>,
    ) -> Result<WatchOutcome> {
        let credentials = self.ctx.config.credentials()?;

        let mut unique: Vec<String> = Vec::new();
        for job_id in job_ids {
            if !unique.contains(job_id) {
                unique.push(job_id.clone());
            }
        }

        let mut monitors: HashMap<String, JobStatusMonitor> = HashMap::new();
        let mut followers = JoinSet::new();

        for job_id in &unique {
            let (channel, rx) = ChannelListener::new();
            let started = JobStatusMonitor::start_with(
                job_id.clone(),
                credentials.clone(),
                destination,
                self.listener_for(job_id, channel),
                self.ctx.connector.clone(),
                MonitorOptions {
                    poll_interval: self.poll_interval,
                    shutdown: None,
                },
            );
            let monitor = match started {
                Ok(monitor) => monitor,
                Err(e) => {
                    let running: Vec<_> = monitors.into_values().collect();
                    for monitor in &running {
                        monitor.stop();
                    }
                    join_all(running).await?;
                    return Err(e)
                        .with_context(|| format!("Failed to start monitor for job {:?}", job_id));
                }
            };

            info!(job_id = %job_id, destination = %destination, "Watching export job");
            monitors.insert(job_id.clone(), monitor);
            followers.spawn(follow(job_id.clone(), rx));
        }

        tokio::pin!(interrupt);
        let mut interrupted = false;
        let mut finished = Vec::new();

        loop {
            tokio::select! {
                joined = followers.join_next() => match joined {
                    Some(joined) => {
                        let job_id = joined.context("Status follower task failed")?;
                        if let Some(monitor) = monitors.remove(&job_id) {
                            monitor.stop();
                            finished.push(monitor);
                        }
                    }
                    None => break,
                },
                _ = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    info!(jobs = monitors.len(), "Interrupted, cancelling remaining exports");
                    for (_, monitor) in monitors.drain() {
                        monitor.cancel().await;
                        finished.push(monitor);
                    }
                    // Joining drops the listeners, which lets the followers drain and exit.
                    join_all(std::mem::take(&mut finished)).await?;
                }
            }
        }

        join_all(finished).await?;

        let mut statuses = Vec::with_capacity(unique.len());
        for job_id in unique {
            let status = self.ctx.board.get(&job_id).await;
            statuses.push((job_id, status));
        }

        Ok(WatchOutcome {
            statuses,
            interrupted,
        })
    }

    fn listener_for(&self, job_id: &str, channel: ChannelListener) -> Arc<dyn StatusListener> {
        let mut fanout = FanoutListener::new(vec![
            Arc::new(channel),
            self.ctx.board.listener_for(job_id),
        ]);

        if self.ctx.config.json_logs {
            fanout.push(Arc::new(LogListener::new(job_id)));
        }
        if let Some(notifier) = listener::create_notifier(job_id, &self.ctx.config.notifications) {
            fanout.push(notifier);
        }

        Arc::new(fanout)
    }
}

/// Print a job's statuses until it is done on the provider side.
async fn follow(job_id: String, mut rx: mpsc::UnboundedReceiver<NormalizedStatus>) -> String {
    while let Some(status) = rx.recv().await {
        println!("{}: {}", job_id, status);
        if status.is_terminal() || status.step() == Some(ExportStep::Exported) {
            break;
        }
    }
    job_id
}

async fn join_all(monitors: Vec<JobStatusMonitor>) -> Result<()> {
    if monitors.is_empty() {
        return Ok(());
    }

    tokio::task::spawn_blocking(move || {
        monitors
            .into_iter()
            .try_for_each(JobStatusMonitor::join)
    })
    .await
    .context("Monitor join task failed")??;

    Ok(())
}
