mod slack;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{NotificationChannelType, NotificationConfig};
use crate::core::models::{NormalizedStatus, StatusState};

pub use slack::SlackListener;

/// Receives every status a monitor produces, in order.
///
/// Implementations must not block for long: the monitor waits for each
/// delivery before it polls again. A listener shared between monitors is
/// called concurrently.
#[async_trait]
pub trait StatusListener: Send + Sync {
    async fn update_status(&self, status: NormalizedStatus);
}

/// Forwards statuses into a channel.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<NormalizedStatus>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NormalizedStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StatusListener for ChannelListener {
    async fn update_status(&self, status: NormalizedStatus) {
        // Receiver gone means nobody is interested anymore.
        let _ = self.tx.send(status);
    }
}

/// Writes each status to the log.
pub struct LogListener {
    job_id: String,
}

impl LogListener {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

#[async_trait]
impl StatusListener for LogListener {
    async fn update_status(&self, status: NormalizedStatus) {
        let step = status.step().map(|s| s.to_string());
        match status.state() {
            StatusState::Failed => warn!(
                job_id = %self.job_id,
                state = %status.state(),
                "{}",
                status.description()
            ),
            _ => info!(
                job_id = %self.job_id,
                state = %status.state(),
                step = step.as_deref().unwrap_or("-"),
                "{}",
                status.description()
            ),
        }
    }
}

/// Delivers to several listeners, one after another.
pub struct FanoutListener {
    listeners: Vec<Arc<dyn StatusListener>>,
}

impl FanoutListener {
    pub fn new(listeners: Vec<Arc<dyn StatusListener>>) -> Self {
        Self { listeners }
    }

    pub fn push(&mut self, listener: Arc<dyn StatusListener>) {
        self.listeners.push(listener);
    }
}

#[async_trait]
impl StatusListener for FanoutListener {
    async fn update_status(&self, status: NormalizedStatus) {
        for listener in &self.listeners {
            listener.update_status(status.clone()).await;
        }
    }
}

/// Factory function to create a notifier based on config
pub fn create_notifier(
    job_id: &str,
    config: &NotificationConfig,
) -> Option<Arc<dyn StatusListener>> {
    match &config.channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Slack => {
            let webhook = config.slack_webhook.as_ref()?;
            if webhook.is_empty() {
                return None;
            }
            Some(Arc::new(SlackListener::new(job_id, webhook.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ExportStep;

    #[tokio::test]
    async fn test_fanout_delivers_to_all_in_order() {
        let (first, mut first_rx) = ChannelListener::new();
        let (second, mut second_rx) = ChannelListener::new();
        let fanout = FanoutListener::new(vec![Arc::new(first), Arc::new(second)]);

        fanout
            .update_status(NormalizedStatus::active("a", ExportStep::Exporting))
            .await;
        fanout.update_status(NormalizedStatus::completed()).await;

        for rx in [&mut first_rx, &mut second_rx] {
            assert_eq!(rx.recv().await.unwrap().description(), "a");
            assert_eq!(rx.recv().await.unwrap(), NormalizedStatus::completed());
        }
    }

    #[tokio::test]
    async fn test_channel_listener_tolerates_closed_receiver() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        listener.update_status(NormalizedStatus::canceled()).await;
    }

    #[test]
    fn test_create_notifier_requires_webhook() {
        let mut config = NotificationConfig {
            channel: NotificationChannelType::Slack,
            slack_webhook: None,
        };
        assert!(create_notifier("job", &config).is_none());

        config.slack_webhook = Some(String::new());
        assert!(create_notifier("job", &config).is_none());

        config.slack_webhook = Some("https://hooks.slack.test/x".to_string());
        assert!(create_notifier("job", &config).is_some());

        config.channel = NotificationChannelType::None;
        assert!(create_notifier("job", &config).is_none());
    }
}
