use super::StatusListener;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use tracing::warn;

use crate::core::models::{NormalizedStatus, StatusState};

/// Posts status changes to a Slack incoming webhook.
///
/// Repeated polls with an unchanged description are not re-posted.
pub struct SlackListener {
    job_id: String,
    webhook_url: String,
    client: reqwest::Client,
    last_description: Mutex<Option<String>>,
}

impl SlackListener {
    pub fn new(job_id: impl Into<String>, webhook_url: String) -> Self {
        Self {
            job_id: job_id.into(),
            webhook_url,
            client: reqwest::Client::new(),
            last_description: Mutex::new(None),
        }
    }

    /// Returns true if this status differs from the last one posted.
    fn mark_seen(&self, status: &NormalizedStatus) -> bool {
        let mut last = match self.last_description.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_deref() == Some(status.description()) {
            return false;
        }
        *last = Some(status.description().to_string());
        true
    }

    fn format_message(&self, status: &NormalizedStatus) -> serde_json::Value {
        let short_id = self.job_id.get(..8).unwrap_or(&self.job_id);
        let header = match status.state() {
            StatusState::Active => "Export In Progress",
            StatusState::Completed => "Export Complete",
            StatusState::Failed => "Export Failed",
            StatusState::Canceled => "Export Canceled",
        };

        let mut fields = vec![
            json!({
                "type": "mrkdwn",
                "text": format!("*Job ID:*\n`{}`", short_id)
            }),
            json!({
                "type": "mrkdwn",
                "text": format!("*State:*\n{}", status.state())
            }),
        ];
        if let Some(step) = status.step() {
            fields.push(json!({
                "type": "mrkdwn",
                "text": format!("*Step:*\n{}", step)
            }));
        }

        json!({
            "blocks": [
                {
                    "type": "header",
                    "text": {
                        "type": "plain_text",
                        "text": header,
                        "emoji": true
                    }
                },
                {
                    "type": "section",
                    "fields": fields
                },
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": status.description()
                    }
                }
            ]
        })
    }
}

#[async_trait]
impl StatusListener for SlackListener {
    async fn update_status(&self, status: NormalizedStatus) {
        if !self.mark_seen(&status) {
            return;
        }

        let payload = self.format_message(&status);
        let result = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        if let Err(e) = result {
            warn!(job_id = %self.job_id, error = %e, "Failed to post Slack notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ExportStep;

    #[test]
    fn test_format_message_includes_step_for_active() {
        let listener = SlackListener::new("0123456789abcdef", "http://unused".into());
        let message = listener.format_message(&NormalizedStatus::active(
            "Exporting to remote asset store...",
            ExportStep::Exporting,
        ));

        let text = message.to_string();
        assert!(text.contains("Export In Progress"));
        assert!(text.contains("`01234567`"));
        assert!(text.contains("EXPORTING"));
    }

    #[test]
    fn test_format_message_terminal_has_no_step() {
        let listener = SlackListener::new("abc", "http://unused".into());
        let message = listener.format_message(&NormalizedStatus::failed("boom"));

        let fields = &message["blocks"][1]["fields"];
        assert_eq!(fields.as_array().unwrap().len(), 2);
        assert_eq!(message["blocks"][0]["text"]["text"], "Export Failed");
    }

    #[test]
    fn test_unchanged_description_is_posted_once() {
        let listener = SlackListener::new("abc", "http://unused".into());
        let status = NormalizedStatus::active("same", ExportStep::Exporting);

        assert!(listener.mark_seen(&status));
        assert!(!listener.mark_seen(&status));
        assert!(listener.mark_seen(&NormalizedStatus::completed()));
    }
}
