//! In-memory latest-status store for several concurrently monitored exports.
//!
//! Each monitor gets its own listener from [`StatusBoard::listener_for`]; all
//! of them write into the same map, so callers can look up any job's most
//! recent status without talking to the provider.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::listener::StatusListener;
use super::models::NormalizedStatus;

#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<String, NormalizedStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener that records statuses under `job_id`.
    pub fn listener_for(&self, job_id: impl Into<String>) -> Arc<dyn StatusListener> {
        Arc::new(BoardListener {
            board: self.clone(),
            job_id: job_id.into(),
        })
    }

    pub async fn update(&self, job_id: &str, status: NormalizedStatus) {
        let mut map = self.inner.write().await;
        map.insert(job_id.to_string(), status);
    }

    pub async fn get(&self, job_id: &str) -> Option<NormalizedStatus> {
        let map = self.inner.read().await;
        map.get(job_id).cloned()
    }

    pub async fn remove(&self, job_id: &str) {
        let mut map = self.inner.write().await;
        map.remove(job_id);
    }

    pub async fn get_all(&self) -> HashMap<String, NormalizedStatus> {
        let map = self.inner.read().await;
        map.clone()
    }

    /// Number of jobs whose last status is not terminal.
    pub async fn active_count(&self) -> usize {
        let map = self.inner.read().await;
        map.values().filter(|status| !status.is_terminal()).count()
    }
}

struct BoardListener {
    board: StatusBoard,
    job_id: String,
}

#[async_trait]
impl StatusListener for BoardListener {
    async fn update_status(&self, status: NormalizedStatus) {
        self.board.update(&self.job_id, status).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ExportStep, StatusState};

    #[tokio::test]
    async fn test_board_tracks_latest_status_per_job() {
        let board = StatusBoard::new();
        let first = board.listener_for("job-1");
        let second = board.listener_for("job-2");

        first
            .update_status(NormalizedStatus::active("pending", ExportStep::Exporting))
            .await;
        second
            .update_status(NormalizedStatus::active("running", ExportStep::Exporting))
            .await;
        assert_eq!(board.active_count().await, 2);

        first.update_status(NormalizedStatus::completed()).await;
        assert_eq!(board.active_count().await, 1);
        assert_eq!(
            board.get("job-1").await.map(|s| s.state()),
            Some(StatusState::Completed)
        );

        board.remove("job-1").await;
        assert!(board.get("job-1").await.is_none());
        assert_eq!(board.get_all().await.len(), 1);
    }
}
