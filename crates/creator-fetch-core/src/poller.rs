//! Status polling
//!
//! Stateless translation of engine bookkeeping into [`DownloadStatus`].
//! Polling only drives progress display, so every failure degrades to
//! [`DownloadPhase::Unknown`] instead of an error.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::ExecutionEngine;
use crate::types::{is_trackable, DownloadPhase, DownloadRecord, DownloadStatus, NativeState};

/// Default bound on a single engine lookup
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// Queries the execution engine for the state of submitted jobs
#[derive(Clone)]
pub struct StatusPoller {
    engine: Arc<dyn ExecutionEngine>,
    timeout: Duration,
}

impl StatusPoller {
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self::with_timeout(engine, DEFAULT_POLL_TIMEOUT)
    }

    pub fn with_timeout(engine: Arc<dyn ExecutionEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// Current status of a job. Never fails.
    pub async fn poll(&self, correlation_id: &str) -> DownloadStatus {
        if !is_trackable(correlation_id) {
            return DownloadStatus::unknown(correlation_id);
        }

        let lookup = tokio::time::timeout(self.timeout, self.engine.query_status(correlation_id));
        match lookup.await {
            Ok(Ok(Some(state))) => map_native_state(correlation_id, state),
            Ok(Ok(None)) => {
                log::debug!("Job {} unknown to {}", correlation_id, self.engine.engine_name());
                DownloadStatus::unknown(correlation_id)
            }
            Ok(Err(e)) => {
                log::debug!("Status lookup for {} failed: {}", correlation_id, e);
                DownloadStatus::unknown(correlation_id)
            }
            Err(_) => {
                log::warn!(
                    "Status lookup for {} timed out after {:?}",
                    correlation_id,
                    self.timeout
                );
                DownloadStatus::unknown(correlation_id)
            }
        }
    }

    /// Status of a stored record; untrackable records are not looked up
    pub async fn poll_record(&self, record: &DownloadRecord) -> DownloadStatus {
        self.poll(&record.correlation_id).await
    }

    /// Poll several records concurrently, results in input order
    pub async fn poll_many(&self, records: &[DownloadRecord]) -> Vec<DownloadStatus> {
        join_all(records.iter().map(|record| self.poll_record(record))).await
    }
}

/// Map an engine state to a phase and a progress fraction
pub fn map_native_state(correlation_id: &str, state: NativeState) -> DownloadStatus {
    let (phase, progress) = match state {
        NativeState::Enqueued | NativeState::Blocked => (DownloadPhase::Pending, 0.0),
        NativeState::Running { progress } => {
            (DownloadPhase::Running, f32::from(progress.min(100)) / 100.0)
        }
        NativeState::Succeeded => (DownloadPhase::Succeeded, 1.0),
        NativeState::Failed => (DownloadPhase::Failed, 0.0),
        NativeState::Cancelled => (DownloadPhase::Unknown, 0.0),
    };

    DownloadStatus {
        correlation_id: correlation_id.to_string(),
        phase,
        progress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockEngine;
    use crate::types::UNTRACKED_CORRELATION_ID;

    fn poller(engine: &MockEngine) -> StatusPoller {
        StatusPoller::new(Arc::new(engine.clone()))
    }

    #[tokio::test]
    async fn test_pending_then_running_then_succeeded() {
        let engine = MockEngine::new();
        let poller = poller(&engine);
        engine.set_state("job-1", NativeState::Enqueued);

        let status = poller.poll("job-1").await;
        assert_eq!(status.phase, DownloadPhase::Pending);
        assert_eq!(status.progress, 0.0);

        engine.set_state("job-1", NativeState::Running { progress: 42 });
        let status = poller.poll("job-1").await;
        assert_eq!(status.phase, DownloadPhase::Running);
        assert!((status.progress - 0.42).abs() < 1e-6);

        engine.set_state("job-1", NativeState::Succeeded);
        for _ in 0..3 {
            let status = poller.poll("job-1").await;
            assert_eq!(status.phase, DownloadPhase::Succeeded);
            assert_eq!(status.progress, 1.0);
        }
    }

    #[tokio::test]
    async fn test_unknown_job_is_unknown() {
        let engine = MockEngine::new();
        let status = poller(&engine).poll("never-submitted").await;
        assert_eq!(status.phase, DownloadPhase::Unknown);
        assert_eq!(status.progress, 0.0);
        assert_eq!(status.correlation_id, "never-submitted");
    }

    #[tokio::test]
    async fn test_lookup_error_is_unknown() {
        let engine = MockEngine::new();
        engine.set_state("job-1", NativeState::Running { progress: 10 });
        engine.fail_queries();

        let status = poller(&engine).poll("job-1").await;
        assert_eq!(status.phase, DownloadPhase::Unknown);
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_unknown() {
        let engine = MockEngine::new();
        engine.set_state("job-1", NativeState::Enqueued);
        engine.delay_queries(Duration::from_millis(200));

        let poller = StatusPoller::with_timeout(Arc::new(engine.clone()), Duration::from_millis(20));
        assert_eq!(poller.poll("job-1").await.phase, DownloadPhase::Unknown);
    }

    #[tokio::test]
    async fn test_sentinel_is_never_sent_to_engine() {
        let engine = MockEngine::new();
        let poller = poller(&engine);

        assert_eq!(poller.poll(UNTRACKED_CORRELATION_ID).await.phase, DownloadPhase::Unknown);
        assert_eq!(poller.poll("").await.phase, DownloadPhase::Unknown);
        assert_eq!(engine.query_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_many_keeps_order() {
        let engine = MockEngine::new();
        engine.set_state("a", NativeState::Failed);
        engine.set_state("b", NativeState::Blocked);

        let record = |id: &str| DownloadRecord {
            id: 0,
            post_id: String::new(),
            creator_id: String::new(),
            creator_name: String::new(),
            file_name: String::new(),
            resolved_path: String::new(),
            media_kind: Default::default(),
            correlation_id: id.to_string(),
            created_at: chrono::Utc::now(),
        };

        let statuses = poller(&engine).poll_many(&[record("a"), record("b")]).await;
        assert_eq!(statuses[0].phase, DownloadPhase::Failed);
        assert_eq!(statuses[1].phase, DownloadPhase::Pending);
    }

    #[test]
    fn test_map_native_state_clamps_progress() {
        let status = map_native_state("j", NativeState::Running { progress: 250 });
        assert_eq!(status.progress, 1.0);
        assert_eq!(map_native_state("j", NativeState::Cancelled).phase, DownloadPhase::Unknown);
    }
}
