//! Mock collaborators for unit tests.
//!
//! [`MockEngine`] keeps jobs in memory and lets a test script every answer
//! the pipeline can receive: native states, rejections, quota exhaustion,
//! failing or slow lookups.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::{ExecutionEngine, PreferenceStore};
use crate::error::{Error, Result};
use crate::types::{NativeState, WorkDescriptor};

#[derive(Default)]
struct MockEngineState {
    jobs: HashMap<String, NativeState>,
    submissions: Vec<(WorkDescriptor, bool)>,
    cancelled: Vec<String>,
    queries: usize,
    reject_submit: Option<String>,
    expedited_exhausted: bool,
    fixed_id: Option<String>,
    fail_cancel: bool,
    fail_query: bool,
    query_delay: Option<Duration>,
    outputs: HashMap<String, PathBuf>,
}

/// In-memory execution engine.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockEngineState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the native state of a job.
    pub fn set_state(&self, correlation_id: &str, state: NativeState) {
        self.state
            .lock()
            .unwrap()
            .jobs
            .insert(correlation_id.to_string(), state);
    }

    /// Make every submission fail with an engine error.
    pub fn reject_submissions(&self, reason: &str) {
        self.state.lock().unwrap().reject_submit = Some(reason.to_string());
    }

    /// Make expedited submissions fail with a quota error.
    pub fn exhaust_expedited_quota(&self) {
        self.state.lock().unwrap().expedited_exhausted = true;
    }

    /// Return the same correlation id for every submission.
    pub fn always_return_id(&self, id: &str) {
        self.state.lock().unwrap().fixed_id = Some(id.to_string());
    }

    pub fn fail_cancellations(&self) {
        self.state.lock().unwrap().fail_cancel = true;
    }

    pub fn fail_queries(&self) {
        self.state.lock().unwrap().fail_query = true;
    }

    pub fn delay_queries(&self, delay: Duration) {
        self.state.lock().unwrap().query_delay = Some(delay);
    }

    /// Report a concrete output location for a job.
    pub fn set_output_path(&self, correlation_id: &str, path: &str) {
        self.state
            .lock()
            .unwrap()
            .outputs
            .insert(correlation_id.to_string(), PathBuf::from(path));
    }

    /// Accepted submissions with their expedited flag.
    pub fn submissions(&self) -> Vec<(WorkDescriptor, bool)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    /// Number of status lookups received.
    pub fn query_count(&self) -> usize {
        self.state.lock().unwrap().queries
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn submit(&self, descriptor: &WorkDescriptor, expedited: bool) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.reject_submit {
            return Err(Error::Engine(reason.clone()));
        }
        if expedited && state.expedited_exhausted {
            return Err(Error::ExpeditedQuotaExhausted);
        }

        let id = state
            .fixed_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        state.jobs.insert(id.clone(), NativeState::Enqueued);
        state.submissions.push((descriptor.clone(), expedited));
        Ok(id)
    }

    async fn query_status(&self, correlation_id: &str) -> Result<Option<NativeState>> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.queries += 1;
            state.query_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        if state.fail_query {
            return Err(Error::Engine("lookup failed".into()));
        }
        Ok(state.jobs.get(correlation_id).copied())
    }

    async fn cancel(&self, correlation_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.cancelled.push(correlation_id.to_string());
        if state.fail_cancel {
            return Err(Error::Engine("cancel failed".into()));
        }
        if let Some(job) = state.jobs.get_mut(correlation_id) {
            if !matches!(job, NativeState::Succeeded | NativeState::Failed) {
                *job = NativeState::Cancelled;
            }
        }
        Ok(())
    }

    fn output_path(&self, correlation_id: &str) -> Option<PathBuf> {
        self.state.lock().unwrap().outputs.get(correlation_id).cloned()
    }

    fn engine_name(&self) -> &'static str {
        "mock"
    }
}

/// Preference store with a fixed answer.
#[derive(Clone, Default)]
pub struct MockPreferences {
    root: Option<String>,
    fail: bool,
}

impl MockPreferences {
    pub fn with_root(root: &str) -> Self {
        Self {
            root: Some(root.to_string()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            root: None,
            fail: true,
        }
    }
}

impl PreferenceStore for MockPreferences {
    fn destination_root(&self) -> Result<Option<String>> {
        if self.fail {
            return Err(Error::Database("preferences unavailable".into()));
        }
        Ok(self.root.clone())
    }
}
