//! Polling bookkeeping for frontends
//!
//! The poller is stateless; a frontend that polls on an interval keeps a
//! [`DownloadMonitor`] to know which records still need polling and which
//! have been stuck in Unknown long enough to be shown as such.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::{DownloadPhase, DownloadRecord, DownloadStatus};

#[derive(Debug, Clone)]
struct Observation {
    status: DownloadStatus,
    unknown_since: Option<Instant>,
    stale_reported: bool,
}

/// Last observed status per correlation id
#[derive(Debug, Clone)]
pub struct DownloadMonitor {
    grace: Duration,
    observed: HashMap<String, Observation>,
}

impl DownloadMonitor {
    pub fn new(unknown_grace: Duration) -> Self {
        Self {
            grace: unknown_grace,
            observed: HashMap::new(),
        }
    }

    /// Trackable records that have not reached a terminal phase
    pub fn needs_poll(&self, record: &DownloadRecord) -> bool {
        record.is_trackable()
            && !self
                .observed
                .get(&record.correlation_id)
                .is_some_and(|o| o.status.phase.is_terminal())
    }

    /// The subset of `records` that should be polled this round
    pub fn pending<'a>(&self, records: &'a [DownloadRecord]) -> Vec<&'a DownloadRecord> {
        records.iter().filter(|r| self.needs_poll(r)).collect()
    }

    /// Record a poll result. Returns whether the phase or progress changed.
    pub fn observe(&mut self, status: DownloadStatus, now: Instant) -> bool {
        let previous = self.observed.get(&status.correlation_id);
        let changed = previous.map_or(true, |o| {
            o.status.phase != status.phase || o.status.progress != status.progress
        });

        let (unknown_since, stale_reported) = match (status.phase, previous) {
            (DownloadPhase::Unknown, Some(o)) => (o.unknown_since.or(Some(now)), o.stale_reported),
            (DownloadPhase::Unknown, None) => (Some(now), false),
            _ => (None, false),
        };

        self.observed.insert(
            status.correlation_id.clone(),
            Observation {
                status,
                unknown_since,
                stale_reported,
            },
        );
        changed
    }

    /// Last observed status
    pub fn status(&self, correlation_id: &str) -> Option<&DownloadStatus> {
        self.observed.get(correlation_id).map(|o| &o.status)
    }

    /// Whether the job has reported Unknown for longer than the grace period
    pub fn is_stale_unknown(&self, correlation_id: &str, now: Instant) -> bool {
        self.observed
            .get(correlation_id)
            .and_then(|o| o.unknown_since)
            .is_some_and(|since| now.saturating_duration_since(since) >= self.grace)
    }

    /// Like [`is_stale_unknown`](Self::is_stale_unknown) but true only the
    /// first time the grace period is crossed
    pub fn take_newly_stale(&mut self, correlation_id: &str, now: Instant) -> bool {
        if !self.is_stale_unknown(correlation_id, now) {
            return false;
        }
        match self.observed.get_mut(correlation_id) {
            Some(o) if !o.stale_reported => {
                o.stale_reported = true;
                true
            }
            _ => false,
        }
    }

    /// Drop bookkeeping for a deleted record
    pub fn forget(&mut self, correlation_id: &str) {
        self.observed.remove(correlation_id);
    }
}
