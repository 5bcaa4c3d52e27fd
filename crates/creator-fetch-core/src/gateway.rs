//! Cancellation and record removal

use std::sync::Arc;

use crate::db::{Database, DownloadRecordsDb};
use crate::engine::ExecutionEngine;
use crate::error::Result;
use crate::types::{is_trackable, DownloadRecord};

/// Cancels engine jobs and deletes their records
#[derive(Clone)]
pub struct CancellationGateway {
    engine: Arc<dyn ExecutionEngine>,
    db: Database,
}

impl CancellationGateway {
    pub fn new(engine: Arc<dyn ExecutionEngine>, db: Database) -> Self {
        Self { engine, db }
    }

    /// Best-effort cancel. Failures are logged, never returned; the job may
    /// already be finished or gone.
    pub async fn cancel(&self, correlation_id: &str) {
        if !is_trackable(correlation_id) {
            return;
        }

        match self.engine.cancel(correlation_id).await {
            Ok(()) => log::info!("Cancelled job {}", correlation_id),
            Err(e) => log::warn!("Failed to cancel job {}: {}", correlation_id, e),
        }
    }

    /// Cancel the job if it can still be tracked, then delete the record.
    /// Only a store failure is reported.
    pub async fn delete_record(&self, record: &DownloadRecord) -> Result<()> {
        if record.is_trackable() {
            self.cancel(&record.correlation_id).await;
        }

        if !DownloadRecordsDb::delete(&self.db, record.id)? {
            log::debug!("Record {} was already deleted", record.id);
        }
        Ok(())
    }
}
