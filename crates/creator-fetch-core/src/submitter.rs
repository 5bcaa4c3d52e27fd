//! Job submission
//!
//! Turns a [`DownloadRequest`] into a queued engine job and the record that
//! tracks it.

use chrono::Utc;
use std::sync::Arc;

use crate::db::{Database, DownloadRecordsDb};
use crate::engine::{ExecutionEngine, PreferenceStore};
use crate::error::{Error, Result};
use crate::paths::DestinationLayout;
use crate::types::{
    is_trackable, BatchOutcome, DownloadRecord, DownloadRequest, PostDownload, WorkDescriptor,
};

/// Submits downloads to the execution engine and records them
#[derive(Clone)]
pub struct JobSubmitter {
    engine: Arc<dyn ExecutionEngine>,
    preferences: Arc<dyn PreferenceStore>,
    db: Database,
}

impl JobSubmitter {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        preferences: Arc<dyn PreferenceStore>,
        db: Database,
    ) -> Self {
        Self {
            engine,
            preferences,
            db,
        }
    }

    /// Queue one file and persist its record
    pub async fn submit(&self, request: DownloadRequest) -> Result<DownloadRecord> {
        validate(&request)?;

        let destination_root = match self.preferences.destination_root() {
            Ok(root) => root,
            Err(e) => {
                log::warn!("Failed to read destination root, using default location: {}", e);
                None
            }
        };

        let layout = DestinationLayout::new(
            &request.creator_name,
            &request.post_title,
            request.grouping_hint.as_deref(),
            &request.file_name,
        );

        let descriptor = WorkDescriptor {
            source_url: request.source_url.clone(),
            destination_folder: layout.folder(),
            file_name: layout.file_name.clone(),
            target_root_override: destination_root.clone(),
        };

        let correlation_id = self.enqueue(&descriptor).await?;

        let mut record = DownloadRecord {
            id: 0,
            post_id: request.post_id,
            creator_id: request.creator_id,
            creator_name: request.creator_name,
            file_name: request.file_name,
            resolved_path: layout.resolved_path(destination_root.is_some()),
            media_kind: request.media_kind,
            correlation_id,
            created_at: Utc::now(),
        };

        record.id = match DownloadRecordsDb::insert(&self.db, &record) {
            Ok(id) => id,
            Err(e) => {
                // Don't leave a job running that no record points to
                log::error!(
                    "Failed to persist record for job {}, cancelling it: {}",
                    record.correlation_id,
                    e
                );
                if let Err(cancel_err) = self.engine.cancel(&record.correlation_id).await {
                    log::warn!(
                        "Failed to cancel orphaned job {}: {}",
                        record.correlation_id,
                        cancel_err
                    );
                }
                return Err(e);
            }
        };

        log::info!(
            "Queued {} as job {} -> {}",
            record.file_name,
            record.correlation_id,
            record.resolved_path
        );

        Ok(record)
    }

    /// Queue the main file and every attachment of a post. A failing file
    /// does not stop the rest of the batch.
    pub async fn submit_post(&self, post: &PostDownload) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for request in post.requests() {
            let file_name = request.file_name.clone();
            match self.submit(request).await {
                Ok(record) => outcome.submitted.push(record),
                Err(e) => {
                    log::warn!("Failed to queue {} from post {}: {}", file_name, post.post_id, e);
                    outcome.failed.push((file_name, e));
                }
            }
        }

        outcome
    }

    /// Submit expedited, falling back to standard scheduling when the engine
    /// has no expedited capacity left
    async fn enqueue(&self, descriptor: &WorkDescriptor) -> Result<String> {
        let correlation_id = match self.engine.submit(descriptor, true).await {
            Err(Error::ExpeditedQuotaExhausted) => {
                log::debug!(
                    "{} expedited quota exhausted, submitting {} with standard priority",
                    self.engine.engine_name(),
                    descriptor.file_name
                );
                self.engine.submit(descriptor, false).await?
            }
            other => other?,
        };

        if !is_trackable(&correlation_id) {
            return Err(Error::Engine(format!(
                "{} returned an unusable correlation id '{}'",
                self.engine.engine_name(),
                correlation_id
            )));
        }

        Ok(correlation_id)
    }
}

fn validate(request: &DownloadRequest) -> Result<()> {
    if request.file_name.trim().is_empty() {
        return Err(Error::InvalidInput("file name is empty".into()));
    }
    if request.source_url.trim().is_empty() {
        return Err(Error::InvalidInput("source URL is empty".into()));
    }

    let url = url::Url::parse(&request.source_url).map_err(|source| Error::InvalidUrl {
        url: request.source_url.clone(),
        source,
    })?;
    if url.host_str().is_none() {
        return Err(Error::InvalidInput(format!(
            "source URL has no host: {}",
            request.source_url
        )));
    }

    Ok(())
}
