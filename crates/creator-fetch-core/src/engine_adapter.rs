//! Engine Adapter
//!
//! Runs downloads on the gosh-dl engine, which persists its queue in its own
//! session database and retries transfers internally.

use async_trait::async_trait;
use gosh_dl::{
    DownloadEngine, DownloadId, DownloadOptions, DownloadPriority, DownloadState as EngineState,
    DownloadStatus as EngineStatus, EngineConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::get_data_dir;
use crate::engine::ExecutionEngine;
use crate::error::{Error, Result};
use crate::types::{default_download_dir, NativeState, Settings, WorkDescriptor};

/// [`ExecutionEngine`] backed by gosh-dl
#[derive(Clone)]
pub struct GoshDlEngine {
    engine: Arc<DownloadEngine>,
    expedited_quota: usize,
    delete_files_on_cancel: bool,
}

impl GoshDlEngine {
    /// Wrap an already running engine
    pub fn new(engine: Arc<DownloadEngine>, settings: &Settings) -> Self {
        Self {
            engine,
            expedited_quota: settings.expedited_quota as usize,
            delete_files_on_cancel: settings.delete_files_on_remove,
        }
    }

    /// Start gosh-dl with a configuration derived from the settings
    pub async fn start(settings: &Settings) -> Result<Self> {
        let engine = DownloadEngine::new(settings_to_engine_config(settings)).await?;
        Ok(Self::new(engine, settings))
    }

    /// Get a reference to the engine
    pub fn engine(&self) -> &Arc<DownloadEngine> {
        &self.engine
    }

    /// Directory used for descriptors without a root override
    pub fn download_dir(&self) -> PathBuf {
        self.engine.get_config().download_dir
    }

    /// Location of the file written by a job, once the engine knows it
    pub fn file_path(&self, correlation_id: &str) -> Option<PathBuf> {
        let id = parse_gid(correlation_id).ok()?;
        let status = self.engine.status(id)?;
        Some(status.metadata.save_dir.join(&status.metadata.name))
    }

    fn expedited_slot_available(&self) -> bool {
        self.engine.active().len() < self.expedited_quota
    }
}

#[async_trait]
impl ExecutionEngine for GoshDlEngine {
    async fn submit(&self, descriptor: &WorkDescriptor, expedited: bool) -> Result<String> {
        if expedited && !self.expedited_slot_available() {
            return Err(Error::ExpeditedQuotaExhausted);
        }

        let save_dir = prepare_save_dir(descriptor, &self.download_dir()).await?;

        // Same directory and file name on every run, so a retried job
        // overwrites its earlier output.
        let options = DownloadOptions {
            save_dir: Some(save_dir),
            filename: Some(descriptor.file_name.clone()),
            priority: priority_for(expedited),
            ..Default::default()
        };

        let id = self.engine.add_http(&descriptor.source_url, options).await?;
        Ok(id.as_uuid().to_string())
    }

    async fn query_status(&self, correlation_id: &str) -> Result<Option<NativeState>> {
        let Ok(id) = parse_gid(correlation_id) else {
            return Ok(None);
        };
        Ok(self.engine.status(id).as_ref().map(native_state))
    }

    async fn cancel(&self, correlation_id: &str) -> Result<()> {
        let id = parse_gid(correlation_id)?;
        self.engine.cancel(id, self.delete_files_on_cancel).await?;
        Ok(())
    }

    fn output_path(&self, correlation_id: &str) -> Option<PathBuf> {
        self.file_path(correlation_id)
    }

    fn engine_name(&self) -> &'static str {
        "gosh-dl"
    }
}

/// Convert settings to engine configuration
pub fn settings_to_engine_config(settings: &Settings) -> EngineConfig {
    let download_dir = default_download_dir();

    // Ensure download directory exists
    if !download_dir.exists() {
        if let Err(e) = std::fs::create_dir_all(&download_dir) {
            log::warn!("Failed to create download directory {:?}: {}", download_dir, e);
        }
    }

    EngineConfig {
        download_dir,
        max_concurrent_downloads: settings.max_concurrent_downloads as usize,
        user_agent: settings.user_agent.clone(),
        database_path: Some(get_data_dir().join("engine.db")),
        ..Default::default()
    }
}

/// Resolve and create the directory a descriptor writes into. gosh-dl only
/// writes to the local filesystem, so provider URIs are refused.
async fn prepare_save_dir(descriptor: &WorkDescriptor, default_root: &Path) -> Result<PathBuf> {
    if !descriptor.has_local_destination() {
        return Err(Error::InvalidInput(format!(
            "destination root is not a local path: {}",
            descriptor.target_root_override.as_deref().unwrap_or_default()
        )));
    }

    let save_dir = descriptor.destination_dir(default_root);
    if let Err(e) = tokio::fs::create_dir_all(&save_dir).await {
        log::warn!("Failed to create download directory {:?}: {}", save_dir, e);
    }
    Ok(save_dir)
}

fn priority_for(expedited: bool) -> DownloadPriority {
    if !expedited {
        return DownloadPriority::default();
    }
    match "high".parse::<DownloadPriority>() {
        Ok(priority) => priority,
        Err(_) => {
            log::warn!("gosh-dl rejected priority 'high', expedited work runs at normal priority");
            DownloadPriority::default()
        }
    }
}

/// Parse a correlation id back into a gosh-dl id
fn parse_gid(gid: &str) -> std::result::Result<DownloadId, gosh_dl::EngineError> {
    if let Ok(uuid) = uuid::Uuid::parse_str(gid) {
        return Ok(DownloadId::from_uuid(uuid));
    }
    DownloadId::from_gid(gid)
        .ok_or_else(|| gosh_dl::EngineError::NotFound(format!("Invalid GID: {}", gid)))
}

fn native_state(status: &EngineStatus) -> NativeState {
    match &status.state {
        EngineState::Queued => NativeState::Enqueued,
        EngineState::Paused => NativeState::Blocked,
        EngineState::Connecting | EngineState::Downloading => NativeState::Running {
            progress: percent(status.progress.completed_size, status.progress.total_size),
        },
        // Seeding only happens after the payload is complete
        EngineState::Seeding | EngineState::Completed => NativeState::Succeeded,
        EngineState::Error { .. } => NativeState::Failed,
    }
}

/// Progress in the 0-100 units of [`NativeState::Running`]
fn percent(completed: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            ((completed.min(total) as f64 / total as f64) * 100.0).floor() as u8
        }
        _ => 0,
    }
}
