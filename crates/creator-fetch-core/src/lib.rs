//! Creator Fetch Core Library
//!
//! This crate provides the download orchestration pipeline for Creator Fetch:
//! path sanitizing, job submission to a durable execution engine, the
//! persisted download records, status polling and cancellation. It is
//! UI-agnostic; frontends drive it directly or through [`DownloadService`].

pub mod db;
pub mod engine;
pub mod engine_adapter;
pub mod error;
pub mod gateway;
pub mod monitor;
pub mod paths;
pub mod poller;
pub mod service;
pub mod submitter;
pub mod types;

#[cfg(test)]
mod mocks;

// Re-exports for convenience
pub use db::{get_db_path, init_database, Database, DownloadRecordsDb, SettingsDb};
pub use engine::{ExecutionEngine, PreferenceStore};
pub use engine_adapter::{settings_to_engine_config, GoshDlEngine};
pub use error::{Error, Result};
pub use gateway::CancellationGateway;
pub use monitor::DownloadMonitor;
pub use paths::{sanitize_segment, DestinationLayout};
pub use poller::StatusPoller;
pub use service::{DownloadService, PipelineCommand, UiMessage};
pub use submitter::JobSubmitter;
pub use types::*;
