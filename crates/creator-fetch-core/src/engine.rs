//! Collaborator interfaces
//!
//! The pipeline never transfers bytes itself. It hands [`WorkDescriptor`]s to
//! an [`ExecutionEngine`] that owns persistence across restarts, retries and
//! scheduling, and reads the destination root from a [`PreferenceStore`].

use async_trait::async_trait;
use std::path::PathBuf;

use crate::db::{Database, SettingsDb, DESTINATION_ROOT_KEY};
use crate::error::Result;
use crate::types::{NativeState, WorkDescriptor};

/// Durable background execution engine
///
/// Correlation ids returned by [`submit`](ExecutionEngine::submit) are opaque
/// to everything except the implementation and stay unique for the life of
/// the job, including across process restarts. Jobs may run more than once.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Queue a job and return its correlation id. With `expedited` set the
    /// engine may answer [`Error::ExpeditedQuotaExhausted`](crate::Error).
    async fn submit(&self, descriptor: &WorkDescriptor, expedited: bool) -> Result<String>;

    /// Current native state of a job, `None` when the engine does not know it
    async fn query_status(&self, correlation_id: &str) -> Result<Option<NativeState>>;

    /// Ask the engine to stop a job. Advisory; the job may still complete.
    async fn cancel(&self, correlation_id: &str) -> Result<()>;

    /// Concrete location of a finished job's file, for engines that expose it
    fn output_path(&self, _correlation_id: &str) -> Option<PathBuf> {
        None
    }

    /// Engine name (for logging)
    fn engine_name(&self) -> &'static str;
}

/// Source of the user's destination root preference
pub trait PreferenceStore: Send + Sync {
    /// The configured root, `None` for the platform default location
    fn destination_root(&self) -> Result<Option<String>>;
}

impl PreferenceStore for Database {
    fn destination_root(&self) -> Result<Option<String>> {
        Ok(SettingsDb::get(self, DESTINATION_ROOT_KEY)?.filter(|root| !root.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_preference_store() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.destination_root().unwrap(), None);

        SettingsDb::set(&db, DESTINATION_ROOT_KEY, "   ").unwrap();
        assert_eq!(db.destination_root().unwrap(), None);

        SettingsDb::set(&db, DESTINATION_ROOT_KEY, "content://tree/123").unwrap();
        assert_eq!(db.destination_root().unwrap().as_deref(), Some("content://tree/123"));
    }
}
