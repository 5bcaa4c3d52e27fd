//! Settings database operations

use crate::db::Database;
use crate::error::Result;
use crate::types::Settings;
use rusqlite::{params, OptionalExtension};

/// Key of the user-selected destination root
pub const DESTINATION_ROOT_KEY: &str = "destination_root";

/// Settings database operations
pub struct SettingsDb;

impl SettingsDb {
    /// Load all settings from database
    pub fn load(db: &Database) -> Result<Settings> {
        let mut settings = Settings::default();

        db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            for row in rows {
                let (key, value) = row?;
                match key.as_str() {
                    DESTINATION_ROOT_KEY => {
                        settings.destination_root = Some(value).filter(|s| !s.is_empty());
                    }
                    "delete_files_on_remove" => {
                        settings.delete_files_on_remove = value == "true";
                    }
                    "poll_interval_ms" => {
                        settings.poll_interval_ms = value.parse().unwrap_or(1000);
                    }
                    "poll_timeout_ms" => {
                        settings.poll_timeout_ms = value.parse().unwrap_or(2000);
                    }
                    "unknown_grace_secs" => {
                        settings.unknown_grace_secs = value.parse().unwrap_or(30);
                    }
                    "expedited_quota" => {
                        settings.expedited_quota = value.parse().unwrap_or(3);
                    }
                    "max_concurrent_downloads" => {
                        settings.max_concurrent_downloads = value.parse().unwrap_or(5);
                    }
                    "user_agent" => settings.user_agent = value,
                    _ => {}
                }
            }

            Ok(())
        })?;

        Ok(settings)
    }

    /// Save a single setting
    pub fn set(db: &Database, key: &str, value: &str) -> Result<()> {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)",
                params![key, value],
            )?;
            Ok(())
        })
    }

    /// Remove a single setting so its default applies again
    pub fn unset(db: &Database, key: &str) -> Result<()> {
        db.with_conn(|conn| {
            conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
            Ok(())
        })
    }

    /// Save all settings
    pub fn save(db: &Database, settings: &Settings) -> Result<()> {
        match settings.destination_root {
            Some(ref root) => Self::set(db, DESTINATION_ROOT_KEY, root)?,
            None => Self::unset(db, DESTINATION_ROOT_KEY)?,
        }
        Self::set(db, "delete_files_on_remove", if settings.delete_files_on_remove { "true" } else { "false" })?;
        Self::set(db, "poll_interval_ms", &settings.poll_interval_ms.to_string())?;
        Self::set(db, "poll_timeout_ms", &settings.poll_timeout_ms.to_string())?;
        Self::set(db, "unknown_grace_secs", &settings.unknown_grace_secs.to_string())?;
        Self::set(db, "expedited_quota", &settings.expedited_quota.to_string())?;
        Self::set(db, "max_concurrent_downloads", &settings.max_concurrent_downloads.to_string())?;
        Self::set(db, "user_agent", &settings.user_agent)?;
        Ok(())
    }

    /// Get a single setting value
    pub fn get(db: &Database, key: &str) -> Result<Option<String>> {
        db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }
}
