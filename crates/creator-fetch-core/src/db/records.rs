//! Download record database operations

use crate::db::Database;
use crate::error::Result;
use crate::types::{DownloadRecord, MediaKind};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};

const SELECT_COLUMNS: &str = r#"
    SELECT id, post_id, creator_id, creator_name, file_name, resolved_path,
           media_kind, correlation_id, created_at
    FROM download_records
"#;

/// Download record database operations
pub struct DownloadRecordsDb;

impl DownloadRecordsDb {
    /// Insert a new record and return its id. The `id` field of the argument
    /// is ignored; ids come from SQLite and are never reused.
    pub fn insert(db: &Database, record: &DownloadRecord) -> Result<i64> {
        db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO download_records
                (post_id, creator_id, creator_name, file_name, resolved_path,
                 media_kind, correlation_id, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    record.post_id,
                    record.creator_id,
                    record.creator_name,
                    record.file_name,
                    record.resolved_path,
                    record.media_kind.to_string(),
                    record.correlation_id,
                    record.created_at.timestamp_millis(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Get a record by id
    pub fn get(db: &Database, id: i64) -> Result<Option<DownloadRecord>> {
        db.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()
        })
    }

    /// Get a record by the engine's correlation id
    pub fn get_by_correlation_id(
        db: &Database,
        correlation_id: &str,
    ) -> Result<Option<DownloadRecord>> {
        db.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE correlation_id = ?1"),
                params![correlation_id],
                row_to_record,
            )
            .optional()
        })
    }

    /// All records, newest first
    pub fn list(db: &Database) -> Result<Vec<DownloadRecord>> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC"
            ))?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    /// Records whose file or creator name contains `query`, ignoring case
    pub fn search(db: &Database, query: &str) -> Result<Vec<DownloadRecord>> {
        let query = query.trim();
        if query.is_empty() {
            return Self::list(db);
        }

        let needle = query.to_lowercase();
        let records = Self::list(db)?
            .into_iter()
            .filter(|r| {
                r.file_name.to_lowercase().contains(&needle)
                    || r.creator_name.to_lowercase().contains(&needle)
            })
            .collect();
        Ok(records)
    }

    /// Records grouped by creator display name, each group newest first
    pub fn group_by_creator(db: &Database) -> Result<BTreeMap<String, Vec<DownloadRecord>>> {
        let mut groups: BTreeMap<String, Vec<DownloadRecord>> = BTreeMap::new();
        for record in Self::list(db)? {
            groups
                .entry(record.creator_name.clone())
                .or_default()
                .push(record);
        }
        Ok(groups)
    }

    /// Ids of posts with at least one submitted download
    pub fn downloaded_post_ids(db: &Database) -> Result<BTreeSet<String>> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT post_id FROM download_records")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<BTreeSet<String>>>()?;
            Ok(ids)
        })
    }

    /// Replace the resolved path once the concrete location is known.
    /// Returns whether a row was updated.
    pub fn mark_resolved_path(db: &Database, correlation_id: &str, path: &str) -> Result<bool> {
        db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE download_records SET resolved_path = ?1 WHERE correlation_id = ?2",
                params![path, correlation_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete a record. Returns whether a row was removed.
    pub fn delete(db: &Database, id: i64) -> Result<bool> {
        db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM download_records WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    /// Number of stored records
    pub fn count(db: &Database) -> Result<i64> {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM download_records", [], |row| row.get(0))
        })
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DownloadRecord> {
    let media_kind: String = row.get(6)?;
    let created_at_ms: i64 = row.get(8)?;

    Ok(DownloadRecord {
        id: row.get(0)?,
        post_id: row.get(1)?,
        creator_id: row.get(2)?,
        creator_name: row.get(3)?,
        file_name: row.get(4)?,
        resolved_path: row.get(5)?,
        media_kind: MediaKind::from(media_kind.as_str()),
        correlation_id: row.get(7)?,
        created_at: DateTime::<Utc>::from_timestamp_millis(created_at_ms).unwrap_or_default(),
    })
}
