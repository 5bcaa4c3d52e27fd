//! Database connection management

use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SCHEMA: &str = include_str!("../../../../migrations/001_initial.sql");

const APP_ID: &str = "io.github.creatorfetch.CreatorFetch";

/// Directory holding the application database and the engine session
pub fn get_data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_ID);

    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

/// Get the database path
pub fn get_db_path() -> PathBuf {
    get_data_dir().join("creator-fetch.db")
}

/// Open the application database at its default location
pub fn init_database() -> Result<Database> {
    Database::open(&get_db_path())
}

/// Database wrapper with thread-safe connection
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file and apply the schema
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Initializing database at: {:?}", path);
        Self::from_connection(Connection::open(path)?)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a function with the database connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Database(format!("Failed to lock database: {}", e)))?;
        f(&conn).map_err(Into::into)
    }
}
