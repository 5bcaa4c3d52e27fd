//! Database module - SQLite persistence layer

mod connection;
mod records;
mod settings;

pub use connection::{get_data_dir, get_db_path, init_database, Database};
pub use records::DownloadRecordsDb;
pub use settings::{SettingsDb, DESTINATION_ROOT_KEY};
