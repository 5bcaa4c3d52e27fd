//! Error handling for Creator Fetch

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The execution engine refused or failed to handle a request
    #[error("execution engine error: {0}")]
    Engine(String),

    /// No expedited capacity left; callers fall back to standard scheduling
    #[error("expedited work quota exhausted")]
    ExpeditedQuotaExhausted,

    #[error("invalid source URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("channel error: {0}")]
    Channel(String),
}

impl From<gosh_dl::EngineError> for Error {
    fn from(err: gosh_dl::EngineError) -> Self {
        match err {
            gosh_dl::EngineError::NotFound(msg) => Error::NotFound(msg),
            gosh_dl::EngineError::InvalidInput { field, message } => {
                Error::InvalidInput(format!("{}: {}", field, message))
            }
            gosh_dl::EngineError::Storage { message, .. } => Error::Database(message),
            other => Error::Engine(other.to_string()),
        }
    }
}

impl<T> From<async_channel::SendError<T>> for Error {
    fn from(err: async_channel::SendError<T>) -> Self {
        Error::Channel(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
