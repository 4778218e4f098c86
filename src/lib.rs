//! # Cardstore - card database storage engine
//!
//! A façade around an embedded SQLite store holding a trading card
//! database.
//!
//! Cardstore provides:
//! - Schema creation and `user_version` gated migrations
//! - Native SQL scalar functions (base64, UUID, card type, JSON pretty
//!   printing, WebP to bitmap transcoding)
//! - Lossless export of every card into one JSON document per file
//! - Transactional, all-or-nothing import of such a file tree into a new store
//! - Compaction and size reporting

pub mod card;
pub mod codec;
pub mod config;
pub mod storage;

// Re-exports for convenient access
pub use card::{CardDocument, CardType, Color, Language, Rarity, Side};
pub use codec::CodecError;
pub use config::StoreConfig;
pub use storage::{CardStore, DbStats, VacuumStats};

use std::path::PathBuf;

/// Result type alias for Cardstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Cardstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to use {}: {reason}", path.display())]
    Path { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected schema version {found} (expected {expected})")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("Inconsistent card {cardid}: {reason}")]
    Inconsistent { cardid: String, reason: String },

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Function registration failed: {0}")]
    Registration(String),
}

impl Error {
    /// Extended SQLite result code, when the error came from the engine
    pub fn result_code(&self) -> Option<i32> {
        match self {
            Error::Storage(rusqlite::Error::SqliteFailure(err, _)) => Some(err.extended_code),
            _ => None,
        }
    }

    pub(crate) fn path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Path { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn inconsistent(cardid: &str, reason: impl Into<String>) -> Self {
        Error::Inconsistent { cardid: cardid.to_string(), reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_from_engine_error() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        conn.execute("INSERT INTO t (id) VALUES (1)", []).unwrap();

        let err: Error = conn.execute("INSERT INTO t (id) VALUES (1)", []).unwrap_err().into();
        // SQLITE_CONSTRAINT_PRIMARYKEY
        assert_eq!(err.result_code(), Some(1555));
        assert!(Error::Registration("x".into()).result_code().is_none());
    }
}
