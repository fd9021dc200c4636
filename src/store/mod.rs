//! Persistent storage for accounts, questions and quiz history
//!
//! SQLite-backed; JSON columns hold keyword lists, courses and answers.

pub mod sqlite;
pub mod import;

pub use sqlite::{NewUser, SqliteStore, StoreStats};
pub use import::{import_path, load_question_file};

use thiserror::Error;

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique value (email) is already taken
    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("corrupt stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
