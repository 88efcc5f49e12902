use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid output pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Benchmark sampler error: {0}")]
    Sampler(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Custom check '{name}' errored: {message}")]
    CustomCheck { name: String, message: String },

    #[error("Failed to export performance data to {}: {message}", path.display())]
    Export { path: PathBuf, message: String },

    #[error("Failed to persist benchmark history to {}: {message}", path.display())]
    HistoryPersist { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
