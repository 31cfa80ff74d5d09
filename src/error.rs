//! Error types for songprint

use crate::models::SongId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the hash index
#[derive(Debug, Error)]
pub enum IndexError {
    /// Failed to create the directory holding the database file.
    #[error("Could not create index directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to open, query or write the database.
    #[error("Hash index query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    /// A writer panicked while holding the write lock.
    #[error("Hash index writer lock poisoned")]
    LockPoisoned,
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config file parse failed: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while decoding audio into a sample buffer
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Could not open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode {path}: {source}")]
    Decode { path: PathBuf, source: hound::Error },
    #[error("Failed to decode {path}: {source}")]
    Codec {
        path: PathBuf,
        source: symphonia::core::errors::Error,
    },
    #[error("Failed to read tags from {path}: {source}")]
    Tags {
        path: PathBuf,
        source: lofty::error::LoftyError,
    },
    #[error("Unsupported audio format in {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    /// A batch item resolved to a song the index already holds.
    #[error("Song {0} is already registered")]
    AlreadyRegistered(SongId),
    /// The worker pool for batch registration could not be built.
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
