// src/error.rs

//! Error types for dbmirror
//!
//! Every variant aborts a sync run. Nothing is retried and nothing is
//! downgraded to a warning.

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// All errors that can occur while mirroring
#[derive(Error, Debug)]
pub enum Error {
    /// The remote manifest endpoint was unreachable, redirected, or returned non-200
    #[error("Manifest unavailable: {0}")]
    ManifestUnavailable(String),

    /// A remote or local manifest (or the mirrored metadata) did not decode
    #[error("Manifest parse error: {0}")]
    ManifestParseError(String),

    /// A resource or metadata download failed
    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    /// The destination directory or a file in it could not be created, read or written
    #[error("Filesystem error: {0}")]
    FilesystemError(String),

    /// The source URL could not be normalized into a base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A resource path would land outside the destination directory
    #[error("Invalid resource path: {0}")]
    InvalidPath(String),

    /// Client setup failed
    #[error("Initialization error: {0}")]
    InitError(String),
}
