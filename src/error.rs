// src/error.rs

use thiserror::Error;

/// Core error types for whatpkgs
///
/// Only conditions that abort a lookup or the whole run live here. An
/// unresolved, filtered or ambiguous requirement is a normal resolution
/// outcome and never surfaces as an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    /// A root or source package name matched nothing in the index
    #[error("Package name {0} returned no packages")]
    NoSuchPackage(String),

    /// An exact-identity lookup matched more than one package
    #[error("Too many packages returned for {0}")]
    TooManyPackages(String),

    /// The package index lacks a capability the resolver depends on
    #[error("Package index is incompatible: {0}")]
    IndexIncompatible(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O errors with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Repository metadata could not be fetched
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Malformed repository metadata or package header
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Downloaded metadata does not match the checksum in repomd.xml
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// A closure worker panicked while expanding a package
    #[error("Closure worker panicked: {0}")]
    WorkerPanicked(String),

    /// Invalid configuration file or option combination
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Whether this error must abort the whole run rather than one root
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            Error::IndexIncompatible(_) | Error::Database(_) | Error::DatabaseNotFound(_)
        )
    }
}

/// Result type alias using whatpkgs' Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_errors_are_per_root() {
        assert!(!Error::NoSuchPackage("foo".to_string()).is_fatal_for_run());
        assert!(!Error::TooManyPackages("foo".to_string()).is_fatal_for_run());
        assert!(Error::IndexIncompatible("no requires_pre".to_string()).is_fatal_for_run());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::NoSuchPackage("bash".to_string());
        assert_eq!(err.to_string(), "Package name bash returned no packages");

        let err = Error::ChecksumMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(err.to_string(), "Checksum mismatch: expected aa, got bb");
    }
}
