//! Error types for the ip2proxy library
//!
//! Lookups that fail for data reasons (bad address text, IPv6 query against an
//! IPv4-only file, field absent from the schema) do not produce errors: they
//! come back as sentinel values inside [`QueryResult`](crate::QueryResult).
//! `ProxyError` covers the hard failures: the database could not be opened or
//! parsed, or a read from an already-open database failed.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ip2proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Main error type for ip2proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// `open` was called with an empty path
    #[error("database path must not be empty")]
    InvalidArgument,

    /// The database file does not exist or cannot be opened
    #[error("missing database file {}: {source}", path.display())]
    MissingFile {
        /// Path that was tried
        path: PathBuf,
        /// Underlying open error
        #[source]
        source: io::Error,
    },

    /// Header names a database type with no known column layout
    #[error("unsupported database type {0}")]
    UnsupportedDatabaseType(u8),

    /// Header fields are inconsistent with the file or the schema
    #[error("invalid database header: {0}")]
    InvalidHeader(String),

    /// Mapping a region of the file failed
    #[error("memory mapping failed: {0}")]
    Mmap(#[source] io::Error),

    /// Read failure on an opened database (including truncation)
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ProxyError {
    /// True when the error means the database file could not be found or opened
    pub fn is_missing_file(&self) -> bool {
        matches!(self, ProxyError::MissingFile { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_display() {
        let err = ProxyError::MissingFile {
            path: PathBuf::from("dummy.bin"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.is_missing_file());
        assert!(err.to_string().contains("dummy.bin"));
    }

    #[test]
    fn test_io_conversion() {
        let err: ProxyError = io::Error::new(io::ErrorKind::UnexpectedEof, "short read").into();
        assert!(matches!(err, ProxyError::Io(_)));
        assert!(!err.is_missing_file());
    }
}
