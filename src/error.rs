//! Error types for the index engine.
//!
//! Callers need to tell four situations apart:
//!
//! - a trigram or docid that simply is not in this shard ([`IndexError::NotFound`],
//!   [`IndexError::DocidOutOfRange`]), which usually means "zero results",
//! - a file that failed the ingestion heuristics ([`IndexError::Rejected`]),
//!   which only affects that one file,
//! - an on-disk format violation ([`IndexError::Corrupt`]), which must abort
//!   the operation,
//! - plain I/O failures ([`IndexError::Io`]).

use crate::index::types::{DocId, Trigram};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = IndexError> = std::result::Result<T, E>;

/// Why a file was not added to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Larger than `IndexConfig::max_file_len`.
    TooLong,
    /// Contains a line longer than `IndexConfig::max_line_len`.
    LineTooLong,
    /// Contains a byte pair that cannot occur in UTF-8.
    InvalidUtf8,
    /// More distinct trigrams than `IndexConfig::max_text_trigrams`.
    TooManyTrigrams,
    /// The indexed name contains a newline, which the docid map cannot store.
    InvalidName,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RejectReason::TooLong => "too long, ignoring",
            RejectReason::LineTooLong => "very long lines, ignoring",
            RejectReason::InvalidUtf8 => "invalid UTF-8, ignoring",
            RejectReason::TooManyTrigrams => "too many trigrams, probably not text, ignoring",
            RejectReason::InvalidName => "name contains a newline, ignoring",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// The trigram does not occur anywhere in this shard.
    #[error("trigram {trigram:#08x} not found")]
    NotFound { trigram: Trigram },

    /// The docid is outside of the docid map.
    #[error("docid {docid} outside of docid map [0, {count})")]
    DocidOutOfRange { docid: DocId, count: u32 },

    /// The file was not indexed.
    #[error("{reason}")]
    Rejected { reason: RejectReason },

    /// The on-disk data violates the index format.
    #[error("corrupt index file {file}: {reason}")]
    Corrupt { file: String, reason: String },

    /// I/O error on a specific path.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error without path context (e.g. while writing a buffered stream).
    #[error(transparent)]
    Stream(#[from] io::Error),

    /// A configuration file could not be parsed.
    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The reader has been closed.
    #[error("index is closed")]
    Closed,

    /// The query cannot be evaluated against a trigram index.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl IndexError {
    pub fn corrupt(file: impl Into<String>, reason: impl Into<String>) -> Self {
        IndexError::Corrupt {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        IndexError::Rejected { reason }
    }

    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for "absent from this shard" errors, which are not failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IndexError::NotFound { .. } | IndexError::DocidOutOfRange { .. }
        )
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, IndexError::Rejected { .. })
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, IndexError::Corrupt { .. })
    }
}

/// Extension for attaching paths to `io::Result`s.
pub(crate) trait IoContext<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| IndexError::io(path, e))
    }
}
