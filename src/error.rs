//! Error taxonomy for ingestion, aggregation and storage.
//!
//! - [`FormatError`] fails a single host's ingestion; the run continues.
//! - [`IntegrityError`] means the dataset itself is ambiguous; the run aborts.
//! - [`StorageError`] means a durable document could not be read or written;
//!   the run aborts.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A malformed or incomplete host source.
#[derive(Debug, Error)]
#[error("{file}: {kind}")]
pub struct FormatError {
    /// Name of the offending source (usually the file name).
    pub file: String,
    /// What was wrong with it.
    pub kind: FormatErrorKind,
}

impl FormatError {
    pub fn new(file: impl Into<String>, kind: FormatErrorKind) -> Self {
        Self {
            file: file.into(),
            kind,
        }
    }
}

/// The specific way a host source failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatErrorKind {
    #[error("source is empty")]
    Empty,

    #[error("could not read source: {0}")]
    Unreadable(String),

    #[error("expected {expected} metadata fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("line {line}: expected field `{expected}`, found `{found}`")]
    UnexpectedField {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("line {line}: field `{expected}` has no ':' separator")]
    MissingSeparator { line: usize, expected: &'static str },

    #[error("field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("header has no `i` column")]
    MissingIndexColumn,

    #[error("column `{column}` has no matching `{partner}` column")]
    UnpairedColumn { column: String, partner: String },

    #[error("header names none of the tracked functions ({0})")]
    NoTrackedFunctions(String),

    #[error("header has no sample rows")]
    NoSamples,

    #[error("row {row}: expected {expected} columns, found {found}")]
    ColumnCount {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row}: malformed CSV: {message}")]
    Malformed { row: usize, message: String },

    #[error("row {row}: invalid sample index `{value}`")]
    InvalidIndex { row: usize, value: String },

    #[error("row {row}: duplicate sample index {index}")]
    DuplicateIndex { row: usize, index: u64 },

    #[error("file name does not embed a host identifier")]
    NoHostIdInName,

    #[error("host identifier mismatch: file name says `{from_name}`, metadata says `{from_metadata}`")]
    HostIdMismatch {
        from_name: String,
        from_metadata: String,
    },

    #[error("no matching {0} file for this host")]
    MissingCompanion(&'static str),

    #[error("another file in this directory already provides host `{0}`")]
    DuplicateHostFile(String),
}

/// The aggregated dataset would become (or already is) ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("host `{host_id}` was already aggregated with different content")]
    HostCollision { host_id: String },

    #[error("sample {index} references host `{host_id}` which has no metadata")]
    DanglingHost { host_id: String, index: u64 },

    #[error("sample {index} claims host `{found}` but was supplied for host `{expected}`")]
    ForeignSample {
        expected: String,
        found: String,
        index: u64,
    },

    #[error("host `{host_id}` reports sample index {index} more than once")]
    DuplicateSample { host_id: String, index: u64 },

    #[error("host collection lists `{host_id}` under the key `{key}`")]
    MetadataKeyMismatch { key: String, host_id: String },

    #[error("dataset was built with function set `{dataset}` but `{configured}` is configured")]
    FunctionSetMismatch { dataset: String, configured: String },

    #[error("{document} has schema version {found}, only {supported} is supported")]
    SchemaVersion {
        document: &'static str,
        found: u32,
        supported: u32,
    },
}

/// A durable document could not be read or written.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode or decode {}: {source}", .path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to load a persisted document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("malformed document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn serde(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serde {
            path: path.into(),
            source,
        }
    }
}
