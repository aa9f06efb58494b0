// src/utils/error.rs
use std::path::PathBuf;
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read page text from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Page text is not valid UTF-8: {0}")]
    Encoding(PathBuf),
}

/// Failure while scanning a single page. Never aborts the document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("Page has no header line at index {0}")]
    MissingHeader(usize),

    #[error("Page header '{0}' names no entity")]
    NoEntity(String),

    #[error("Period sequence overflowed after {0}")]
    PeriodOverflow(i32),
}

/// Reconciliation-table defects. These stop the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("Duplicate measure '{measure}' for entity '{entity}' (parents {first_parent:?} and {second_parent:?})")]
    DuplicateMeasure {
        entity: String,
        measure: String,
        first_parent: Option<String>,
        second_parent: Option<String>,
    },

    #[error("'{measure}' for entity '{entity}' appears in both {first_section} and {second_section}")]
    SectionCollision {
        entity: String,
        measure: String,
        first_section: String,
        second_section: String,
    },

    #[error("Hierarchy cycle detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed lookup table {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Unknown source profile: {0}")]
    UnknownProfile(String),

    #[error("Section '{0}' is not declared")]
    UnknownSection(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Malformed fact table {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Source document failed: {0}")]
    Source(#[from] SourceError),

    #[error("Consistency violation: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
