//! Error types for loading and analysing the review store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an analytical pass.
///
/// Degenerate inputs (single-date entities, zero denominators, short
/// rankings) are not errors; they are encoded in the result values.
#[derive(Error, Debug)]
pub enum InsightsError {
    /// The store file does not exist
    #[error("Review store not found at {0:?}")]
    StoreNotFound(PathBuf),

    /// SQLite error (open, catalogue query, table scan)
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A required table is absent from the catalogue
    #[error("Missing table: {0}")]
    MissingTable(String),

    /// A required column is absent from a table
    #[error("Missing column {column} in table {table}")]
    MissingColumn { table: String, column: String },

    /// A cell holds a value of the wrong type
    #[error("Invalid value in {table}.{column} at row {row}: expected {expected}")]
    InvalidValue {
        table: String,
        column: String,
        row: usize,
        expected: &'static str,
    },

    /// A date cell could not be parsed as a calendar date
    #[error("Invalid date {value:?} in table {table} at row {row}")]
    InvalidDate {
        table: String,
        row: usize,
        value: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON rendering error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for review analytics.
pub type Result<T> = std::result::Result<T, InsightsError>;
