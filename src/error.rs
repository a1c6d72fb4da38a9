//! Error types for Pointflat.
//!
//! This module provides a unified error handling approach using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Pointflat operations.
pub type Result<T> = std::result::Result<T, PointFlatError>;

/// Errors that can occur in Pointflat.
#[derive(Debug, Error)]
pub enum PointFlatError {
    /// Failed to open a file.
    #[error("Failed to open file: {path}")]
    FileOpen {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read NetCDF file.
    #[error("NetCDF error: {0}")]
    NetCDF(String),

    /// A variable required by a table layout does not exist.
    #[error("Variable not found: {name}")]
    MissingVariable {
        /// Variable name.
        name: String,
    },

    /// A dimension required by a table layout does not exist.
    #[error("Dimension not found: {name}")]
    MissingDimension {
        /// Dimension name.
        name: String,
    },

    /// A row has no member of the given name.
    #[error("Member '{member}' not found in {table}")]
    MissingMember {
        /// Member name.
        member: String,
        /// Table or structure the member was looked up in.
        table: String,
    },

    /// A record number past the end of a structure.
    #[error("Record {recno} out of range for {structure} (length {len})")]
    RecordOutOfRange {
        /// Structure name.
        structure: String,
        /// Requested record number.
        recno: usize,
        /// Number of records in the structure.
        len: usize,
    },

    /// A table configuration that cannot be realized.
    #[error("Invalid table config: {0}")]
    InvalidConfig(String),

    /// Feature type could not be inferred for a nested table.
    #[error("Cannot infer feature type for a nested table with {levels} levels")]
    UnknownFeatureType {
        /// Nesting depth of the table chain.
        levels: usize,
    },

    /// Value could not be coerced to the requested type.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PointFlatError {
    /// Create a FileOpen error.
    pub fn file_open(path: PathBuf, source: std::io::Error) -> Self {
        Self::FileOpen { path, source }
    }

    /// Create a MissingVariable error.
    pub fn missing_variable(name: impl Into<String>) -> Self {
        Self::MissingVariable { name: name.into() }
    }

    /// Create a MissingDimension error.
    pub fn missing_dimension(name: impl Into<String>) -> Self {
        Self::MissingDimension { name: name.into() }
    }

    /// Create a MissingMember error.
    pub fn missing_member(member: impl Into<String>, table: impl Into<String>) -> Self {
        Self::MissingMember {
            member: member.into(),
            table: table.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<netcdf::Error> for PointFlatError {
    fn from(err: netcdf::Error) -> Self {
        Self::NetCDF(err.to_string())
    }
}
