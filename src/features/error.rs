use std::path::PathBuf;

use thiserror::Error;

use crate::header::HeaderError;

/// Errors raised by feature definitions, feature vectors, and feature files.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The schema text or binary definition is malformed.
    #[error("Malformed feature definition: {0}")]
    Format(String),
    /// No feature with this name exists in the definition.
    #[error("Unknown feature '{0}'")]
    UnknownFeature(String),
    /// The string is not one of the feature's declared values.
    #[error("Value '{value}' is not declared for feature '{feature}'")]
    UnknownValue {
        /// Feature being looked up.
        feature: String,
        /// Offending value string.
        value: String,
    },
    /// A discrete code does not index the feature's value list.
    #[error("Code {code} is outside the {count} values of feature '{feature}'")]
    InvalidCode {
        /// Feature whose value list was indexed.
        feature: String,
        /// Offending code.
        code: i32,
        /// Number of declared values.
        count: usize,
    },
    /// A text line or value array does not match the definition's shape.
    #[error("Expected {expected} feature values, found {found}")]
    FieldCountMismatch {
        /// Count declared by the definition.
        expected: usize,
        /// Count supplied by the caller.
        found: usize,
    },
    /// A binary record ended early.
    #[error("Truncated record while reading {0}")]
    TruncatedRecord(String),
    /// A feature index is outside the requested section.
    #[error("Feature index {index} is not a {section} feature (valid range {start}..{end})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Section that was addressed.
        section: &'static str,
        /// First valid index of the section.
        start: usize,
        /// One past the last valid index.
        end: usize,
    },
    /// Vectors must be written in unit-index order.
    #[error("Expected vector for unit {expected}, got unit {found}")]
    UnitOrder {
        /// Next unit index the file expects.
        expected: usize,
        /// Unit index of the offered vector.
        found: usize,
    },
    /// A unit index is outside the vectors stored in a feature file.
    #[error("Unit {index} is outside the {count} vectors of this file")]
    UnitOutOfRange {
        /// Requested unit index.
        index: usize,
        /// Number of stored vectors.
        count: usize,
    },
    /// Feature file header is invalid.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// Failed to open or create a feature file.
    #[error("Failed to open {path}: {source}")]
    Open {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to move a finished feature file into place.
    #[error("Failed to persist {path}: {source}")]
    Persist {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Stream-level I/O failure.
    #[error("Feature I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FeatureError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        FeatureError::Format(message.into())
    }

    /// Map a read failure, turning short reads into [`FeatureError::TruncatedRecord`].
    pub(crate) fn from_read(err: std::io::Error, what: impl Into<String>) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => FeatureError::TruncatedRecord(what.into()),
            std::io::ErrorKind::InvalidData => FeatureError::Format(format!("{}: {err}", what.into())),
            _ => FeatureError::Io(err),
        }
    }
}
