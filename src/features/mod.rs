//! Feature schemas, feature vectors, and feature files.

/// Acoustic feature extension of an existing schema.
pub mod acoustic;
mod binary;
mod definition;
mod error;
/// Feature file reader and writer.
pub mod file;
mod text;
mod vector;

pub use definition::{
    EDGE_END, EDGE_FEATURE, EDGE_START, Edge, FeatureDefinition, FeatureKind, FeatureSlot,
    NO_WEIGHT_FUNCTION, NULL_VALUE,
};
pub use error::FeatureError;
pub use file::{FeatureFileReader, FeatureFileWriter, write_feature_file};
pub use text::{CONTINUOUS_MARKER, LINEAR_WEIGHT_FUNCTION};
pub use vector::FeatureVector;
