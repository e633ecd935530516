use thiserror::Error;

/// Errors raised by the spatial index collaborator: building, loading,
/// saving, or recomputing an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Unsupported SRS URI: {uri}")]
    UnsupportedSrs { uri: String },

    #[error("SRS mismatch: index uses {index}, tree was built with {tree}")]
    SrsMismatch { index: String, tree: String },

    #[error("Spatial index file not found: {path}")]
    NotFound { path: String },

    #[error("Spatial index file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Incompatible spatial index format version {found} (supported: {supported})")]
    IncompatibleFormat { found: u64, supported: u32 },

    #[error("Feature {feature} has a non-finite envelope")]
    NonFiniteEnvelope { feature: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
