//! Error types for the geoindex-lifecycle crate.

use thiserror::Error;

use geoindex_core::IndexError;

use crate::persist::PersistError;

/// Every failure a workflow can end with.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Spatial index error: {0}")]
    Index(#[from] IndexError),

    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),
}

impl LifecycleError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Index(_) | Self::Persist(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
