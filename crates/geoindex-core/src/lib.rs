//! geoindex-core: Shared types, configuration, and error handling for geoindex.
//!
//! This crate provides the foundational pieces used by the store and lifecycle crates:
//! - Graph identifiers, envelopes, and spatial reference system (SRS) metadata
//! - The `IndexError` kind raised by the spatial index collaborator
//! - Indexer configuration (file + environment layering)

pub mod config;
pub mod error;
pub mod types;

pub use config::{IndexerConfig, SerializationStrategy, StatsStrategy};
pub use error::{IndexError, Result};
pub use types::{Envelope, GraphName, SrsInfo, CRS84_URI, DEFAULT_GRAPH_LABEL};
