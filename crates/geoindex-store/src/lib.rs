//! geoindex-store: the spatial index collaborator.
//!
//! Reads geometries out of a quad dataset, builds one R-tree per named graph
//! (plus one for the default graph), and reads/writes the resulting index
//! file. Every tree in an index is built against the same SRS.

pub mod codec;
pub mod dataset;
pub mod index;
pub mod nquads;
pub mod tree;
pub mod wkt;

pub use dataset::{Dataset, GeometryRecord, GraphScope, MemoryDataset};
pub use index::{BuildOptions, SpatialIndex};
pub use nquads::QuadFileDataset;
pub use tree::{GraphTree, TreeEntry};
