//! geoindex-lifecycle: building, replacing, and inspecting spatial index files.
//!
//! Coordinates the index store with an atomic file persister. Three workflows
//! are exposed through [`Lifecycle`]: build, replace (per-graph recompute),
//! and stats.

pub mod error;
pub mod persist;
pub mod render;
pub mod stats;
pub mod workflow;

pub use error::LifecycleError;
pub use persist::{AtomicPersister, PersistError};
pub use stats::{GraphStats, StatsReport, StatsReporter};
pub use workflow::{
    BuildRequest, BuildSummary, GraphChange, Lifecycle, Notice, ReplaceRequest, ReplaceSummary,
    StatsRequest, WorkflowOutcome,
};
