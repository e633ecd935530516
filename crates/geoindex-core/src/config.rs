//! Configuration for the geoindex lifecycle workflows.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`GEOINDEX__INDEXER__<FIELD>`)
//! 2. Config file (`geoindex.toml`, `[indexer]` section)
//! 3. Defaults

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// How an index is laid out when written to disk.
///
/// Passed explicitly into every build and save so that no process-wide
/// serializer setting exists.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SerializationStrategy {
    /// Single-line JSON.
    #[default]
    Compact,
    /// Indented JSON, easier to diff by hand.
    Pretty,
}

/// How per-graph element counts are measured for the stats report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StatsStrategy {
    /// Read size and depth straight off the tree.
    #[default]
    Introspect,
    /// Count the matches of a range query over the whole SRS domain.
    DomainQuery,
}

impl std::str::FromStr for StatsStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "introspect" => Ok(Self::Introspect),
            "domain-query" | "domain_query" => Ok(Self::DomainQuery),
            _ => Err(format!(
                "Invalid stats strategy: {s}. Choose: introspect, domain-query"
            )),
        }
    }
}

/// Top-level indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexerConfig {
    /// Route every index write through the temp-file-and-move protocol.
    /// When false only `build --overwrite` is atomic.
    #[serde(default = "default_true")]
    pub atomic_writes: bool,

    /// On-disk layout of written index files.
    #[serde(default)]
    pub serialization: SerializationStrategy,

    /// Worker threads for per-graph recompute and stats (0 = CPU count).
    #[serde(default)]
    pub worker_threads: usize,

    /// Default measurement strategy for `stats`.
    #[serde(default)]
    pub stats_strategy: StatsStrategy,

    /// SRS used when `--srs` is not given, instead of the dataset's mode SRS.
    #[serde(default)]
    pub default_srs: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            atomic_writes: default_true(),
            serialization: SerializationStrategy::default(),
            worker_threads: 0,
            stats_strategy: StatsStrategy::default(),
            default_srs: None,
        }
    }
}

impl IndexerConfig {
    /// Load the `[indexer]` section from `<file_prefix>.{toml,json,yaml}` (optional)
    /// layered under `GEOINDEX__` environment variables.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("GEOINDEX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| IndexError::Config(e.to_string()))?;

        match cfg.get::<IndexerConfig>("indexer") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => {
                tracing::debug!(file_prefix, "No [indexer] config section, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(IndexError::Config(e.to_string())),
        }
    }

    /// Resolve `worker_threads`, mapping 0 to the available parallelism.
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }
}
