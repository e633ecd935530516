//! The build, replace, and stats workflows.
//!
//! Each workflow runs to completion within one call. Failures come back as
//! [`LifecycleError`]; a missing index file for replace or stats is not a
//! failure but a [`WorkflowOutcome::Skipped`] plus a [`Notice`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use geoindex_core::{GraphName, IndexError, IndexerConfig, StatsStrategy};
use geoindex_store::{BuildOptions, Dataset, GraphTree, SpatialIndex};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::Result;
use crate::persist::AtomicPersister;
use crate::stats::{StatsReport, StatsReporter};

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub index_path: PathBuf,
    /// SRS to index under; falls back to the configured default, then to the
    /// dataset's mode SRS.
    pub srs: Option<String>,
    pub index_per_graph: bool,
    pub overwrite: bool,
    /// Named graphs to index. Empty means all of them.
    pub graphs: Vec<String>,
}

impl BuildRequest {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            srs: None,
            index_per_graph: true,
            overwrite: false,
            graphs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    pub index_path: PathBuf,
    pub graphs: Vec<String>,
}

impl ReplaceRequest {
    pub fn new<I, S>(index_path: impl Into<PathBuf>, graphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index_path: index_path.into(),
            graphs: graphs.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsRequest {
    pub index_path: PathBuf,
    /// Graphs to report (`DEFAULT` for the default graph). Empty means all.
    pub graphs: Vec<String>,
    pub include_depth: bool,
    /// Overrides the configured strategy.
    pub strategy: Option<StatsStrategy>,
}

impl StatsRequest {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            graphs: Vec::new(),
            include_depth: false,
            strategy: None,
        }
    }
}

/// Result of a workflow that ran without failing.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome<T> {
    Completed(T),
    /// Nothing to do, e.g. the index file does not exist yet.
    Skipped { reason: String },
}

impl<T> WorkflowOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Operator-facing messages emitted while a workflow runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// SRS the index is built under, and whether it was derived from the dataset.
    SrsSelected { uri: String, derived: bool },
    IndexExists(PathBuf),
    IndexMissing(PathBuf),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SrsSelected { uri, derived: true } => write!(f, "Discovered mode SRS: {uri}"),
            Self::SrsSelected { uri, derived: false } => write!(f, "Using SRS: {uri}"),
            Self::IndexExists(_) => write!(f, "Spatial index already exists."),
            Self::IndexMissing(_) => write!(f, "Spatial index does not exist."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub srs_uri: String,
    pub srs_derived: bool,
    /// An index file existed at the target path before the build.
    pub replaced_existing: bool,
    pub atomic: bool,
    pub graph_count: usize,
    pub element_count: usize,
}

/// How one named graph changed during a replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphChange {
    pub graph: GraphName,
    /// `None` when the graph was not in the index before.
    pub previous_size: Option<usize>,
    pub new_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub changes: Vec<GraphChange>,
    pub atomic: bool,
}

type Notifier = Box<dyn Fn(&Notice) + Send + Sync>;

fn log_notice(notice: &Notice) {
    tracing::info!("{notice}");
}

/// Runs the index workflows against one dataset.
pub struct Lifecycle<D: Dataset> {
    dataset: D,
    config: IndexerConfig,
    persister: AtomicPersister,
    pool: ThreadPool,
    notifier: Notifier,
}

impl<D: Dataset> Lifecycle<D> {
    pub fn new(dataset: D, config: IndexerConfig) -> Result<Self> {
        let threads = config.effective_worker_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("geoindex-worker-{i}"))
            .build()
            .map_err(|e| IndexError::Config(format!("Failed to start worker pool: {e}")))?;
        tracing::debug!(threads, "Worker pool started");

        Ok(Self {
            dataset,
            config,
            persister: AtomicPersister::new(),
            pool,
            notifier: Box::new(log_notice),
        })
    }

    /// Route notices somewhere other than the log.
    pub fn with_notifier(mut self, notifier: impl Fn(&Notice) + Send + Sync + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut D {
        &mut self.dataset
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Build a new index from the dataset and write it to the target path.
    ///
    /// An existing file is replaced either way; with `overwrite` (or
    /// `atomic_writes`) the replacement goes through the atomic persister.
    pub fn build(&self, request: &BuildRequest) -> Result<WorkflowOutcome<BuildSummary>> {
        let (srs_uri, srs_derived) = match request
            .srs
            .as_deref()
            .or(self.config.default_srs.as_deref())
        {
            Some(uri) => (uri.trim().to_string(), false),
            None => (self.dataset.find_mode_srs()?, true),
        };
        self.notify(&Notice::SrsSelected {
            uri: srs_uri.clone(),
            derived: srs_derived,
        });

        let replaced_existing = request.index_path.exists();
        if replaced_existing {
            self.notify(&Notice::IndexExists(request.index_path.clone()));
        }

        let options = BuildOptions {
            srs_uri: srs_uri.clone(),
            index_per_graph: request.index_per_graph,
            graphs: graph_names(&request.graphs),
            serialization: self.config.serialization,
        };
        let index = SpatialIndex::build(&self.dataset, &options)?;

        let atomic = request.overwrite || self.config.atomic_writes;
        self.write(&request.index_path, &index, atomic)?;

        Ok(WorkflowOutcome::Completed(BuildSummary {
            srs_uri,
            srs_derived,
            replaced_existing,
            atomic,
            graph_count: index.named_graph_trees().len(),
            element_count: index.element_count(),
        }))
    }

    /// Recompute the requested named graphs and write the whole index back.
    ///
    /// Graphs are recomputed in parallel; nothing is written until all of
    /// them have finished. The default graph and unrequested graphs keep
    /// their trees.
    pub fn replace(&self, request: &ReplaceRequest) -> Result<WorkflowOutcome<ReplaceSummary>> {
        let Some(mut index) = SpatialIndex::load_if_exists(&request.index_path)? else {
            self.notify(&Notice::IndexMissing(request.index_path.clone()));
            return Ok(WorkflowOutcome::Skipped {
                reason: "spatial index does not exist".to_string(),
            });
        };

        let graphs: Vec<GraphName> = graph_names(&request.graphs)
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if graphs.is_empty() {
            tracing::warn!(path = %request.index_path.display(), "No graphs to replace");
            return Ok(WorkflowOutcome::Skipped {
                reason: "no graphs requested".to_string(),
            });
        }

        let srs = index.srs().clone();
        let dataset = &self.dataset;
        let trees: Vec<(GraphName, GraphTree)> = self.pool.install(|| {
            graphs
                .par_iter()
                .map(|graph| {
                    SpatialIndex::build_graph_tree(dataset, &srs, graph)
                        .map(|tree| (graph.clone(), tree))
                })
                .collect::<geoindex_core::Result<Vec<_>>>()
        })?;

        let mut changes = Vec::with_capacity(trees.len());
        for (graph, tree) in trees {
            let new_size = tree.size();
            let previous = index.set_graph_tree(graph.clone(), tree)?;
            let previous_size = previous.as_ref().map(GraphTree::size);
            tracing::info!(graph = %graph, previous = ?previous_size, size = new_size, "Recomputed graph tree");
            changes.push(GraphChange {
                graph,
                previous_size,
                new_size,
            });
        }

        index.set_serialization(self.config.serialization);
        let atomic = self.config.atomic_writes;
        self.write(&request.index_path, &index, atomic)?;

        Ok(WorkflowOutcome::Completed(ReplaceSummary { changes, atomic }))
    }

    /// Load the index and measure every (or every selected) graph tree.
    pub fn stats(&self, request: &StatsRequest) -> Result<WorkflowOutcome<StatsReport>> {
        let Some(index) = SpatialIndex::load_if_exists(&request.index_path)? else {
            self.notify(&Notice::IndexMissing(request.index_path.clone()));
            return Ok(WorkflowOutcome::Skipped {
                reason: "spatial index does not exist".to_string(),
            });
        };

        let reporter = StatsReporter::new(request.strategy.unwrap_or(self.config.stats_strategy))
            .with_depth(request.include_depth)
            .with_filter(
                request
                    .graphs
                    .iter()
                    .map(|g| g.trim())
                    .filter(|g| !g.is_empty()),
            );
        let report = self.pool.install(|| reporter.collect(&index));

        Ok(WorkflowOutcome::Completed(report))
    }

    fn write(&self, path: &Path, index: &SpatialIndex, atomic: bool) -> Result<()> {
        if atomic {
            self.persister.replace(path, index)?;
        } else {
            tracing::debug!(path = %path.display(), "Writing index directly");
            index.save(path)?;
        }
        Ok(())
    }

    fn notify(&self, notice: &Notice) {
        (self.notifier)(notice);
    }
}

fn graph_names(graphs: &[String]) -> Vec<GraphName> {
    graphs
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .map(GraphName::from)
        .collect()
}
