//! The spatial index: one tree for the default graph plus one per named graph.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geoindex_core::{GraphName, IndexError, Result, SerializationStrategy, SrsInfo};

use crate::dataset::{Dataset, GraphScope};
use crate::tree::{GraphTree, TreeEntry};

/// Parameters for [`SpatialIndex::build`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub srs_uri: String,
    /// One tree per named graph (true) or a single combined tree (false).
    pub index_per_graph: bool,
    /// Named graphs to index. Empty means every graph in the dataset.
    pub graphs: Vec<GraphName>,
    pub serialization: SerializationStrategy,
}

impl BuildOptions {
    pub fn new(srs_uri: impl Into<String>) -> Self {
        Self {
            srs_uri: srs_uri.into(),
            index_per_graph: true,
            graphs: Vec::new(),
            serialization: SerializationStrategy::default(),
        }
    }
}

/// In-memory spatial index over a dataset's graphs.
///
/// All trees share the index SRS; [`SpatialIndex::set_graph_tree`] rejects
/// trees built under any other SRS.
#[derive(Debug)]
pub struct SpatialIndex {
    pub(crate) srs: SrsInfo,
    pub(crate) serialization: SerializationStrategy,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) default_tree: GraphTree,
    pub(crate) named_trees: BTreeMap<GraphName, GraphTree>,
}

impl SpatialIndex {
    /// Build a fresh index from the dataset.
    pub fn build(dataset: &dyn Dataset, options: &BuildOptions) -> Result<Self> {
        let srs = SrsInfo::lookup(&options.srs_uri)?;

        let (default_tree, named_trees) = if options.index_per_graph {
            let default_tree = build_tree(dataset, &srs, GraphScope::Default)?;
            let graphs = if options.graphs.is_empty() {
                dataset.graph_names()?
            } else {
                options.graphs.clone()
            };

            let mut named_trees = BTreeMap::new();
            for graph in graphs {
                let tree = Self::build_graph_tree(dataset, &srs, &graph)?;
                named_trees.insert(graph, tree);
            }
            (default_tree, named_trees)
        } else if options.graphs.is_empty() {
            (build_tree(dataset, &srs, GraphScope::Union)?, BTreeMap::new())
        } else {
            let mut records = dataset.geometries(GraphScope::Default)?;
            for graph in &options.graphs {
                records.extend(dataset.geometries(GraphScope::Named(graph))?);
            }
            (tree_from_records(&srs, records), BTreeMap::new())
        };

        let now = Utc::now();
        let index = Self {
            srs,
            serialization: options.serialization,
            created_at: now,
            updated_at: now,
            default_tree,
            named_trees,
        };

        tracing::info!(
            srs = %index.srs.uri,
            per_graph = options.index_per_graph,
            graphs = index.named_trees.len(),
            elements = index.element_count(),
            "Spatial index built"
        );
        Ok(index)
    }

    /// Build the tree of a single named graph. A graph unknown to the
    /// dataset yields an empty tree.
    pub fn build_graph_tree(
        dataset: &dyn Dataset,
        srs: &SrsInfo,
        graph: &GraphName,
    ) -> Result<GraphTree> {
        build_tree(dataset, srs, GraphScope::Named(graph))
    }

    /// Recompute the trees of the given named graphs from the current dataset,
    /// one after another. Graphs missing from the index are added.
    pub fn recompute_graphs(&mut self, dataset: &dyn Dataset, graphs: &[GraphName]) -> Result<()> {
        for graph in graphs {
            let tree = Self::build_graph_tree(dataset, &self.srs, graph)?;
            self.set_graph_tree(graph.clone(), tree)?;
        }
        Ok(())
    }

    /// Install a recomputed tree for a named graph, returning the previous one.
    pub fn set_graph_tree(&mut self, graph: GraphName, tree: GraphTree) -> Result<Option<GraphTree>> {
        if tree.srs() != self.srs.uri {
            return Err(IndexError::SrsMismatch {
                index: self.srs.uri.clone(),
                tree: tree.srs().to_string(),
            });
        }

        tracing::debug!(graph = %graph, size = tree.size(), "Graph tree replaced");
        self.updated_at = Utc::now();
        Ok(self.named_trees.insert(graph, tree))
    }

    pub fn srs(&self) -> &SrsInfo {
        &self.srs
    }

    pub fn serialization(&self) -> SerializationStrategy {
        self.serialization
    }

    /// Change how the index is laid out the next time it is written.
    pub fn set_serialization(&mut self, serialization: SerializationStrategy) {
        self.serialization = serialization;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn default_graph_tree(&self) -> &GraphTree {
        &self.default_tree
    }

    pub fn named_graph_trees(&self) -> &BTreeMap<GraphName, GraphTree> {
        &self.named_trees
    }

    pub fn graph_tree(&self, graph: &GraphName) -> Option<&GraphTree> {
        self.named_trees.get(graph)
    }

    /// Total number of indexed geometries across all trees.
    pub fn element_count(&self) -> usize {
        self.default_tree.size() + self.named_trees.values().map(GraphTree::size).sum::<usize>()
    }
}

fn build_tree(dataset: &dyn Dataset, srs: &SrsInfo, scope: GraphScope<'_>) -> Result<GraphTree> {
    let records = dataset.geometries(scope)?;
    Ok(tree_from_records(srs, records))
}

fn tree_from_records(srs: &SrsInfo, records: Vec<crate::dataset::GeometryRecord>) -> GraphTree {
    let total = records.len();
    let entries: Vec<TreeEntry> = records
        .into_iter()
        .filter(|r| r.srs.trim() == srs.uri)
        .map(|r| TreeEntry::new(r.feature, r.envelope))
        .collect();

    let skipped = total - entries.len();
    if skipped > 0 {
        tracing::warn!(srs = %srs.uri, skipped, "Skipped geometries in a different SRS");
    }

    GraphTree::build(srs.uri.clone(), entries)
}
