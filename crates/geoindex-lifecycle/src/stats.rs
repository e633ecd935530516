//! Per-graph statistics over a loaded index.

use std::collections::BTreeSet;

use geoindex_core::{Envelope, StatsStrategy, DEFAULT_GRAPH_LABEL};
use geoindex_store::{GraphTree, SpatialIndex};
use rayon::prelude::*;

/// One report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStats {
    /// Graph identifier, or `DEFAULT` for the default graph.
    pub graph: String,
    pub size: usize,
    pub depth: Option<usize>,
}

/// Rows sorted by graph identifier, `DEFAULT` included in ordinary string order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsReport {
    pub rows: Vec<GraphStats>,
}

impl StatsReport {
    pub fn rows(&self) -> &[GraphStats] {
        &self.rows
    }

    pub fn get(&self, graph: &str) -> Option<&GraphStats> {
        self.rows.iter().find(|row| row.graph == graph)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.rows.iter().map(|row| row.size).sum()
    }
}

/// Measures every tree of an index.
///
/// Trees are read-only during collection, so rows are measured in parallel
/// on the current rayon pool.
#[derive(Debug, Clone, Default)]
pub struct StatsReporter {
    strategy: StatsStrategy,
    include_depth: bool,
    filter: Option<BTreeSet<String>>,
}

impl StatsReporter {
    pub fn new(strategy: StatsStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_depth(mut self, include_depth: bool) -> Self {
        self.include_depth = include_depth;
        self
    }

    /// Only report the given graphs (`DEFAULT` selects the default graph).
    /// An empty filter reports everything.
    pub fn with_filter<I, S>(mut self, graphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let graphs: BTreeSet<String> = graphs.into_iter().map(Into::into).collect();
        self.filter = (!graphs.is_empty()).then_some(graphs);
        self
    }

    pub fn collect(&self, index: &SpatialIndex) -> StatsReport {
        let targets: Vec<(String, &GraphTree)> =
            std::iter::once((DEFAULT_GRAPH_LABEL.to_string(), index.default_graph_tree()))
                .chain(
                    index
                        .named_graph_trees()
                        .iter()
                        .map(|(graph, tree)| (graph.to_string(), tree)),
                )
                .filter(|(graph, _)| self.includes(graph))
                .collect();

        let domain = &index.srs().domain;
        let mut rows: Vec<GraphStats> = targets
            .par_iter()
            .map(|(graph, tree)| GraphStats {
                graph: graph.clone(),
                size: self.measure_size(tree, domain),
                depth: self.include_depth.then(|| tree.depth()),
            })
            .collect();

        // stable: a named graph literally called DEFAULT stays after the default graph
        rows.sort_by(|a, b| a.graph.cmp(&b.graph));

        tracing::debug!(rows = rows.len(), strategy = ?self.strategy, "Collected index statistics");
        StatsReport { rows }
    }

    fn includes(&self, graph: &str) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.contains(graph))
    }

    fn measure_size(&self, tree: &GraphTree, domain: &Envelope) -> usize {
        match self.strategy {
            StatsStrategy::Introspect => tree.size(),
            StatsStrategy::DomainQuery => tree.query(domain).len(),
        }
    }
}
