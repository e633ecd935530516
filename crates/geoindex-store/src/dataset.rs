//! Dataset access: the quad store the index is built from.

use std::collections::BTreeMap;

use geoindex_core::{Envelope, GraphName, Result, CRS84_URI};

/// A geometry found in the dataset, reduced to what the index needs.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    /// IRI (or blank node label) of the geometry resource.
    pub feature: String,
    /// SRS URI the coordinates are expressed in.
    pub srs: String,
    pub envelope: Envelope,
}

impl GeometryRecord {
    pub fn new(feature: impl Into<String>, srs: impl Into<String>, envelope: Envelope) -> Self {
        Self {
            feature: feature.into(),
            srs: srs.into(),
            envelope,
        }
    }

    /// A CRS84 point geometry.
    pub fn point(feature: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self::new(feature, CRS84_URI, Envelope::point(lon, lat))
    }
}

/// Which part of the dataset to read geometries from.
#[derive(Debug, Clone, Copy)]
pub enum GraphScope<'a> {
    /// The unnamed default graph only.
    Default,
    /// A single named graph.
    Named(&'a GraphName),
    /// Default graph plus every named graph.
    Union,
}

/// Read access to a quad dataset.
///
/// Implementations must be shareable across worker threads: per-graph
/// recomputation reads the dataset concurrently.
pub trait Dataset: Send + Sync {
    /// All named graphs in the dataset, including ones without geometries.
    fn graph_names(&self) -> Result<Vec<GraphName>>;

    /// Geometries in the given scope.
    fn geometries(&self, scope: GraphScope<'_>) -> Result<Vec<GeometryRecord>>;

    /// The most frequently used SRS across all geometries.
    ///
    /// Ties go to the lexicographically smallest URI; an empty dataset
    /// yields CRS84.
    fn find_mode_srs(&self) -> Result<String> {
        let records = self.geometries(GraphScope::Union)?;
        Ok(mode_srs(&records))
    }
}

pub(crate) fn mode_srs(records: &[GeometryRecord]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.srs.as_str()).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(uri, _)| uri.to_string())
        .unwrap_or_else(|| CRS84_URI.to_string())
}

/// In-memory dataset.
///
/// Also the backing store of [`crate::QuadFileDataset`] once its files are parsed.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    default_graph: Vec<GeometryRecord>,
    named_graphs: BTreeMap<GraphName, Vec<GeometryRecord>>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named graph, keeping any geometries it already has.
    pub fn add_graph(&mut self, graph: impl Into<GraphName>) {
        self.named_graphs.entry(graph.into()).or_default();
    }

    /// Add a geometry to the default graph (`None`) or a named graph.
    pub fn insert(&mut self, graph: Option<&GraphName>, record: GeometryRecord) {
        match graph {
            Some(name) => self
                .named_graphs
                .entry(name.clone())
                .or_default()
                .push(record),
            None => self.default_graph.push(record),
        }
    }

    /// Drop all geometries of a named graph while keeping the graph itself.
    /// Returns how many geometries were removed.
    pub fn clear_graph(&mut self, graph: &GraphName) -> usize {
        self.named_graphs
            .get_mut(graph)
            .map(|records| std::mem::take(records).len())
            .unwrap_or(0)
    }

    /// Total number of geometries across all graphs.
    pub fn geometry_count(&self) -> usize {
        self.default_graph.len() + self.named_graphs.values().map(Vec::len).sum::<usize>()
    }
}

impl Dataset for MemoryDataset {
    fn graph_names(&self) -> Result<Vec<GraphName>> {
        Ok(self.named_graphs.keys().cloned().collect())
    }

    fn geometries(&self, scope: GraphScope<'_>) -> Result<Vec<GeometryRecord>> {
        let records = match scope {
            GraphScope::Default => self.default_graph.clone(),
            GraphScope::Named(name) => self.named_graphs.get(name).cloned().unwrap_or_default(),
            GraphScope::Union => self
                .default_graph
                .iter()
                .chain(self.named_graphs.values().flatten())
                .cloned()
                .collect(),
        };
        Ok(records)
    }
}
