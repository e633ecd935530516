//! Per-graph spatial tree.

use geoindex_core::Envelope;
use rstar::{RTree, RTreeNode, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

/// One indexed geometry: the resource and its bounding envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub feature: String,
    pub envelope: Envelope,
}

impl TreeEntry {
    pub fn new(feature: impl Into<String>, envelope: Envelope) -> Self {
        Self {
            feature: feature.into(),
            envelope,
        }
    }
}

impl RTreeObject for TreeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        to_aabb(&self.envelope)
    }
}

fn to_aabb(env: &Envelope) -> AABB<[f64; 2]> {
    AABB::from_corners([env.min_x, env.min_y], [env.max_x, env.max_y])
}

/// R-tree over the geometries of a single graph, tagged with its SRS.
///
/// Trees are bulk loaded and never mutated; recomputing a graph replaces
/// its tree wholesale.
pub struct GraphTree {
    srs: String,
    tree: RTree<TreeEntry>,
}

impl std::fmt::Debug for GraphTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphTree")
            .field("srs", &self.srs)
            .field("size", &self.size())
            .finish()
    }
}

impl GraphTree {
    /// Bulk load a tree. Entries are sorted first so that the tree shape
    /// does not depend on dataset iteration order.
    pub fn build(srs: impl Into<String>, mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(compare_entries);
        Self {
            srs: srs.into(),
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn empty(srs: impl Into<String>) -> Self {
        Self::build(srs, Vec::new())
    }

    pub fn srs(&self) -> &str {
        &self.srs
    }

    /// Number of indexed geometries.
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Height of the tree, counting the root level. An empty tree has depth 1.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut node = self.tree.root();
        // bulk-loaded R-trees are balanced, so any root-to-leaf path has full height
        while let Some(child) = node.children().iter().find_map(|c| match c {
            RTreeNode::Parent(parent) => Some(parent),
            RTreeNode::Leaf(_) => None,
        }) {
            depth += 1;
            node = child;
        }
        depth
    }

    /// Entries whose envelope intersects `envelope`.
    pub fn query(&self, envelope: &Envelope) -> Vec<&TreeEntry> {
        self.tree
            .locate_in_envelope_intersecting(&to_aabb(envelope))
            .collect()
    }

    /// All entries in a stable order.
    pub fn entries(&self) -> Vec<&TreeEntry> {
        let mut entries: Vec<&TreeEntry> = self.tree.iter().collect();
        entries.sort_by(|a, b| compare_entries(a, b));
        entries
    }
}

fn compare_entries(a: &TreeEntry, b: &TreeEntry) -> std::cmp::Ordering {
    a.feature
        .cmp(&b.feature)
        .then_with(|| a.envelope.min_x.total_cmp(&b.envelope.min_x))
        .then_with(|| a.envelope.min_y.total_cmp(&b.envelope.min_y))
        .then_with(|| a.envelope.max_x.total_cmp(&b.envelope.max_x))
        .then_with(|| a.envelope.max_y.total_cmp(&b.envelope.max_y))
}
