//! Splitting node lists by leaf group

use crate::graph::NodeGroupGraph;
use std::collections::BTreeMap;

/// Partition `nodes` into one bucket per leaf group they belong to
///
/// Buckets are ordered by leaf group index and keep the input order of their
/// nodes. Nodes that are not part of any leaf group are skipped.
pub fn split_into_leaf_groups(graph: &NodeGroupGraph, nodes: &[u16]) -> Vec<Vec<u16>> {
    let mut buckets: BTreeMap<u16, Vec<u16>> = BTreeMap::new();
    for &node in nodes {
        match graph.leaf_of(node) {
            Some(leaf) => buckets
                .entry(graph.group(leaf).index())
                .or_default()
                .push(node),
            None => tracing::warn!(node, "node is not part of any leaf group, skipping"),
        }
    }
    buckets.into_values().collect()
}
