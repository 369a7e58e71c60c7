//! Node selection within a leaf group
//!
//! Rendezvous (HRW) ranking: every node in the leaf gets a weighted score
//! from its own draw, nodes are ranked by score, nodes whose state is not
//! allowed are dropped and the top K survivors win. Because each node's
//! score is independent of the others, taking a node out only shifts the
//! nodes ranked below it up by one place.

use crate::graph::{GroupId, NodeGroupGraph};
use crate::seed::{Draw, SeedContext};
use idealstate_common::{ClusterSnapshot, NodeType, StateSet};

/// A selected node together with the score it won with
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredNode {
    /// Node index
    pub index: u16,
    /// Weighted score, higher ranks first
    pub score: f64,
}

impl From<Draw<()>> for ScoredNode {
    fn from(draw: Draw<()>) -> Self {
        Self {
            index: draw.index,
            score: draw.score,
        }
    }
}

/// Rank every node of `leaf`, best first, regardless of state
pub fn rank_nodes(
    graph: &NodeGroupGraph,
    leaf: GroupId,
    key: u64,
    node_type: NodeType,
) -> Vec<ScoredNode> {
    let group = graph.group(leaf);
    let context = SeedContext::from(node_type);
    let mut draws: Vec<Draw<()>> = group
        .nodes()
        .iter()
        .map(|node| Draw::new((), node.index, node.capacity, key, context, group.path()))
        .collect();
    draws.sort_by(Draw::rank_cmp);
    draws.into_iter().map(ScoredNode::from).collect()
}

/// Select up to `count` nodes of `leaf` whose state is in `states`
///
/// Returns fewer than `count` nodes when the leaf does not have enough
/// eligible nodes.
pub fn select_nodes<S>(
    graph: &NodeGroupGraph,
    leaf: GroupId,
    key: u64,
    node_type: NodeType,
    snapshot: &S,
    states: StateSet,
    count: usize,
) -> Vec<ScoredNode>
where
    S: ClusterSnapshot + ?Sized,
{
    let selected: Vec<ScoredNode> = rank_nodes(graph, leaf, key, node_type)
        .into_iter()
        .filter(|node| states.contains(snapshot.node_state(node_type, node.index)))
        .take(count)
        .collect();

    tracing::trace!(
        leaf = graph.group(leaf).index(),
        requested = count,
        selected = selected.len(),
        "selected nodes in leaf group"
    );
    selected
}

/// Best eligible node of `leaf`
pub fn select_best_node<S>(
    graph: &NodeGroupGraph,
    leaf: GroupId,
    key: u64,
    node_type: NodeType,
    snapshot: &S,
    states: StateSet,
) -> Option<ScoredNode>
where
    S: ClusterSnapshot + ?Sized,
{
    select_nodes(graph, leaf, key, node_type, snapshot, states, 1)
        .into_iter()
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use idealstate_common::{ClusterState, DistributionConfig, GroupConfig, NodeConfig, NodeState};

    fn flat_graph() -> NodeGroupGraph {
        NodeGroupGraph::from_config(&DistributionConfig::flat(2, 10)).unwrap()
    }

    fn indices(nodes: &[ScoredNode]) -> Vec<u16> {
        nodes.iter().map(|n| n.index).collect()
    }

    #[test]
    fn test_rank_flat_storage() {
        let graph = flat_graph();
        let ranking = rank_nodes(&graph, graph.root(), 1, NodeType::Storage);
        assert_eq!(indices(&ranking), vec![8, 6, 5, 9, 4, 2, 0, 1, 3, 7]);
        assert!(ranking.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_rank_flat_distributor() {
        let graph = flat_graph();
        let ranking = rank_nodes(&graph, graph.root(), 1, NodeType::Distributor);
        assert_eq!(indices(&ranking), vec![3, 4, 7, 9, 1, 5, 0, 8, 6, 2]);
    }

    #[test]
    fn test_select_skips_disallowed_states() {
        let graph = flat_graph();
        let state = ClusterState::new(10, 10)
            .with_node_state(NodeType::Storage, 8, NodeState::Down)
            .with_node_state(NodeType::Storage, 5, NodeState::Retired);

        let nodes = select_nodes(
            &graph,
            graph.root(),
            1,
            NodeType::Storage,
            &state,
            StateSet::default(),
            3,
        );
        assert_eq!(indices(&nodes), vec![6, 9, 4]);
    }

    #[test]
    fn test_select_returns_fewer_when_scarce() {
        let graph = flat_graph();
        let mut state = ClusterState::new(10, 10);
        for node in 0..10 {
            if node != 2 && node != 7 {
                state.set_node_state(NodeType::Storage, node, NodeState::Down);
            }
        }
        let nodes = select_nodes(
            &graph,
            graph.root(),
            1,
            NodeType::Storage,
            &state,
            StateSet::UP_INIT,
            5,
        );
        assert_eq!(indices(&nodes), vec![2, 7]);
    }

    #[test]
    fn test_best_node() {
        let graph = flat_graph();
        let state = ClusterState::new(10, 10).with_node_state(
            NodeType::Distributor,
            3,
            NodeState::Down,
        );
        let best = select_best_node(
            &graph,
            graph.root(),
            1,
            NodeType::Distributor,
            &state,
            StateSet::UP_INIT,
        );
        assert_eq!(best.map(|n| n.index), Some(4));

        let empty = ClusterState::new(10, 0);
        assert!(
            select_best_node(
                &graph,
                graph.root(),
                1,
                NodeType::Distributor,
                &empty,
                StateSet::UP_INIT,
            )
            .is_none()
        );
    }

    #[test]
    fn test_capacity_shifts_wins() {
        let mut leaf = GroupConfig::leaf(0, "root", 1.0, [0, 1]);
        leaf.nodes[1] = NodeConfig::with_capacity(1, 4.0);
        let graph =
            NodeGroupGraph::from_config(&DistributionConfig::hierarchical(1, vec![leaf])).unwrap();

        let heavy_first = (0..10_000u64)
            .filter(|&key| rank_nodes(&graph, graph.root(), key, NodeType::Storage)[0].index == 1)
            .count();
        // Expected share is 4/5
        assert!((7_600..8_400).contains(&heavy_first), "heavy first {heavy_first}");
    }
}
