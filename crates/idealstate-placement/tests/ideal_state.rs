//! End-to-end placement properties

use idealstate_common::{
    ClusterSnapshot, ClusterState, DistributionConfig, GroupConfig, NodeState, NodeType,
    PartitionId, StateSet,
};
use idealstate_placement::{Distribution, DistributionHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::sync::Arc;

const NODES: u16 = 24;

fn hierarchical_config() -> DistributionConfig {
    DistributionConfig::hierarchical(
        3,
        vec![
            GroupConfig::branch(0, "root", 1.0, [1, 2, 3]),
            GroupConfig::branch(1, "dc-a", 2.0, [4, 5]),
            GroupConfig::branch(2, "dc-b", 1.0, [6, 7]),
            GroupConfig::leaf(3, "dc-c", 1.0, 20..24),
            GroupConfig::leaf(4, "rack-a1", 1.0, 0..5),
            GroupConfig::leaf(5, "rack-a2", 1.0, 5..10),
            GroupConfig::leaf(6, "rack-b1", 1.5, 10..15),
            GroupConfig::leaf(7, "rack-b2", 1.0, 15..20),
        ],
    )
}

fn random_state(rng: &mut StdRng, down_ratio: f64) -> ClusterState {
    let mut state = ClusterState::new(NODES, NODES).with_version(rng.r#gen());
    for node in 0..NODES {
        if rng.gen_bool(down_ratio) {
            state.set_node_state(NodeType::Storage, node, NodeState::Down);
        }
        if rng.gen_bool(down_ratio) {
            state.set_node_state(NodeType::Distributor, node, NodeState::Down);
        }
    }
    state
}

fn random_partition(rng: &mut StdRng) -> PartitionId {
    let used_bits = rng.gen_range(16..=58);
    PartitionId::new(used_bits, rng.r#gen::<u64>() >> (64 - u32::from(used_bits))).unwrap()
}

fn eligible_storage(state: &ClusterState) -> usize {
    (0..NODES)
        .filter(|&node| state.node_state(NodeType::Storage, node) == NodeState::Up)
        .count()
}

#[test]
fn test_distribution_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Distribution>();
    assert_send_sync::<DistributionHandle>();
}

#[test]
fn test_hierarchical_placement_properties() {
    let distribution = Distribution::from_config(hierarchical_config()).unwrap();
    let mut rng = StdRng::seed_from_u64(0x1dea1);

    for _ in 0..500 {
        let state = random_state(&mut rng, 0.25);
        let partition = random_partition(&mut rng);
        let redundancy: u16 = rng.gen_range(1..=6);
        let eligible = eligible_storage(&state);

        let result = distribution.ideal_nodes(
            NodeType::Storage,
            &state,
            partition,
            StateSet::UP_INIT,
            Some(redundancy),
        );
        if eligible == 0 {
            assert!(result.unwrap_err().is_retryable());
            continue;
        }
        let nodes = result.unwrap();

        assert_eq!(nodes.len(), usize::from(redundancy).min(eligible));
        let unique: BTreeSet<u16> = nodes.iter().copied().collect();
        assert_eq!(unique.len(), nodes.len());
        for &node in &nodes {
            assert_eq!(state.node_state(NodeType::Storage, node), NodeState::Up);
        }

        let buckets = distribution.split_nodes_into_leaf_groups(&nodes);
        let mut covered: Vec<u16> = buckets.iter().flatten().copied().collect();
        covered.sort_unstable();
        assert_eq!(covered, unique.into_iter().collect::<Vec<_>>());
        for bucket in &buckets {
            let graph = distribution.node_graph();
            let leaf = graph.leaf_of(bucket[0]);
            assert!(bucket.iter().all(|&node| graph.leaf_of(node) == leaf));
        }
    }
}

#[test]
fn test_same_answer_across_instances() {
    let first = Distribution::from_config(hierarchical_config()).unwrap();
    let second = Distribution::from_serialized(first.serialized()).unwrap();
    assert_eq!(first, second);

    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..300 {
        let state = random_state(&mut rng, 0.2);
        let text = state.to_string();
        let reparsed: ClusterState = text.parse().unwrap();
        let partition = random_partition(&mut rng);

        let a = first.ideal_storage_nodes(&state, partition, StateSet::default());
        let b = second.ideal_storage_nodes(&reparsed, partition, StateSet::default());
        assert_eq!(a.ok(), b.ok());

        let a = first.ideal_distributor_node(&state, partition, StateSet::UP_INIT);
        let b = second.ideal_distributor_node(&reparsed, partition, StateSet::UP_INIT);
        assert_eq!(a.ok(), b.ok());
    }
}

#[test]
fn test_same_answer_across_threads() {
    let handle = Arc::new(DistributionHandle::new(
        Distribution::from_config(hierarchical_config()).unwrap(),
    ));
    let state = ClusterState::new(NODES, NODES)
        .with_node_state(NodeType::Storage, 3, NodeState::Down)
        .with_node_state(NodeType::Storage, 17, NodeState::Maintenance)
        .with_node_state(NodeType::Distributor, 21, NodeState::Down);

    let compute = |distribution: &Distribution| -> Vec<(Vec<u16>, u16)> {
        (0..2_000u64)
            .map(|key| {
                let partition = PartitionId::new(32, key << 16).unwrap();
                (
                    distribution
                        .ideal_storage_nodes(&state, partition, StateSet::UP_INIT)
                        .unwrap(),
                    distribution
                        .ideal_distributor_node(&state, partition, StateSet::UP_INIT)
                        .unwrap(),
                )
            })
            .collect()
    };

    let expected = compute(&handle.current());
    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                scope.spawn(move || compute(&handle.current()))
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), expected);
        }
    });
}

/// Four single-node leaf groups next to one heavy leaf group
fn heavy_leaf_config() -> DistributionConfig {
    DistributionConfig::hierarchical(
        3,
        vec![
            GroupConfig::branch(0, "root", 1.0, [1, 2, 3, 4, 5]),
            GroupConfig::leaf(1, "a", 1.0, [0]),
            GroupConfig::leaf(2, "b", 1.0, [1]),
            GroupConfig::leaf(3, "c", 1.0, [2]),
            GroupConfig::leaf(4, "d", 1.0, [3]),
            GroupConfig::leaf(5, "e", 6.0, 4..10),
        ],
    )
}

/// Small racks under a heavy datacenter, so copies overflow between racks
fn tight_racks_config(redundancy: u16) -> DistributionConfig {
    DistributionConfig::hierarchical(
        redundancy,
        vec![
            GroupConfig::branch(0, "root", 1.0, [1, 2]),
            GroupConfig::branch(1, "dc-a", 3.0, [3, 4, 5]),
            GroupConfig::branch(2, "dc-b", 1.0, [6]),
            GroupConfig::leaf(3, "rack-a1", 1.0, [0, 1]),
            GroupConfig::leaf(4, "rack-a2", 2.0, [2]),
            GroupConfig::leaf(5, "rack-a3", 1.0, [3, 4]),
            GroupConfig::leaf(6, "rack-b1", 1.0, 5..12),
        ],
    )
}

/// Take every node down in turn, starting from an all-up cluster
///
/// A node outside the ideal set changes nothing; a selected node changes
/// only its own slot, which goes to a node that was not selected before.
fn check_single_node_down(distribution: &Distribution, partition: PartitionId) {
    let nodes = u16::try_from(distribution.node_graph().node_count()).unwrap();
    let all_up = ClusterState::new(nodes, nodes);
    let ideal = distribution
        .ideal_storage_nodes(&all_up, partition, StateSet::UP_INIT)
        .unwrap();

    for node in 0..nodes {
        let state = all_up
            .clone()
            .with_node_state(NodeType::Storage, node, NodeState::Down);
        let after = distribution
            .ideal_storage_nodes(&state, partition, StateSet::UP_INIT)
            .unwrap();

        let Some(slot) = ideal.iter().position(|&n| n == node) else {
            assert_eq!(after, ideal, "{partition}: node {node} is not selected");
            continue;
        };
        assert_eq!(after.len(), ideal.len(), "{partition}: node {node}");
        for (pos, (&before, &now)) in ideal.iter().zip(&after).enumerate() {
            if pos != slot {
                assert_eq!(now, before, "{partition}: node {node} moved slot {pos}");
            }
        }
        assert!(
            !ideal.contains(&after[slot]),
            "{partition}: node {node} replaced by {}",
            after[slot]
        );
    }
}

#[test]
fn test_flat_minimal_disruption_and_replacement() {
    let distribution = Distribution::from_config(DistributionConfig::flat(3, NODES)).unwrap();
    let mut rng = StdRng::seed_from_u64(4242);
    for _ in 0..100 {
        check_single_node_down(&distribution, random_partition(&mut rng));
    }
}

#[test]
fn test_hierarchical_minimal_disruption_and_replacement() {
    let mut rng = StdRng::seed_from_u64(0xd15c);
    for redundancy in [3, 6] {
        let mut config = hierarchical_config();
        config.redundancy = redundancy;
        let distribution = Distribution::from_config(config).unwrap();
        for _ in 0..60 {
            check_single_node_down(&distribution, random_partition(&mut rng));
        }
    }
}

#[test]
fn test_heavy_leaf_minimal_disruption_and_replacement() {
    let distribution = Distribution::from_config(heavy_leaf_config()).unwrap();
    for key in 0..300 {
        check_single_node_down(&distribution, PartitionId::new(16, key).unwrap());
    }
}

#[test]
fn test_overflow_minimal_disruption_and_replacement() {
    for redundancy in [4, 6] {
        let distribution = Distribution::from_config(tight_racks_config(redundancy)).unwrap();
        for key in 0..300 {
            check_single_node_down(&distribution, PartitionId::new(16, key).unwrap());
        }
    }
}

#[test]
fn test_distributor_ownership() {
    let distribution = Distribution::from_config(hierarchical_config()).unwrap();
    let mut rng = StdRng::seed_from_u64(5);

    for _ in 0..300 {
        let state = random_state(&mut rng, 0.5);
        let partition = random_partition(&mut rng);
        let any_up = (0..NODES)
            .any(|node| state.node_state(NodeType::Distributor, node) == NodeState::Up);

        match distribution.ideal_distributor_node(&state, partition, StateSet::UP_INIT) {
            Ok(node) => {
                assert_eq!(state.node_state(NodeType::Distributor, node), NodeState::Up);
            }
            Err(err) => {
                assert!(!any_up);
                assert!(err.is_retryable());
            }
        }
    }
}
