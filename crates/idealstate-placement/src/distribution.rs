//! Distribution facade
//!
//! A [`Distribution`] owns one validated configuration and the group graph
//! built from it, and answers placement queries against any membership
//! snapshot. It keeps no state between calls, so a shared reference can be
//! queried from any number of threads at once.

use crate::graph::{GroupId, NodeGroupGraph};
use crate::group_selector::{
    ResultGroup, nominal_storage_groups, select_distributor_leaf, select_storage_groups,
};
use crate::node_selector::{ScoredNode, rank_nodes, select_best_node, select_nodes};
use crate::split::split_into_leaf_groups;
use idealstate_common::{
    ClusterSnapshot, DistributionConfig, Error, NodeType, PartitionId, Result, StateSet,
};
use std::collections::BTreeSet;
use std::fmt;

/// Placement engine for one distribution configuration
#[derive(Debug)]
pub struct Distribution {
    config: DistributionConfig,
    serialized: String,
    graph: NodeGroupGraph,
}

impl Distribution {
    /// Validate `config` and build a distribution from it
    pub fn from_config(config: DistributionConfig) -> Result<Self> {
        let graph = NodeGroupGraph::from_config(&config)?;
        let serialized = config.to_canonical_string()?;

        tracing::debug!(
            redundancy = config.redundancy,
            global = config.global,
            groups = config.groups.len(),
            nodes = graph.node_count(),
            "built distribution"
        );
        Ok(Self {
            config,
            serialized,
            graph,
        })
    }

    /// Build a distribution from its canonical serialized form
    pub fn from_serialized(serialized: &str) -> Result<Self> {
        Self::from_config(DistributionConfig::from_canonical_str(serialized)?)
    }

    /// Build a distribution, overriding the configured global flag
    pub fn with_global(mut config: DistributionConfig, is_global: bool) -> Result<Self> {
        config.global = is_global;
        Self::from_config(config)
    }

    /// Canonical serialized configuration
    #[must_use]
    pub fn serialized(&self) -> &str {
        &self.serialized
    }

    /// Configuration this distribution was built from
    #[must_use]
    pub const fn config(&self) -> &DistributionConfig {
        &self.config
    }

    /// Group graph
    #[must_use]
    pub const fn node_graph(&self) -> &NodeGroupGraph {
        &self.graph
    }

    /// Configured number of copies per partition
    #[must_use]
    pub const fn redundancy(&self) -> u16 {
        self.config.redundancy
    }

    /// Configured number of copies acknowledged for new partitions
    #[must_use]
    pub const fn initial_redundancy(&self) -> u16 {
        self.config.initial_redundancy
    }

    /// Configured number of ready copies
    #[must_use]
    pub const fn ready_copies(&self) -> u16 {
        self.config.ready_copies
    }

    /// Whether every node holds every partition
    #[must_use]
    pub const fn is_global(&self) -> bool {
        self.config.global
    }

    /// Whether one copy per leaf group is active
    #[must_use]
    pub const fn active_per_group(&self) -> bool {
        self.config.active_per_leaf_group
    }

    /// Whether writes wait for the primary copy to be persisted
    #[must_use]
    pub const fn ensure_primary_persisted(&self) -> bool {
        self.config.ensure_primary_persisted
    }

    fn effective_redundancy(&self, requested: Option<u16>) -> u16 {
        match requested {
            Some(redundancy) => redundancy,
            None if self.config.global => {
                u16::try_from(self.graph.node_count()).unwrap_or(u16::MAX)
            }
            None => self.config.redundancy,
        }
    }

    fn placement_key<S>(&self, snapshot: &S, partition: PartitionId) -> Result<u64>
    where
        S: ClusterSnapshot + ?Sized,
    {
        let distribution_bits = snapshot.distribution_bits();
        partition
            .placement_key(distribution_bits)
            .ok_or_else(|| Error::TooFewPartitionBits {
                partition: partition.to_string(),
                used_bits: partition.used_bits(),
                distribution_bits,
            })
    }

    /// Ideal nodes of `node_type` for `partition`, primary first
    ///
    /// For storage, `redundancy` overrides the configured redundancy (a global
    /// distribution defaults to every node). The list holds at most that many
    /// nodes and is shorter only when not enough nodes are in `states`. For
    /// distributors the list holds the single owning distributor.
    pub fn ideal_nodes<S>(
        &self,
        node_type: NodeType,
        snapshot: &S,
        partition: PartitionId,
        states: StateSet,
        redundancy: Option<u16>,
    ) -> Result<Vec<u16>>
    where
        S: ClusterSnapshot + ?Sized,
    {
        let key = self.placement_key(snapshot, partition)?;
        let redundancy = self.effective_redundancy(redundancy);
        if redundancy == 0 {
            return Ok(Vec::new());
        }

        let nodes = match node_type {
            NodeType::Storage => self.storage_nodes(key, snapshot, states, redundancy)?,
            NodeType::Distributor => vec![self.distributor_node(key, snapshot, states)?],
        };
        tracing::trace!(
            %partition,
            %node_type,
            %states,
            redundancy,
            ?nodes,
            "computed ideal nodes"
        );
        Ok(nodes)
    }

    /// Ideal storage nodes for `partition` at the default redundancy
    pub fn ideal_storage_nodes<S>(
        &self,
        snapshot: &S,
        partition: PartitionId,
        states: StateSet,
    ) -> Result<Vec<u16>>
    where
        S: ClusterSnapshot + ?Sized,
    {
        self.ideal_nodes(NodeType::Storage, snapshot, partition, states, None)
    }

    /// Distributor owning `partition`
    pub fn ideal_distributor_node<S>(
        &self,
        snapshot: &S,
        partition: PartitionId,
        states: StateSet,
    ) -> Result<u16>
    where
        S: ClusterSnapshot + ?Sized,
    {
        let key = self.placement_key(snapshot, partition)?;
        self.distributor_node(key, snapshot, states)
    }

    /// Storage nodes in slot order
    ///
    /// The slots come from the placement with every node eligible. A slot
    /// whose node is not eligible is taken by a node the state-aware
    /// placement picked instead, so one node going down changes one slot.
    fn storage_nodes<S>(
        &self,
        key: u64,
        snapshot: &S,
        states: StateSet,
        redundancy: u16,
    ) -> Result<Vec<u16>>
    where
        S: ClusterSnapshot + ?Sized,
    {
        let groups = select_storage_groups(&self.graph, key, snapshot, states, redundancy)?;
        let selected = merge_by_score(&groups, |leaf, count| {
            select_nodes(
                &self.graph,
                leaf,
                key,
                NodeType::Storage,
                snapshot,
                states,
                count,
            )
        });
        let nominal = merge_by_score(
            &nominal_storage_groups(&self.graph, key, redundancy),
            |leaf, count| {
                let mut ranked = rank_nodes(&self.graph, leaf, key, NodeType::Storage);
                ranked.truncate(count);
                ranked
            },
        );
        Ok(fill_slots(&nominal, &selected))
    }

    fn distributor_node<S>(&self, key: u64, snapshot: &S, states: StateSet) -> Result<u16>
    where
        S: ClusterSnapshot + ?Sized,
    {
        let unavailable = || Error::no_nodes_available(NodeType::Distributor, states);
        if states.is_subset_of(StateSet::UP_INIT)
            && self.graph.all_distributors_down(self.graph.root(), snapshot)
        {
            return Err(unavailable());
        }

        let leaf = select_distributor_leaf(&self.graph, key, snapshot, states)
            .ok_or_else(unavailable)?;
        select_best_node(&self.graph, leaf, key, NodeType::Distributor, snapshot, states)
            .map(|node| node.index)
            .ok_or_else(unavailable)
    }

    /// Partition `nodes` into per leaf group buckets
    ///
    /// Buckets are ordered by leaf group index; nodes keep their input order.
    /// Nodes that belong to no leaf group are skipped.
    #[must_use]
    pub fn split_nodes_into_leaf_groups(&self, nodes: &[u16]) -> Vec<Vec<u16>> {
        split_into_leaf_groups(&self.graph, nodes)
    }

    /// Check whether no distributor below `group` is up or initializing
    pub fn all_distributors_down<S>(&self, group: GroupId, snapshot: &S) -> bool
    where
        S: ClusterSnapshot + ?Sized,
    {
        self.graph.all_distributors_down(group, snapshot)
    }
}

/// Nodes picked from each leaf group, best score first
fn merge_by_score<F>(groups: &[ResultGroup], mut pick: F) -> Vec<ScoredNode>
where
    F: FnMut(GroupId, usize) -> Vec<ScoredNode>,
{
    let mut nodes: Vec<ScoredNode> = groups
        .iter()
        .flat_map(|result| pick(result.group, usize::from(result.redundancy)))
        .collect();
    nodes.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.index.cmp(&b.index))
    });
    nodes
}

/// Lay `selected` out over the slots of `nominal`
///
/// A selected node keeps its nominal slot. The other slots are filled in
/// order with the selected nodes that have no slot of their own, best score
/// first. Slots left without a node are dropped.
fn fill_slots(nominal: &[ScoredNode], selected: &[ScoredNode]) -> Vec<u16> {
    let chosen: BTreeSet<u16> = selected.iter().map(|node| node.index).collect();
    let slotted: BTreeSet<u16> = nominal.iter().map(|node| node.index).collect();
    let mut replacements = selected
        .iter()
        .map(|node| node.index)
        .filter(|index| !slotted.contains(index));

    nominal
        .iter()
        .filter_map(|slot| {
            if chosen.contains(&slot.index) {
                Some(slot.index)
            } else {
                replacements.next()
            }
        })
        .collect()
}

impl PartialEq for Distribution {
    fn eq(&self, other: &Self) -> bool {
        self.serialized == other.serialized
    }
}

impl Eq for Distribution {}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Distribution(redundancy: {}, ready copies: {}, groups: {}, nodes: {}",
            self.config.redundancy,
            self.config.ready_copies,
            self.config.groups.len(),
            self.graph.node_count()
        )?;
        if self.config.global {
            write!(f, ", global")?;
        }
        if self.config.active_per_leaf_group {
            write!(f, ", active per leaf group")?;
        }
        write!(f, ")")
    }
}
