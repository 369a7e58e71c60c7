//! Node group graph
//!
//! The group hierarchy is stored as an arena: every group is a record in a
//! vector, addressed by [`GroupId`], with children kept as id lists and a
//! parent id for upward navigation. A flat node index → leaf group table is
//! built once so the leaf of any node is found in constant time.
//!
//! The graph is validated and built once from a [`DistributionConfig`] and is
//! never mutated afterwards.

use idealstate_common::{
    ClusterSnapshot, DistributionConfig, Error, GroupConfig, NodeType, Result, StateSet,
};
use std::collections::BTreeMap;

/// Slot of a group in the graph arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(usize);

impl GroupId {
    /// Arena slot number
    #[must_use]
    pub const fn slot(self) -> usize {
        self.0
    }
}

/// A node entry in a leaf group
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupNode {
    /// Node index
    pub index: u16,
    /// Relative capacity within the leaf group
    pub capacity: f64,
}

/// Members of a group: child groups or nodes
#[derive(Clone, Debug)]
pub enum GroupMembers {
    /// Internal group
    Groups(Vec<GroupId>),
    /// Leaf group
    Nodes(Vec<GroupNode>),
}

/// A group record in the arena
#[derive(Clone, Debug)]
pub struct Group {
    index: u16,
    name: String,
    capacity: f64,
    parent: Option<GroupId>,
    path: Vec<u16>,
    members: GroupMembers,
    subtree_nodes: Vec<u16>,
}

impl Group {
    /// Configured group index
    #[must_use]
    pub const fn index(&self) -> u16 {
        self.index
    }

    /// Group name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relative capacity among siblings
    #[must_use]
    pub const fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Parent group, `None` for the root
    #[must_use]
    pub const fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    /// Group indices from the root down to and including this group
    #[must_use]
    pub fn path(&self) -> &[u16] {
        &self.path
    }

    /// Child groups or nodes
    #[must_use]
    pub const fn members(&self) -> &GroupMembers {
        &self.members
    }

    /// Check whether this is a leaf group
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.members, GroupMembers::Nodes(_))
    }

    /// Child groups; empty for a leaf group
    #[must_use]
    pub fn children(&self) -> &[GroupId] {
        match &self.members {
            GroupMembers::Groups(children) => children,
            GroupMembers::Nodes(_) => &[],
        }
    }

    /// Nodes; empty for an internal group
    #[must_use]
    pub fn nodes(&self) -> &[GroupNode] {
        match &self.members {
            GroupMembers::Groups(_) => &[],
            GroupMembers::Nodes(nodes) => nodes,
        }
    }

    /// Every node index below this group, ascending
    #[must_use]
    pub fn subtree_nodes(&self) -> &[u16] {
        &self.subtree_nodes
    }
}

/// Immutable hierarchy of groups
#[derive(Clone, Debug)]
pub struct NodeGroupGraph {
    groups: Vec<Group>,
    root: GroupId,
    node_to_leaf: Vec<Option<GroupId>>,
}

impl NodeGroupGraph {
    /// Validate `config` and build the graph from it
    pub fn from_config(config: &DistributionConfig) -> Result<Self> {
        config.validate()?;
        GraphBuilder::new(config)?.build()
    }

    /// Root group
    #[must_use]
    pub const fn root(&self) -> GroupId {
        self.root
    }

    /// Group record for an id handed out by this graph
    #[must_use]
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    /// All groups, parents before children
    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.groups.iter().enumerate().map(|(slot, g)| (GroupId(slot), g))
    }

    /// All leaf groups, in depth-first order
    pub fn leaf_groups(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.groups().filter(|(_, g)| g.is_leaf())
    }

    /// Leaf group holding `node`
    #[must_use]
    pub fn leaf_of(&self, node: u16) -> Option<GroupId> {
        self.node_to_leaf.get(usize::from(node)).copied().flatten()
    }

    /// Number of nodes in the graph
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.group(self.root).subtree_nodes.len()
    }

    /// Number of levels, 1 for a single leaf group
    #[must_use]
    pub fn depth(&self) -> usize {
        self.groups.iter().map(|g| g.path.len()).max().unwrap_or(0)
    }

    /// Number of nodes below `id` whose `node_type` state is in `states`
    pub fn count_in_states<S>(
        &self,
        id: GroupId,
        snapshot: &S,
        node_type: NodeType,
        states: StateSet,
    ) -> usize
    where
        S: ClusterSnapshot + ?Sized,
    {
        self.group(id)
            .subtree_nodes
            .iter()
            .filter(|&&node| states.contains(snapshot.node_state(node_type, node)))
            .count()
    }

    /// [`count_in_states`](Self::count_in_states) for every group at once,
    /// indexed by [`GroupId::slot`]
    ///
    /// Reads each node's state once instead of once per enclosing group.
    pub fn counts_in_states<S>(
        &self,
        snapshot: &S,
        node_type: NodeType,
        states: StateSet,
    ) -> Vec<usize>
    where
        S: ClusterSnapshot + ?Sized,
    {
        let mut counts = vec![0; self.groups.len()];
        // Children sit at higher slots than their parent
        for (slot, group) in self.groups.iter().enumerate().rev() {
            counts[slot] = match &group.members {
                GroupMembers::Nodes(nodes) => nodes
                    .iter()
                    .filter(|node| states.contains(snapshot.node_state(node_type, node.index)))
                    .count(),
                GroupMembers::Groups(children) => {
                    children.iter().map(|child| counts[child.0]).sum()
                }
            };
        }
        counts
    }

    /// Check whether any node below `id` has its `node_type` state in `states`
    pub fn any_in_states<S>(
        &self,
        id: GroupId,
        snapshot: &S,
        node_type: NodeType,
        states: StateSet,
    ) -> bool
    where
        S: ClusterSnapshot + ?Sized,
    {
        self.group(id)
            .subtree_nodes
            .iter()
            .any(|&node| states.contains(snapshot.node_state(node_type, node)))
    }

    /// Check whether no distributor below `id` is up or initializing
    pub fn all_distributors_down<S>(&self, id: GroupId, snapshot: &S) -> bool
    where
        S: ClusterSnapshot + ?Sized,
    {
        !self.any_in_states(id, snapshot, NodeType::Distributor, StateSet::UP_INIT)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pending,
    InProgress,
    Done,
}

struct GraphBuilder<'a> {
    config: &'a DistributionConfig,
    positions: BTreeMap<u16, usize>,
    visits: Vec<Visit>,
    groups: Vec<Group>,
    node_to_leaf: Vec<Option<GroupId>>,
}

impl<'a> GraphBuilder<'a> {
    fn new(config: &'a DistributionConfig) -> Result<Self> {
        let mut positions = BTreeMap::new();
        for (pos, group) in config.groups.iter().enumerate() {
            if positions.insert(group.index, pos).is_some() {
                return Err(Error::DuplicateGroup(group.index));
            }
            validate_group(group)?;
        }

        Ok(Self {
            config,
            positions,
            visits: vec![Visit::Pending; config.groups.len()],
            groups: Vec::with_capacity(config.groups.len()),
            node_to_leaf: Vec::new(),
        })
    }

    fn build(mut self) -> Result<NodeGroupGraph> {
        let root = self.visit(0, None, &[])?;

        if let Some(pos) = self.visits.iter().position(|v| *v != Visit::Done) {
            return Err(Error::UnreachableGroup(self.config.groups[pos].index));
        }

        let graph = NodeGroupGraph {
            groups: self.groups,
            root,
            node_to_leaf: self.node_to_leaf,
        };
        tracing::debug!(
            groups = graph.groups.len(),
            leaves = graph.leaf_groups().count(),
            nodes = graph.node_count(),
            depth = graph.depth(),
            "built node group graph"
        );
        Ok(graph)
    }

    /// Depth-first construction; parents get lower slots than their children.
    fn visit(
        &mut self,
        pos: usize,
        parent: Option<GroupId>,
        parent_path: &[u16],
    ) -> Result<GroupId> {
        let config = self.config;
        let group = &config.groups[pos];
        match self.visits[pos] {
            Visit::Pending => {}
            Visit::InProgress => return Err(Error::CyclicGroup(group.index)),
            Visit::Done => return Err(Error::SharedGroup(group.index)),
        }
        self.visits[pos] = Visit::InProgress;

        let id = GroupId(self.groups.len());
        let mut path = parent_path.to_vec();
        path.push(group.index);
        self.groups.push(Group {
            index: group.index,
            name: group.name.clone(),
            capacity: group.capacity,
            parent,
            path: path.clone(),
            members: GroupMembers::Groups(Vec::new()),
            subtree_nodes: Vec::new(),
        });

        let (members, mut subtree_nodes) = if group.nodes.is_empty() {
            let mut children = Vec::with_capacity(group.children.len());
            let mut nodes = Vec::new();
            for &child in &group.children {
                let child_pos = *self.positions.get(&child).ok_or(Error::UnknownChildGroup {
                    parent: group.index,
                    child,
                })?;
                let child_id = self.visit(child_pos, Some(id), &path)?;
                nodes.extend_from_slice(&self.groups[child_id.0].subtree_nodes);
                children.push(child_id);
            }
            (GroupMembers::Groups(children), nodes)
        } else {
            let mut nodes = Vec::with_capacity(group.nodes.len());
            for node in &group.nodes {
                self.register_node(node.index, id)?;
                nodes.push(GroupNode {
                    index: node.index,
                    capacity: node.capacity,
                });
            }
            let indices = nodes.iter().map(|n| n.index).collect();
            (GroupMembers::Nodes(nodes), indices)
        };

        subtree_nodes.sort_unstable();
        let record = &mut self.groups[id.0];
        record.members = members;
        record.subtree_nodes = subtree_nodes;
        self.visits[pos] = Visit::Done;
        Ok(id)
    }

    fn register_node(&mut self, node: u16, leaf: GroupId) -> Result<()> {
        let slot = usize::from(node);
        if self.node_to_leaf.len() <= slot {
            self.node_to_leaf.resize(slot + 1, None);
        }
        if let Some(first) = self.node_to_leaf[slot] {
            return Err(Error::DuplicateNode {
                node,
                first: self.groups[first.0].index,
                second: self.groups[leaf.0].index,
            });
        }
        self.node_to_leaf[slot] = Some(leaf);
        Ok(())
    }
}

fn valid_capacity(capacity: f64) -> bool {
    capacity.is_finite() && capacity > 0.0
}

fn validate_group(group: &GroupConfig) -> Result<()> {
    if !valid_capacity(group.capacity) {
        return Err(Error::InvalidGroupCapacity {
            group: group.index,
            capacity: group.capacity,
        });
    }
    match (group.children.is_empty(), group.nodes.is_empty()) {
        (false, false) => return Err(Error::MixedGroup(group.index)),
        (true, true) => return Err(Error::EmptyGroup(group.index)),
        _ => {}
    }
    if let Some(node) = group.nodes.iter().find(|n| !valid_capacity(n.capacity)) {
        return Err(Error::InvalidNodeCapacity {
            group: group.index,
            node: node.index,
            capacity: node.capacity,
        });
    }
    Ok(())
}
