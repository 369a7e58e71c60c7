//! Cluster membership snapshot
//!
//! The placement engine only reads membership through [`ClusterSnapshot`].
//! [`ClusterState`] is the in-memory snapshot used by tests and tools, with a
//! compact text form:
//!
//! ```text
//! version:12 bits:16 distributor:10 .3.s:d storage:10 .1.s:m .7.s:r
//! ```
//!
//! `.<index>.s:<state>` overrides the state of one node of the node type
//! declared just before it. Nodes without an override are up; nodes at or
//! beyond the declared count are down.

use crate::error::{Error, Result};
use crate::types::{NodeState, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Number of distribution bits a cluster uses unless told otherwise
pub const DEFAULT_DISTRIBUTION_BITS: u8 = 16;

/// Read-only view of cluster membership consumed by the placement engine
pub trait ClusterSnapshot {
    /// Number of partition bits the cluster currently distributes on
    fn distribution_bits(&self) -> u8;

    /// Number of nodes of the given type known to the snapshot
    fn node_count(&self, node_type: NodeType) -> u16;

    /// State of one node; nodes unknown to the snapshot are down
    fn node_state(&self, node_type: NodeType, index: u16) -> NodeState;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct NodeTypeState {
    count: u16,
    overrides: BTreeMap<u16, NodeState>,
}

impl NodeTypeState {
    fn state(&self, index: u16) -> NodeState {
        if index >= self.count {
            return NodeState::Down;
        }
        self.overrides.get(&index).copied().unwrap_or_default()
    }

    fn set(&mut self, index: u16, state: NodeState) {
        if index >= self.count {
            self.count = index + 1;
        }
        if state == NodeState::Up {
            self.overrides.remove(&index);
        } else {
            self.overrides.insert(index, state);
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, node_type: NodeType) -> fmt::Result {
        write!(f, " {node_type}:{}", self.count)?;
        for (index, state) in &self.overrides {
            write!(f, " .{index}.s:{}", state.as_char())?;
        }
        Ok(())
    }
}

/// Snapshot of the state of every node in a content cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    version: u32,
    distribution_bits: u8,
    storage: NodeTypeState,
    distributor: NodeTypeState,
}

impl ClusterState {
    /// Create a snapshot where every node is up
    #[must_use]
    pub fn new(storage_nodes: u16, distributor_nodes: u16) -> Self {
        Self {
            version: 0,
            distribution_bits: DEFAULT_DISTRIBUTION_BITS,
            storage: NodeTypeState {
                count: storage_nodes,
                overrides: BTreeMap::new(),
            },
            distributor: NodeTypeState {
                count: distributor_nodes,
                overrides: BTreeMap::new(),
            },
        }
    }

    /// Set the snapshot version
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the number of distribution bits
    #[must_use]
    pub const fn with_distribution_bits(mut self, bits: u8) -> Self {
        self.distribution_bits = bits;
        self
    }

    /// Set the state of one node
    #[must_use]
    pub fn with_node_state(mut self, node_type: NodeType, index: u16, state: NodeState) -> Self {
        self.set_node_state(node_type, index, state);
        self
    }

    /// Set the state of one node, growing the node count if needed
    pub fn set_node_state(&mut self, node_type: NodeType, index: u16, state: NodeState) {
        self.nodes_mut(node_type).set(index, state);
    }

    /// Snapshot version
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    const fn nodes(&self, node_type: NodeType) -> &NodeTypeState {
        match node_type {
            NodeType::Storage => &self.storage,
            NodeType::Distributor => &self.distributor,
        }
    }

    const fn nodes_mut(&mut self, node_type: NodeType) -> &mut NodeTypeState {
        match node_type {
            NodeType::Storage => &mut self.storage,
            NodeType::Distributor => &mut self.distributor,
        }
    }
}

impl Default for ClusterState {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl ClusterSnapshot for ClusterState {
    fn distribution_bits(&self) -> u8 {
        self.distribution_bits
    }

    fn node_count(&self, node_type: NodeType) -> u16 {
        self.nodes(node_type).count
    }

    fn node_state(&self, node_type: NodeType, index: u16) -> NodeState {
        self.nodes(node_type).state(index)
    }
}

impl<T: ClusterSnapshot + ?Sized> ClusterSnapshot for &T {
    fn distribution_bits(&self) -> u8 {
        (**self).distribution_bits()
    }

    fn node_count(&self, node_type: NodeType) -> u16 {
        (**self).node_count(node_type)
    }

    fn node_state(&self, node_type: NodeType, index: u16) -> NodeState {
        (**self).node_state(node_type, index)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "version:{} bits:{}", self.version, self.distribution_bits)?;
        self.distributor.write(f, NodeType::Distributor)?;
        self.storage.write(f, NodeType::Storage)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid value for '{key}': '{value}'")))
}

impl FromStr for ClusterState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut state = Self::default();
        let mut current: Option<NodeType> = None;

        for token in s.split_whitespace() {
            let (key, value) = token
                .split_once(':')
                .ok_or_else(|| Error::invalid_argument(format!("malformed token '{token}'")))?;

            if let Some(node_key) = key.strip_prefix('.') {
                let node_type = current.ok_or_else(|| {
                    Error::invalid_argument(format!("'{token}' precedes any node type"))
                })?;
                let (index, field) = node_key.split_once('.').ok_or_else(|| {
                    Error::invalid_argument(format!("malformed node token '{token}'"))
                })?;
                if field != "s" {
                    return Err(Error::invalid_argument(format!(
                        "unknown node field '{field}' in '{token}'"
                    )));
                }
                let index: u16 = parse_number(key, index)?;
                let node_state = match value.chars().collect::<Vec<_>>().as_slice() {
                    [c] => NodeState::from_char(*c)?,
                    _ => {
                        return Err(Error::invalid_argument(format!(
                            "malformed node state in '{token}'"
                        )));
                    }
                };
                let nodes = state.nodes_mut(node_type);
                if index >= nodes.count {
                    return Err(Error::invalid_argument(format!(
                        "{node_type} node {index} is beyond node count {}",
                        nodes.count
                    )));
                }
                nodes.set(index, node_state);
                continue;
            }

            match key {
                "version" => state.version = parse_number(key, value)?,
                "bits" => state.distribution_bits = parse_number(key, value)?,
                "storage" | "distributor" => {
                    let node_type: NodeType = key.parse()?;
                    state.nodes_mut(node_type).count = parse_number(key, value)?;
                    current = Some(node_type);
                }
                other => {
                    return Err(Error::invalid_argument(format!(
                        "unknown cluster state key '{other}'"
                    )));
                }
            }
        }

        Ok(state)
    }
}
