//! Core type definitions for ideal state computation
//!
//! This module defines the value types passed between the cluster snapshot,
//! the placement engine and its callers: node types, node states, sets of
//! allowed states and partition identifiers.

use crate::error::{Error, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest number of significant bits a partition id may carry
pub const MAX_USED_BITS: u8 = 58;

/// Role of a node in the content cluster
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Holds replicas of partitions
    #[display("storage")]
    Storage,
    /// Owns partitions and coordinates their replicas
    #[display("distributor")]
    Distributor,
}

impl FromStr for NodeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "storage" => Ok(Self::Storage),
            "distributor" => Ok(Self::Distributor),
            other => Err(Error::invalid_argument(format!("unknown node type: {other}"))),
        }
    }
}

/// Node status as reported by the cluster membership snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Node is serving
    #[default]
    Up,
    /// Node is starting and listing its partitions
    Initializing,
    /// Node is temporarily out of service but keeps its data
    Maintenance,
    /// Node is unreachable
    Down,
    /// Node is being phased out of the cluster
    Retired,
}

impl NodeState {
    /// Every state, in canonical order
    pub const ALL: [Self; 5] = [
        Self::Up,
        Self::Initializing,
        Self::Maintenance,
        Self::Down,
        Self::Retired,
    ];

    /// Single character form used in state sets and cluster state strings
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Up => 'u',
            Self::Initializing => 'i',
            Self::Maintenance => 'm',
            Self::Down => 'd',
            Self::Retired => 'r',
        }
    }

    /// Parse the single character form
    pub fn from_char(c: char) -> Result<Self> {
        match c {
            'u' => Ok(Self::Up),
            'i' => Ok(Self::Initializing),
            'm' => Ok(Self::Maintenance),
            'd' => Ok(Self::Down),
            'r' => Ok(Self::Retired),
            other => Err(Error::invalid_argument(format!("unknown node state: '{other}'"))),
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Up => 1,
            Self::Initializing => 1 << 1,
            Self::Maintenance => 1 << 2,
            Self::Down => 1 << 3,
            Self::Retired => 1 << 4,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Initializing => write!(f, "initializing"),
            Self::Maintenance => write!(f, "maintenance"),
            Self::Down => write!(f, "down"),
            Self::Retired => write!(f, "retired"),
        }
    }
}

/// Set of node states a caller accepts as eligible for placement
///
/// Written as a string of state characters, e.g. `"uim"` for up,
/// initializing and maintenance.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateSet(u8);

impl StateSet {
    /// No state allowed
    pub const EMPTY: Self = Self(0);
    /// Up and initializing
    pub const UP_INIT: Self = Self(NodeState::Up.bit() | NodeState::Initializing.bit());
    /// Up, initializing and maintenance (the default)
    pub const UP_INIT_MAINTENANCE: Self = Self(Self::UP_INIT.0 | NodeState::Maintenance.bit());

    /// Create a set from a list of states
    #[must_use]
    pub fn of(states: &[NodeState]) -> Self {
        Self(states.iter().fold(0, |acc, s| acc | s.bit()))
    }

    /// Check whether a state is in the set
    #[must_use]
    pub const fn contains(self, state: NodeState) -> bool {
        self.0 & state.bit() != 0
    }

    /// Check whether every state in `self` is also in `other`
    #[must_use]
    pub const fn is_subset_of(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// Check whether the set is empty
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the states in canonical order
    pub fn iter(self) -> impl Iterator<Item = NodeState> {
        NodeState::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl Default for StateSet {
    fn default() -> Self {
        Self::UP_INIT_MAINTENANCE
    }
}

impl FromStr for StateSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.chars().try_fold(Self::EMPTY, |set, c| -> Result<Self> {
            Ok(Self(set.0 | NodeState::from_char(c)?.bit()))
        })
    }
}

impl fmt::Display for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.iter().try_for_each(|s| write!(f, "{}", s.as_char()))
    }
}

impl fmt::Debug for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateSet({self})")
    }
}

/// Identifier of a data partition
///
/// A partition is a key with a number of significant ("used") bits. The
/// cluster places partitions on the most-significant bits of the key, so two
/// partitions that agree on those bits land on the same nodes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPartitionId")]
pub struct PartitionId {
    used_bits: u8,
    key: u64,
}

/// Unchecked wire form of [`PartitionId`]
#[derive(Deserialize)]
struct RawPartitionId {
    used_bits: u8,
    key: u64,
}

impl TryFrom<RawPartitionId> for PartitionId {
    type Error = Error;

    fn try_from(raw: RawPartitionId) -> Result<Self> {
        Self::new(raw.used_bits, raw.key)
    }
}

impl PartitionId {
    /// Create a partition id from its used bit count and right-aligned key
    pub fn new(used_bits: u8, key: u64) -> Result<Self> {
        if used_bits > MAX_USED_BITS {
            return Err(Error::invalid_argument(format!(
                "partition uses {used_bits} bits, at most {MAX_USED_BITS} allowed"
            )));
        }
        if key >> used_bits != 0 {
            return Err(Error::invalid_argument(format!(
                "partition key 0x{key:x} does not fit in {used_bits} bits"
            )));
        }
        Ok(Self { used_bits, key })
    }

    /// Number of significant bits
    #[must_use]
    pub const fn used_bits(&self) -> u8 {
        self.used_bits
    }

    /// Right-aligned key value
    #[must_use]
    pub const fn key(&self) -> u64 {
        self.key
    }

    /// Key used for placement when the cluster distributes on
    /// `distribution_bits` bits: the most-significant `distribution_bits` of
    /// the used bits. `None` if the partition uses fewer bits than that.
    #[must_use]
    pub const fn placement_key(&self, distribution_bits: u8) -> Option<u64> {
        if distribution_bits > self.used_bits {
            return None;
        }
        Some(self.key >> (self.used_bits - distribution_bits))
    }
}

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionId({self})")
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}({})", self.key, self.used_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_set_parse() {
        let set: StateSet = "uim".parse().unwrap();
        assert_eq!(set, StateSet::UP_INIT_MAINTENANCE);
        assert!(set.contains(NodeState::Maintenance));
        assert!(!set.contains(NodeState::Down));
        assert!(!set.contains(NodeState::Retired));

        assert!("ux".parse::<StateSet>().is_err());
        assert!("".parse::<StateSet>().unwrap().is_empty());
    }

    #[test]
    fn test_state_set_display_is_canonical() {
        let set: StateSet = "rmu".parse().unwrap();
        assert_eq!(set.to_string(), "umr");
        assert_eq!(StateSet::default().to_string(), "uim");
    }

    #[test]
    fn test_state_set_subset() {
        assert!(StateSet::UP_INIT.is_subset_of(StateSet::UP_INIT_MAINTENANCE));
        assert!(!StateSet::UP_INIT_MAINTENANCE.is_subset_of(StateSet::UP_INIT));
        assert!(StateSet::EMPTY.is_subset_of(StateSet::UP_INIT));
    }

    #[test]
    fn test_node_state_chars() {
        for state in NodeState::ALL {
            assert_eq!(NodeState::from_char(state.as_char()).unwrap(), state);
        }
    }

    #[test]
    fn test_partition_id_validation() {
        assert!(PartitionId::new(16, 0xffff).is_ok());
        assert!(PartitionId::new(16, 0x1_0000).is_err());
        assert!(PartitionId::new(59, 0).is_err());
        assert!(PartitionId::new(0, 0).is_ok());
    }

    #[test]
    fn test_partition_id_deserialize_validates() {
        let partition = PartitionId::new(20, 0xabcde).unwrap();
        let text = serde_json::to_string(&partition).unwrap();
        assert_eq!(text, r#"{"used_bits":20,"key":703710}"#);
        assert_eq!(serde_json::from_str::<PartitionId>(&text).unwrap(), partition);

        assert!(serde_json::from_str::<PartitionId>(r#"{"used_bits":64,"key":0}"#).is_err());
        assert!(serde_json::from_str::<PartitionId>(r#"{"used_bits":4,"key":16}"#).is_err());
    }

    #[test]
    fn test_partition_placement_key() {
        let partition = PartitionId::new(20, 0xabcde).unwrap();
        assert_eq!(partition.placement_key(20), Some(0xabcde));
        assert_eq!(partition.placement_key(16), Some(0xabcd));
        assert_eq!(partition.placement_key(0), Some(0));
        assert_eq!(partition.placement_key(21), None);
    }

    #[test]
    fn test_node_type_parse() {
        assert_eq!("storage".parse::<NodeType>().unwrap(), NodeType::Storage);
        assert_eq!(NodeType::Distributor.to_string(), "distributor");
        assert!("gateway".parse::<NodeType>().is_err());
    }
}
