//! Distribution configuration
//!
//! The configuration describes the group hierarchy and the replication
//! settings of a content cluster. The first entry of `groups` is the root.
//! Its canonical string form is compact JSON in field declaration order; two
//! configurations are the same configuration iff their canonical strings are
//! equal.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const fn default_capacity() -> f64 {
    1.0
}

const fn default_true() -> bool {
    true
}

/// A physical node listed in a leaf group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node index, shared by the storage and distributor node on a host
    pub index: u16,
    /// Relative capacity within the leaf group
    #[serde(default = "default_capacity")]
    pub capacity: f64,
}

impl NodeConfig {
    /// Node with unit capacity
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self {
            index,
            capacity: 1.0,
        }
    }

    /// Node with the given capacity
    #[must_use]
    pub const fn with_capacity(index: u16, capacity: f64) -> Self {
        Self { index, capacity }
    }
}

/// A group in the placement hierarchy
///
/// A group either lists child groups (by index) or nodes, never both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Index of the group, unique within the configuration
    pub index: u16,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Relative capacity among sibling groups
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    /// Child group indices (internal groups only)
    #[serde(default)]
    pub children: Vec<u16>,
    /// Nodes (leaf groups only)
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl GroupConfig {
    /// Create a leaf group of unit-capacity nodes
    #[must_use]
    pub fn leaf(
        index: u16,
        name: impl Into<String>,
        capacity: f64,
        nodes: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            capacity,
            children: Vec::new(),
            nodes: nodes.into_iter().map(NodeConfig::new).collect(),
        }
    }

    /// Create an internal group over the given child group indices
    #[must_use]
    pub fn branch(
        index: u16,
        name: impl Into<String>,
        capacity: f64,
        children: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            capacity,
            children: children.into_iter().collect(),
            nodes: Vec::new(),
        }
    }

    /// Check whether this is a leaf group
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && !self.nodes.is_empty()
    }
}

/// Distribution configuration of a content cluster
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Number of copies kept of each partition
    pub redundancy: u16,
    /// Number of copies that must be written before a new partition is acknowledged
    #[serde(default)]
    pub initial_redundancy: u16,
    /// Number of copies kept ready (indexed) for serving
    #[serde(default)]
    pub ready_copies: u16,
    /// Distribution of a global space, where every node holds every partition
    #[serde(default)]
    pub global: bool,
    /// Treat one copy per leaf group as active
    #[serde(default)]
    pub active_per_leaf_group: bool,
    /// Require the primary copy to be persisted before acknowledging writes
    #[serde(default = "default_true")]
    pub ensure_primary_persisted: bool,
    /// Group hierarchy, root first
    pub groups: Vec<GroupConfig>,
}

impl DistributionConfig {
    /// Single leaf group holding nodes `0..node_count`
    ///
    /// This is the simplest possible setup, with no hierarchical grouping.
    #[must_use]
    pub fn flat(redundancy: u16, node_count: u16) -> Self {
        Self {
            redundancy,
            initial_redundancy: 0,
            ready_copies: 0,
            global: false,
            active_per_leaf_group: false,
            ensure_primary_persisted: true,
            groups: vec![GroupConfig::leaf(0, "root", 1.0, 0..node_count)],
        }
    }

    /// Hierarchical configuration from a group list, root first
    #[must_use]
    pub fn hierarchical(redundancy: u16, groups: Vec<GroupConfig>) -> Self {
        Self {
            groups,
            ..Self::flat(redundancy, 0)
        }
    }

    /// Parse a canonical configuration string
    pub fn from_canonical_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Render the canonical configuration string
    pub fn to_canonical_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Root group entry
    #[must_use]
    pub fn root(&self) -> Option<&GroupConfig> {
        self.groups.first()
    }

    /// Total number of node entries across all groups
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.groups.iter().map(|g| g.nodes.len()).sum()
    }

    /// Validate the replication settings
    ///
    /// The group hierarchy itself is validated when the placement graph is
    /// built from it.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(Error::NoGroups);
        }
        if self.ready_copies > self.redundancy {
            return Err(Error::ReadyCopiesExceedRedundancy {
                ready_copies: self.ready_copies,
                redundancy: self.redundancy,
            });
        }
        if self.initial_redundancy > self.redundancy {
            return Err(Error::configuration(format!(
                "initial redundancy ({}) exceeds redundancy ({})",
                self.initial_redundancy, self.redundancy
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_config() {
        let config = DistributionConfig::flat(2, 10);
        assert_eq!(config.redundancy, 2);
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.node_count(), 10);
        assert!(config.root().unwrap().is_leaf());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_canonical_round_trip_is_stable() {
        let config = DistributionConfig::hierarchical(
            3,
            vec![
                GroupConfig::branch(0, "root", 1.0, [1, 2]),
                GroupConfig::leaf(1, "rack-a", 1.0, 0..3),
                GroupConfig::leaf(2, "rack-b", 2.0, 3..6),
            ],
        );
        let text = config.to_canonical_string().unwrap();
        let parsed = DistributionConfig::from_canonical_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.to_canonical_string().unwrap(), text);
    }

    #[test]
    fn test_defaults_when_parsing() {
        let text = r#"{"redundancy":2,"groups":[{"index":0,"nodes":[{"index":0},{"index":1,"capacity":2.5}]}]}"#;
        let config = DistributionConfig::from_canonical_str(text).unwrap();
        assert_eq!(config.initial_redundancy, 0);
        assert!(config.ensure_primary_persisted);
        assert!(!config.global);
        let root = config.root().unwrap();
        assert!((root.capacity - 1.0).abs() < f64::EPSILON);
        assert!((root.nodes[1].capacity - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_malformed_string() {
        let err = DistributionConfig::from_canonical_str("{\"redundancy\":").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_ready_copies_validation() {
        let mut config = DistributionConfig::flat(2, 4);
        config.ready_copies = 3;
        assert!(matches!(
            config.validate(),
            Err(Error::ReadyCopiesExceedRedundancy { .. })
        ));

        let mut config = DistributionConfig::flat(2, 4);
        config.initial_redundancy = 3;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.is_configuration());
    }
}
