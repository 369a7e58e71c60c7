//! Error types for ideal state computation
//!
//! This module defines the common error type used by the configuration layer
//! and the placement engine.

use crate::types::{NodeType, StateSet};
use thiserror::Error;

/// Common result type for idealstate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`], for callers that branch on the
/// condition rather than the exact variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration is malformed; no distribution can be built from it
    Configuration,
    /// The partition id has fewer significant bits than the cluster distributes on
    InsufficientPartitionBits,
    /// No node in an allowed state can hold the partition
    Unavailable,
    /// A value constructor was handed malformed input
    InvalidArgument,
}

/// Common error type for idealstate
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("configuration has no groups")]
    NoGroups,

    #[error("group {0} is defined more than once")]
    DuplicateGroup(u16),

    #[error("group {group} has invalid capacity {capacity}")]
    InvalidGroupCapacity { group: u16, capacity: f64 },

    #[error("node {node} in group {group} has invalid capacity {capacity}")]
    InvalidNodeCapacity { group: u16, node: u16, capacity: f64 },

    #[error("group {0} has both child groups and nodes")]
    MixedGroup(u16),

    #[error("group {0} has neither child groups nor nodes")]
    EmptyGroup(u16),

    #[error("group {parent} references unknown child group {child}")]
    UnknownChildGroup { parent: u16, child: u16 },

    #[error("group {0} is part of a reference cycle")]
    CyclicGroup(u16),

    #[error("group {0} is referenced by more than one parent")]
    SharedGroup(u16),

    #[error("group {0} is not reachable from the root group")]
    UnreachableGroup(u16),

    #[error("node {node} is listed in both group {first} and group {second}")]
    DuplicateNode { node: u16, first: u16, second: u16 },

    #[error("ready copies ({ready_copies}) exceed redundancy ({redundancy})")]
    ReadyCopiesExceedRedundancy { ready_copies: u16, redundancy: u16 },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    // Placement errors
    #[error(
        "partition {partition} uses {used_bits} bits, cluster distributes on {distribution_bits}"
    )]
    TooFewPartitionBits {
        partition: String,
        used_bits: u8,
        distribution_bits: u8,
    },

    #[error("no {node_type} nodes available in states '{states}'")]
    NoNodesAvailable { node_type: NodeType, states: StateSet },

    // Input errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Create a new configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create the "unavailable" error for a node type
    #[must_use]
    pub const fn no_nodes_available(node_type: NodeType, states: StateSet) -> Self {
        Self::NoNodesAvailable { node_type, states }
    }

    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoGroups
            | Self::DuplicateGroup(_)
            | Self::InvalidGroupCapacity { .. }
            | Self::InvalidNodeCapacity { .. }
            | Self::MixedGroup(_)
            | Self::EmptyGroup(_)
            | Self::UnknownChildGroup { .. }
            | Self::CyclicGroup(_)
            | Self::SharedGroup(_)
            | Self::UnreachableGroup(_)
            | Self::DuplicateNode { .. }
            | Self::ReadyCopiesExceedRedundancy { .. }
            | Self::Configuration(_)
            | Self::Serialization(_)
            | Self::Deserialization(_) => ErrorKind::Configuration,
            Self::TooFewPartitionBits { .. } => ErrorKind::InsufficientPartitionBits,
            Self::NoNodesAvailable { .. } => ErrorKind::Unavailable,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Check if retrying with a refreshed cluster snapshot may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable)
    }

    /// Check if this error came from a malformed configuration
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration)
    }
}

/// Configuration text that failed to parse
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}
