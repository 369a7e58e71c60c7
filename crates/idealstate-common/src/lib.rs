//! idealstate Common - Shared types and utilities
//!
//! This crate provides the vocabulary shared by the placement engine and its
//! callers: node types and states, partition identifiers, the cluster
//! membership snapshot, the distribution configuration and the error type.

pub mod cluster;
pub mod config;
pub mod error;
pub mod types;

pub use cluster::{ClusterSnapshot, ClusterState};
pub use config::{DistributionConfig, GroupConfig, NodeConfig};
pub use error::{Error, ErrorKind, Result};
pub use types::*;
