//! idealstate Placement - deterministic hierarchical data placement
//!
//! This crate computes the "ideal state" of a partition: the storage nodes
//! that should hold its copies and the distributor node that owns it. The
//! answer depends only on the distribution configuration, the cluster
//! membership snapshot and the partition id, so every process computes the
//! same placement without coordination.
//!
//! # Algorithm
//!
//! - **Seeded draws**: every decision uses an XXH64 based draw over the
//!   partition's placement key and its position in the group graph
//! - **Weighted group split**: redundancy is split over child groups by
//!   configured capacity, top-down; copies a group has no eligible nodes for
//!   overflow to its siblings in rank order
//! - **Stable slots**: results are laid out over the placement that treats
//!   every node as eligible, so a failed node only gives up its own slot
//! - **Rendezvous node selection**: within a leaf group, nodes are ranked by
//!   their own weighted draw and the best eligible nodes win
//!
//! # Example
//! ```ignore
//! use idealstate_common::{ClusterState, DistributionConfig, PartitionId, StateSet};
//! use idealstate_placement::Distribution;
//!
//! let distribution = Distribution::from_config(DistributionConfig::flat(2, 10))?;
//! let state: ClusterState = "distributor:10 storage:10".parse()?;
//! let nodes = distribution.ideal_storage_nodes(
//!     &state,
//!     PartitionId::new(16, 1)?,
//!     StateSet::UP_INIT,
//! )?;
//! ```

pub mod distribution;
pub mod graph;
mod group_selector;
pub mod handle;
pub mod node_selector;
pub mod seed;
pub mod split;

pub use distribution::Distribution;
pub use graph::{Group, GroupId, GroupMembers, GroupNode, NodeGroupGraph};
pub use handle::DistributionHandle;
pub use node_selector::ScoredNode;
pub use seed::{SeedContext, seed};
