//! Shared distribution handle
//!
//! Reconfiguration never mutates a [`Distribution`]. A new one is built and
//! swapped in; callers holding the previous `Arc` finish their queries
//! against the configuration they started with.

use crate::distribution::Distribution;
use idealstate_common::{DistributionConfig, Result};
use parking_lot::RwLock;
use std::sync::Arc;

/// Swappable reference to the current distribution
#[derive(Debug)]
pub struct DistributionHandle {
    current: RwLock<Arc<Distribution>>,
}

impl DistributionHandle {
    /// Create a handle holding `distribution`
    #[must_use]
    pub fn new(distribution: Distribution) -> Self {
        Self {
            current: RwLock::new(Arc::new(distribution)),
        }
    }

    /// Distribution in effect right now
    #[must_use]
    pub fn current(&self) -> Arc<Distribution> {
        Arc::clone(&self.current.read())
    }

    /// Swap in `distribution`
    ///
    /// Returns `false` and keeps the current instance when both have the same
    /// serialized configuration.
    pub fn replace(&self, distribution: Distribution) -> bool {
        let mut current = self.current.write();
        if **current == distribution {
            tracing::debug!("distribution configuration unchanged, keeping current");
            return false;
        }
        tracing::debug!(
            from = %current,
            to = %distribution,
            "swapping distribution configuration"
        );
        *current = Arc::new(distribution);
        true
    }

    /// Build a distribution from `config` and swap it in
    pub fn reconfigure(&self, config: DistributionConfig) -> Result<bool> {
        Ok(self.replace(Distribution::from_config(config)?))
    }
}
