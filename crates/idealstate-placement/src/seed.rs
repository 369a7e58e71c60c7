//! Seeded draws for placement decisions
//!
//! Every choice the placement engine makes (which child group gets a copy,
//! which node in a leaf group is picked) is driven by a 32-bit draw that
//! depends only on the partition's placement key, the kind of node being
//! selected and the position in the group graph. Draws never depend on
//! memory layout, map iteration order or process-local randomness, so
//! independently running processes agree on every placement.
//!
//! # Draw formula
//!
//! ```text
//! h    = XXH64(seed = 0, tag || key_le64 || path[0]_le16 || ... || item_le16)
//! draw = low32(h) ^ high32(h)
//! tag  = 0x53 for storage selection, 0x44 for distributor selection
//! ```
//!
//! A draw is turned into a weighted score with the exponential race used by
//! straw2 buckets:
//!
//! ```text
//! u     = (draw + 1) / 2^32          in (0, 1]
//! score = ln(u) / weight             in (-inf, 0]
//! ```
//!
//! The highest score wins; an item wins against the others with probability
//! proportional to its weight. Equal scores rank the lower index first.
//!
//! This formula is the cross-process placement contract. Changing any part
//! of it moves data.

use idealstate_common::NodeType;
use std::cmp::Ordering;
use xxhash_rust::xxh64::Xxh64;

const DRAW_RANGE: f64 = 4_294_967_296.0;

/// Which selection a draw is made for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeedContext {
    /// Storage node and storage group selection
    Storage,
    /// Distributor node and distributor group selection
    Distributor,
}

impl SeedContext {
    const fn tag(self) -> u8 {
        match self {
            Self::Storage => 0x53,
            Self::Distributor => 0x44,
        }
    }
}

impl From<NodeType> for SeedContext {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Storage => Self::Storage,
            NodeType::Distributor => Self::Distributor,
        }
    }
}

/// Draw for `item` (a child group index or node index) below the group at
/// `path`.
#[must_use]
pub fn seed(key: u64, context: SeedContext, path: &[u16], item: u16) -> u32 {
    let mut hasher = Xxh64::new(0);
    hasher.update(&[context.tag()]);
    hasher.update(&key.to_le_bytes());
    for index in path {
        hasher.update(&index.to_le_bytes());
    }
    hasher.update(&item.to_le_bytes());
    let h = hasher.digest();
    (h as u32) ^ ((h >> 32) as u32)
}

/// Weighted score of a draw; `weight` must be positive and finite
#[inline]
#[must_use]
pub fn weighted_score(draw: u32, weight: f64) -> f64 {
    let u = (f64::from(draw) + 1.0) / DRAW_RANGE;
    u.ln() / weight
}

/// A scored candidate in a ranking
#[derive(Clone, Copy, Debug)]
pub struct Draw<T> {
    /// The candidate itself
    pub item: T,
    /// Configured index of the candidate, used to break ties
    pub index: u16,
    /// Weighted score, higher ranks first
    pub score: f64,
}

impl<T> Draw<T> {
    /// Score `item` for the draw made at `path`/`index`
    #[must_use]
    pub fn new(
        item: T,
        index: u16,
        weight: f64,
        key: u64,
        context: SeedContext,
        path: &[u16],
    ) -> Self {
        let score = weighted_score(seed(key, context, path, index), weight);
        Self { item, index, score }
    }

    /// Ranking order: higher score first, then lower index
    #[must_use]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.index.cmp(&other.index))
    }
}
