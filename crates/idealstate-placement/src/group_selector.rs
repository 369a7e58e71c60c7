//! Group selection
//!
//! Storage copies are spread top-down. Each group receives a base share and
//! an overflow share from its parent, and hands them on to all of its child
//! groups:
//!
//! 1. the base share `B` is split by configured capacity: every child gets
//!    `floor(B * w / W)` and the units lost to rounding go one each to the
//!    best-ranked children
//! 2. a child keeps no more of its base than it has eligible nodes
//! 3. the units capped away, plus the overflow share, go in rank order to
//!    children with eligible nodes left
//!
//! and the split is applied recursively until leaf groups are reached. Node
//! states only enter through the caps in steps 2 and 3. A node that is not
//! selected can change state without moving any copy, and a selected node
//! dropping out moves exactly one.
//!
//! The eligible counts are taken once per call for every group, so a
//! storage placement reads the state of every storage node in the graph.
//! Distributor ownership uses a single path instead: the best-ranked child
//! with an eligible distributor at every level, which reads each
//! distributor state at most once per level.

use crate::graph::{GroupId, NodeGroupGraph};
use crate::seed::{Draw, SeedContext};
use idealstate_common::{ClusterSnapshot, Error, NodeType, Result, StateSet};

/// Redundancy assigned to one leaf group during a single placement call
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ResultGroup {
    pub group: GroupId,
    pub redundancy: u16,
}

/// Copies handed to a child group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Share {
    /// Kept from the capacity split of the parent's base
    base: usize,
    /// Overflow from siblings or ancestors that ran out of eligible nodes
    extra: usize,
}

impl Share {
    const fn total(self) -> usize {
        self.base + self.extra
    }
}

/// Rank the children of an internal group, best first
fn rank_children(
    graph: &NodeGroupGraph,
    id: GroupId,
    key: u64,
    context: SeedContext,
) -> Vec<Draw<GroupId>> {
    let parent = graph.group(id);
    let mut draws: Vec<Draw<GroupId>> = parent
        .children()
        .iter()
        .map(|&child| {
            let group = graph.group(child);
            Draw::new(child, group.index(), group.capacity(), key, context, parent.path())
        })
        .collect();
    draws.sort_by(Draw::rank_cmp);
    draws
}

/// Split `redundancy` over ranked capacities, best first
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn apportion(redundancy: usize, capacities: &[f64]) -> Vec<usize> {
    if capacities.is_empty() {
        return Vec::new();
    }
    let total_capacity: f64 = capacities.iter().sum();
    let wanted = redundancy as f64;
    let mut shares: Vec<usize> = capacities
        .iter()
        .map(|w| (wanted * w / total_capacity).floor() as usize)
        .collect();

    let mut assigned: usize = shares.iter().sum();
    // Rounding may leave the floors one unit too high; take it back from the
    // worst-ranked children.
    for share in shares.iter_mut().rev() {
        if assigned <= redundancy {
            break;
        }
        let take = (*share).min(assigned - redundancy);
        *share -= take;
        assigned -= take;
    }
    let count = shares.len();
    for unit in 0..redundancy - assigned {
        shares[unit % count] += 1;
    }
    shares
}

/// Split a group's share over its ranked children, given as (capacity,
/// eligible node count), best first
///
/// Overflow that finds no child with eligible nodes left is dropped.
fn split_share(share: Share, children: &[(f64, usize)]) -> Vec<Share> {
    let capacities: Vec<f64> = children.iter().map(|&(w, _)| w).collect();
    let mut excess = share.extra;
    let kept: Vec<usize> = apportion(share.base, &capacities)
        .into_iter()
        .zip(children)
        .map(|(base, &(_, eligible))| {
            excess += base.saturating_sub(eligible);
            base.min(eligible)
        })
        .collect();

    kept.into_iter()
        .zip(children)
        .map(|(base, &(_, eligible))| {
            let extra = (eligible - base).min(excess);
            excess -= extra;
            Share { base, extra }
        })
        .collect()
}

/// Assign `redundancy` storage copies to leaf groups
///
/// The sum of the assigned redundancies is `redundancy`, or the number of
/// eligible storage nodes when there are fewer. Results are ordered by group.
pub(crate) fn select_storage_groups<S>(
    graph: &NodeGroupGraph,
    key: u64,
    snapshot: &S,
    states: StateSet,
    redundancy: u16,
) -> Result<Vec<ResultGroup>>
where
    S: ClusterSnapshot + ?Sized,
{
    if redundancy == 0 {
        return Ok(Vec::new());
    }
    let eligible = graph.counts_in_states(snapshot, NodeType::Storage, states);
    if eligible[graph.root().slot()] == 0 {
        return Err(Error::no_nodes_available(NodeType::Storage, states));
    }
    Ok(split_redundancy(graph, key, &eligible, redundancy))
}

/// Leaf groups the copies of `key` land on when every node is eligible
///
/// These are the home groups of the result slots; [`select_storage_groups`]
/// gives the same answer for a snapshot where every storage node is allowed.
pub(crate) fn nominal_storage_groups(
    graph: &NodeGroupGraph,
    key: u64,
    redundancy: u16,
) -> Vec<ResultGroup> {
    let sizes: Vec<usize> = graph
        .groups()
        .map(|(_, group)| group.subtree_nodes().len())
        .collect();
    split_redundancy(graph, key, &sizes, redundancy)
}

fn split_redundancy(
    graph: &NodeGroupGraph,
    key: u64,
    eligible: &[usize],
    redundancy: u16,
) -> Vec<ResultGroup> {
    let mut result = Vec::new();
    let share = Share {
        base: usize::from(redundancy),
        extra: 0,
    };
    assign(graph, graph.root(), key, eligible, share, &mut result);
    result.sort_unstable();
    result
}

fn assign(
    graph: &NodeGroupGraph,
    id: GroupId,
    key: u64,
    eligible: &[usize],
    share: Share,
    result: &mut Vec<ResultGroup>,
) {
    if graph.group(id).is_leaf() {
        let redundancy = share.total().min(eligible[id.slot()]);
        if redundancy > 0 {
            result.push(ResultGroup {
                group: id,
                redundancy: u16::try_from(redundancy).unwrap_or(u16::MAX),
            });
        }
        return;
    }

    let ranked: Vec<GroupId> = rank_children(graph, id, key, SeedContext::Storage)
        .into_iter()
        .map(|draw| draw.item)
        .collect();
    let children: Vec<(f64, usize)> = ranked
        .iter()
        .map(|&child| (graph.group(child).capacity(), eligible[child.slot()]))
        .collect();
    let shares = split_share(share, &children);

    tracing::trace!(
        group = graph.group(id).index(),
        base = share.base,
        extra = share.extra,
        ?shares,
        "split redundancy over child groups"
    );
    for (&child, &share) in ranked.iter().zip(&shares) {
        if share.total() > 0 {
            assign(graph, child, key, eligible, share, result);
        }
    }
}

/// Leaf group the distributor for `key` is chosen from
///
/// Descends one group per level, taking the best-ranked child that has a
/// distributor in an allowed state. `None` when no such distributor exists.
pub(crate) fn select_distributor_leaf<S>(
    graph: &NodeGroupGraph,
    key: u64,
    snapshot: &S,
    states: StateSet,
) -> Option<GroupId>
where
    S: ClusterSnapshot + ?Sized,
{
    let mut current = graph.root();
    if !graph.any_in_states(current, snapshot, NodeType::Distributor, states) {
        return None;
    }
    while !graph.group(current).is_leaf() {
        current = rank_children(graph, current, key, SeedContext::Distributor)
            .into_iter()
            .find(|draw| graph.any_in_states(draw.item, snapshot, NodeType::Distributor, states))?
            .item;
    }
    Some(current)
}
