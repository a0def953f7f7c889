//! BIP9-style per-deployment soft-fork threshold state machine.
//!
//! Generalizes `rubin-consensus/src/featurebits.rs`'s deployment evaluation (which works from
//! externally precomputed per-window signal counts) into a node-walking FSM that owns its own
//! per-boundary cache, matching `versionbits.cpp`.

use crate::block_index::{BlockHash, BlockMap};
use crate::params::{ConsensusParams, Deployment};
use std::collections::HashMap;
use tracing::debug;

pub const VERSIONBITS_TOP_BITS: i32 = 0x2000_0000;
pub const VERSIONBITS_TOP_MASK: u32 = 0xE000_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

fn condition(node: &crate::block_index::BlockIndexNode, deployment: &Deployment) -> bool {
    let version = node.version as u32;
    version & VERSIONBITS_TOP_MASK == VERSIONBITS_TOP_BITS as u32
        && version & (1u32 << deployment.bit) != 0
}

/// Per-deployment memo of the state already computed at a given period boundary. `None` keys
/// the state of "no predecessor" (i.e. the boundary at or before genesis).
#[derive(Default)]
pub struct VersionBitsCache {
    cache: HashMap<Option<BlockHash>, ThresholdState>,
}

impl VersionBitsCache {
    pub fn new() -> Self {
        Self { cache: HashMap::new() }
    }
}

/// Ancestor at `height - delta`, saturating at genesis; `None` input means "no predecessor".
fn ancestor_back(map: &BlockMap, node: Option<BlockHash>, delta: u32) -> Option<BlockHash> {
    let hash = node?;
    let height = map.get(&hash)?.height;
    if delta > height {
        return None;
    }
    map.get_ancestor(&hash, height - delta)
}

/// Normalizes `prev` to the last block of the period preceding it.
fn normalize_to_period_boundary(map: &BlockMap, prev: Option<BlockHash>, period: u32) -> Option<BlockHash> {
    let hash = prev?;
    let height = map.get(&hash)?.height;
    let back = (height + 1) % period;
    map.get_ancestor(&hash, height - back)
}

fn median_time_past_opt(map: &BlockMap, node: Option<BlockHash>) -> u32 {
    match node {
        Some(h) => map.median_time_past(&h),
        None => 0,
    }
}

pub fn state_for(
    map: &BlockMap,
    cache: &mut VersionBitsCache,
    prev: Option<BlockHash>,
    deployment: &Deployment,
    params: &ConsensusParams,
) -> ThresholdState {
    let period = params.miner_confirmation_window;
    let threshold = params.rule_change_activation_threshold;

    let mut walk = normalize_to_period_boundary(map, prev, period);
    let mut worklist = Vec::new();

    let mut state = loop {
        if let Some(state) = cache.cache.get(&walk) {
            break *state;
        }
        match walk {
            None => {
                cache.cache.insert(None, ThresholdState::Defined);
                break ThresholdState::Defined;
            }
            Some(h) => {
                if median_time_past_opt(map, Some(h)) < deployment.start_time {
                    cache.cache.insert(Some(h), ThresholdState::Defined);
                    break ThresholdState::Defined;
                }
                worklist.push(h);
                walk = ancestor_back(map, Some(h), period);
            }
        }
    };

    while let Some(node) = worklist.pop() {
        state = advance(map, state, node, threshold, period, deployment, params);
        cache.cache.insert(Some(node), state);
    }
    state
}

fn advance(
    map: &BlockMap,
    state: ThresholdState,
    node: BlockHash,
    threshold: u32,
    period: u32,
    deployment: &Deployment,
    _params: &ConsensusParams,
) -> ThresholdState {
    let mtp = map.median_time_past(&node);
    match state {
        ThresholdState::Defined => {
            if mtp >= deployment.timeout {
                ThresholdState::Failed
            } else if mtp >= deployment.start_time {
                ThresholdState::Started
            } else {
                ThresholdState::Defined
            }
        }
        ThresholdState::Started => {
            if mtp >= deployment.timeout {
                return ThresholdState::Failed;
            }
            let mut count = 0u32;
            let mut cur = Some(node);
            for _ in 0..period {
                let Some(h) = cur else { break };
                let Some(n) = map.get(&h) else { break };
                if condition(n, deployment) {
                    count += 1;
                }
                cur = n.prev;
            }
            if count >= threshold {
                debug!(bit = deployment.bit, "versionbits deployment locked in");
                ThresholdState::LockedIn
            } else {
                ThresholdState::Started
            }
        }
        ThresholdState::LockedIn => {
            debug!(bit = deployment.bit, "versionbits deployment active");
            ThresholdState::Active
        }
        ThresholdState::Active | ThresholdState::Failed => state,
    }
}

/// `height + 1` of the earliest period boundary sharing `prev`'s current state.
pub fn state_since_height_for(
    map: &BlockMap,
    cache: &mut VersionBitsCache,
    prev: Option<BlockHash>,
    deployment: &Deployment,
    params: &ConsensusParams,
) -> u32 {
    let initial = state_for(map, cache, prev, deployment, params);
    if initial == ThresholdState::Defined {
        return 0;
    }
    let period = params.miner_confirmation_window;
    let mut boundary = normalize_to_period_boundary(map, prev, period);
    let mut prev_period_parent = ancestor_back(map, boundary, period);

    while let Some(parent) = prev_period_parent {
        if state_for(map, cache, Some(parent), deployment, params) != initial {
            break;
        }
        boundary = Some(parent);
        prev_period_parent = ancestor_back(map, boundary, period);
    }

    match boundary {
        Some(h) => map.get(&h).map(|n| n.height + 1).unwrap_or(0),
        None => 0,
    }
}
