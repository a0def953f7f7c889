//! Difficulty retargeting (legacy 2016-block window, emergency difficulty adjustment, and the
//! weighted-target DAA) plus proof-of-work verification.

use crate::block_index::{BlockHash, BlockMap};
use crate::params::ConsensusParams;
use crate::uint256::Uint256;
use tracing::debug;

fn pow_limit(params: &ConsensusParams) -> Uint256 {
    Uint256::from_be_bytes(&params.pow_limit)
}

/// Decodes `bits` and clamps it to `pow_limit`, rejecting zero/negative/overflowing encodings.
fn decode_target(bits: u32, params: &ConsensusParams) -> Option<Uint256> {
    let (target, negative, overflow) = Uint256::set_compact(bits);
    if negative || overflow || target.is_zero() {
        return None;
    }
    if target > pow_limit(params) {
        return None;
    }
    Some(target)
}

pub fn check_proof_of_work(hash: &Uint256, bits: u32, params: &ConsensusParams) -> bool {
    match decode_target(bits, params) {
        Some(target) => hash <= &target,
        None => false,
    }
}

/// Median-by-time of `x`, `x.prev`, `x.prev.prev`, via a three-element compare-swap network.
fn suitable_block(map: &BlockMap, x: BlockHash) -> Option<BlockHash> {
    let n2 = map.get(&x)?;
    let n1_hash = n2.prev?;
    let n1 = map.get(&n1_hash)?;
    let n0_hash = n1.prev?;
    let n0 = map.get(&n0_hash)?;

    let mut blocks = [(n0_hash, n0.time), (n1_hash, n1.time), (n2.hash, n2.time)];
    if blocks[0].1 > blocks[2].1 {
        blocks.swap(0, 2);
    }
    if blocks[0].1 > blocks[1].1 {
        blocks.swap(0, 1);
    }
    if blocks[1].1 > blocks[2].1 {
        blocks.swap(1, 2);
    }
    Some(blocks[1].0)
}

/// `CalculateNextWorkRequired`: the on-interval legacy retarget, given the timestamp of the
/// first block of the outgoing window.
fn calculate_next_work_required(
    prev_bits: u32,
    prev_time: u32,
    first_block_time: u32,
    params: &ConsensusParams,
) -> u32 {
    if params.pow_no_retargeting {
        return prev_bits;
    }
    let actual = (prev_time as i64 - first_block_time as i64).max(0) as u64;
    let actual = actual
        .max(params.pow_target_timespan / 4)
        .min(params.pow_target_timespan * 4);

    let (mut target, _, _) = Uint256::set_compact(prev_bits);
    target = target * actual;
    target = target / params.pow_target_timespan;
    let limit = pow_limit(params);
    if target > limit {
        target = limit;
    }
    target.get_compact(false)
}

/// Walks back from `prev`, re-checking the testnet min-difficulty exception, to the last block
/// whose `bits` were not produced purely under that exception.
fn min_difficulty_fallback_bits(map: &BlockMap, prev: BlockHash, params: &ConsensusParams) -> u32 {
    let limit_bits = pow_limit(params).get_compact(false);
    let mut cur = map.get(&prev).expect("prev must exist");
    while let Some(prev_hash) = cur.prev {
        if cur.height % params.difficulty_adjustment_interval() == 0 || cur.bits != limit_bits {
            break;
        }
        cur = match map.get(&prev_hash) {
            Some(n) => n,
            None => break,
        };
    }
    cur.bits
}

/// Legacy regime combined with the emergency difficulty adjustment, matching the original's
/// `GetNextEDAWorkRequired`: on-interval blocks always retarget; off-interval blocks either
/// take the testnet min-difficulty shortcut, apply a 25% EDA cut, or inherit `prev.bits`.
fn eda_next_work_required(map: &BlockMap, prev: BlockHash, new_time: u32, params: &ConsensusParams) -> u32 {
    let limit_bits = pow_limit(params).get_compact(false);
    let prev_node = map.get(&prev).expect("prev must exist");

    if (prev_node.height + 1) % params.difficulty_adjustment_interval() == 0 {
        let first_height = prev_node.height + 1 - params.difficulty_adjustment_interval();
        let first_hash = map.get_ancestor(&prev, first_height).expect("window ancestor must exist");
        let first_time = map.get(&first_hash).expect("ancestor must exist").time;
        return calculate_next_work_required(prev_node.bits, prev_node.time, first_time, params);
    }

    if params.pow_allow_min_difficulty_blocks {
        if new_time > prev_node.time + (params.pow_target_spacing as u32) * 2 {
            return limit_bits;
        }
        return min_difficulty_fallback_bits(map, prev, params);
    }

    if prev_node.height < 6 {
        return prev_node.bits;
    }
    let six_back = map.get_ancestor(&prev, prev_node.height - 6).expect("6-back ancestor must exist");
    let mtp_now = map.median_time_past(&prev);
    let mtp_6 = map.median_time_past(&six_back);
    if mtp_now.saturating_sub(mtp_6) >= 12 * 3600 {
        let (bits_target, _, _) = Uint256::set_compact(prev_node.bits);
        let mut new_target = bits_target.clone() + (bits_target >> 2);
        let limit = pow_limit(params);
        if new_target > limit {
            new_target = limit;
        }
        debug!(height = prev_node.height + 1, "emergency difficulty adjustment triggered");
        return new_target.get_compact(false);
    }
    prev_node.bits
}

/// Weighted-target DAA (`GetNextCashWorkRequired`).
fn daa_next_work_required(map: &BlockMap, prev: BlockHash, new_block_time: u32, params: &ConsensusParams) -> u32 {
    let prev_node = map.get(&prev).expect("prev must exist");
    if prev_node.height == 0 {
        return pow_limit(params).get_compact(false);
    }

    if params.pow_allow_min_difficulty_blocks
        && new_block_time > prev_node.time + (params.pow_target_spacing as u32) * 2
    {
        return pow_limit(params).get_compact(false);
    }

    let first_anchor_height = prev_node.height.saturating_sub(144);
    let first_anchor = map.get_ancestor(&prev, first_anchor_height).expect("144-back ancestor must exist");
    let first = suitable_block(map, first_anchor).expect("suitable_block needs 3 ancestors");
    let last = suitable_block(map, prev).expect("suitable_block needs 3 ancestors");

    let first_node = map.get(&first).unwrap();
    let last_node = map.get(&last).unwrap();

    let mut actual_timespan = last_node.time as i64 - first_node.time as i64;
    let spacing = params.pow_target_spacing as i64;
    actual_timespan = actual_timespan.clamp(72 * spacing, 288 * spacing);

    let work = last_node.chain_work.clone() - first_node.chain_work.clone();
    let work = work * params.pow_target_spacing;
    let work = work / actual_timespan as u64;

    if work.is_zero() {
        return pow_limit(params).get_compact(false);
    }
    let mut target = work.complement() / work;
    let limit = pow_limit(params);
    if target > limit {
        target = limit;
    }
    target.get_compact(false)
}

/// Top-level dispatcher: picks DAA once `prev`'s median-time-past crosses the activation
/// threshold, else the legacy/EDA combination.
pub fn get_next_work_required(map: &BlockMap, prev: BlockHash, new_block_time: u32, params: &ConsensusParams) -> u32 {
    let mtp = map.median_time_past(&prev);
    if mtp >= params.cash_hard_fork_activation_time {
        daa_next_work_required(map, prev, new_block_time, params)
    } else {
        eda_next_work_required(map, prev, new_block_time, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_index::{BlockIndexNode, VALID_TRANSACTIONS};
    use crate::uint256::block_proof;

    fn test_params() -> ConsensusParams {
        ConsensusParams {
            pow_limit: {
                let mut b = [0xffu8; 32];
                b[0] = 0x00;
                b[1] = 0x00;
                b
            },
            pow_target_spacing: 600,
            pow_target_timespan: 14 * 24 * 3600,
            pow_allow_min_difficulty_blocks: false,
            pow_no_retargeting: false,
            cash_hard_fork_activation_time: u32::MAX,
            miner_confirmation_window: 144,
            rule_change_activation_threshold: 108,
            deployments: Vec::new(),
        }
    }

    fn hash_of(n: u32) -> BlockHash {
        let mut b = [0u8; 32];
        b[..4].copy_from_slice(&n.to_le_bytes());
        BlockHash(b)
    }

    fn build_constant_spacing_chain(len: u32, spacing: u32, bits: u32) -> (BlockMap, Vec<BlockHash>) {
        let mut map = BlockMap::new();
        let mut hashes = Vec::new();
        let mut chain_work = Uint256::zero();
        let (target, _, _) = Uint256::set_compact(bits);
        let proof = block_proof(&target);
        for h in 0..len {
            let hash = hash_of(h);
            let prev = if h == 0 { None } else { Some(hashes[(h - 1) as usize]) };
            chain_work = chain_work.clone() + proof.clone();
            map.insert(BlockIndexNode {
                hash,
                prev,
                skip: None,
                height: h,
                file: 0,
                data_offset: 0,
                undo_offset: 0,
                chain_work: chain_work.clone(),
                n_tx: 1,
                chain_tx: h as u64 + 1,
                status: VALID_TRANSACTIONS,
                version: 1,
                merkle_root: [0u8; 32],
                time: h * spacing,
                bits,
                nonce: 0,
                sequence_id: h as u64,
                time_max: h * spacing,
            });
            map.build_skip(&hash);
            hashes.push(hash);
        }
        (map, hashes)
    }

    #[test]
    fn check_proof_of_work_rejects_hash_above_target() {
        let params = test_params();
        let bits = pow_limit(&params).get_compact(false);
        let hash = pow_limit(&params) + Uint256::one();
        assert!(!check_proof_of_work(&hash, bits, &params));
    }

    #[test]
    fn check_proof_of_work_accepts_hash_at_target() {
        let params = test_params();
        let bits = pow_limit(&params).get_compact(false);
        let hash = pow_limit(&params);
        assert!(check_proof_of_work(&hash, bits, &params));
    }

    #[test]
    fn eda_off_interval_inherits_bits_without_trigger() {
        let params = test_params();
        let bits = 0x1d00ffff;
        let (map, hashes) = build_constant_spacing_chain(10, 600, bits);
        let next = eda_next_work_required(&map, *hashes.last().unwrap(), 6000, &params);
        assert_eq!(next, bits);
    }

    #[test]
    fn daa_stable_spacing_keeps_target_near_constant() {
        let params = test_params();
        let bits = 0x1d00ffff;
        let (map, hashes) = build_constant_spacing_chain(300, 600, bits);
        let tip = *hashes.last().unwrap();
        let new_block_time = 300 * 600;
        let next = daa_next_work_required(&map, tip, new_block_time, &params);
        let (orig_target, ..) = Uint256::set_compact(bits);
        let (next_target, ..) = Uint256::set_compact(next);
        let ratio = if next_target > orig_target {
            next_target.clone() - orig_target.clone()
        } else {
            orig_target.clone() - next_target.clone()
        };
        assert!(ratio < (orig_target / 10u64));
    }

    #[test]
    fn daa_min_difficulty_returns_pow_limit_after_timestamp_gap() {
        let mut params = test_params();
        params.pow_allow_min_difficulty_blocks = true;
        let bits = 0x1d00ffff;
        let (map, hashes) = build_constant_spacing_chain(200, 600, bits);
        let tip = *hashes.last().unwrap();
        let tip_time = map.get(&tip).unwrap().time;
        let gap_time = tip_time + params.pow_target_spacing as u32 * 2 + 1;
        let next = daa_next_work_required(&map, tip, gap_time, &params);
        assert_eq!(next, pow_limit(&params).get_compact(false));
    }

    #[test]
    fn daa_min_difficulty_falls_through_without_timestamp_gap() {
        let mut params = test_params();
        params.pow_allow_min_difficulty_blocks = true;
        let bits = 0x1d00ffff;
        let (map, hashes) = build_constant_spacing_chain(200, 600, bits);
        let tip = *hashes.last().unwrap();
        let tip_time = map.get(&tip).unwrap().time;
        let on_time = tip_time + params.pow_target_spacing as u32;
        let next = daa_next_work_required(&map, tip, on_time, &params);
        assert_ne!(next, pow_limit(&params).get_compact(false));
    }
}
