//! Height-indexed projection of a single "active" linear chain over the block-index DAG.

use crate::block_index::{BlockHash, BlockMap};
use tracing::debug;

#[derive(Default)]
pub struct ActiveChain {
    /// `vec[height] == hash of the node at that height`.
    vec: Vec<BlockHash>,
}

impl ActiveChain {
    pub fn new() -> Self {
        Self { vec: Vec::new() }
    }

    pub fn genesis(&self) -> Option<BlockHash> {
        self.vec.first().copied()
    }

    pub fn tip(&self) -> Option<BlockHash> {
        self.vec.last().copied()
    }

    pub fn height(&self) -> i64 {
        self.vec.len() as i64 - 1
    }

    pub fn at(&self, height: u32) -> Option<BlockHash> {
        self.vec.get(height as usize).copied()
    }

    pub fn contains(&self, map: &BlockMap, hash: &BlockHash) -> bool {
        map.get(hash).map(|n| self.at(n.height) == Some(*hash)).unwrap_or(false)
    }

    pub fn next(&self, map: &BlockMap, hash: &BlockHash) -> Option<BlockHash> {
        let node = map.get(hash)?;
        if !self.contains(map, hash) {
            return None;
        }
        self.at(node.height + 1)
    }

    /// Reprojects this chain so that `tip` becomes the new last element: resizes to
    /// `tip.height + 1`, then walks `prev` writing each height slot until it already matches.
    pub fn set_tip(&mut self, map: &BlockMap, tip: BlockHash) {
        let Some(tip_node) = map.get(&tip) else { return };
        debug!(height = tip_node.height, "set_tip");
        self.vec.resize(tip_node.height as usize + 1, BlockHash::zero());
        let mut cur = Some(tip);
        while let Some(h) = cur {
            let node = match map.get(&h) {
                Some(n) => n,
                None => break,
            };
            let slot = &mut self.vec[node.height as usize];
            if *slot == h {
                break;
            }
            *slot = h;
            cur = node.prev;
        }
    }

    /// Sparse back-walk list for peer negotiation of a common ancestor: doubling step after
    /// the first 10 entries, always including genesis.
    pub fn get_locator(&self, map: &BlockMap, from: Option<BlockHash>) -> Vec<BlockHash> {
        let mut out = Vec::new();
        let start = from.or_else(|| self.tip());
        let Some(start) = start else { return out };
        let Some(mut node_hash) = Some(start) else { return out };
        let mut step: u32 = 1;
        let mut count = 0u32;

        loop {
            out.push(node_hash);
            let node = match map.get(&node_hash) {
                Some(n) => n,
                None => break,
            };
            if node.height == 0 {
                break;
            }
            let target = node.height.saturating_sub(step);

            let next_hash = if self.contains(map, &node_hash) {
                self.at(target)
            } else {
                map.get_ancestor(&node_hash, target)
            };

            let Some(next_hash) = next_hash else { break };
            node_hash = next_hash;

            count += 1;
            if count >= 10 {
                step = step.saturating_mul(2);
            }
        }

        if out.last().and_then(|h| map.get(h)).map(|n| n.height) != Some(0) {
            if let Some(genesis) = self.genesis() {
                out.push(genesis);
            }
        }
        out
    }

    /// Walks `n` down to this chain's height, then back through `prev` until it lands on a
    /// node this chain actually contains.
    pub fn find_fork(&self, map: &BlockMap, n: BlockHash) -> Option<BlockHash> {
        let mut cur = n;
        let mut node = map.get(&cur)?;
        if node.height > self.height().max(0) as u32 {
            let target = self.height().max(0) as u32;
            cur = map.get_ancestor(&cur, target)?;
            node = map.get(&cur)?;
        }
        let _ = node;
        loop {
            if self.contains(map, &cur) {
                return Some(cur);
            }
            let prev = map.get(&cur)?.prev?;
            cur = prev;
        }
    }

    /// Binary search by `time_max` (monotonically non-decreasing along the chain) for the
    /// first node whose `time_max >= t`.
    pub fn find_earliest_at_least(&self, map: &BlockMap, t: u32) -> Option<BlockHash> {
        if self.vec.is_empty() {
            return None;
        }
        let mut lo = 0usize;
        let mut hi = self.vec.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let node = map.get(&self.vec[mid])?;
            if node.time_max >= t {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        if lo == self.vec.len() {
            None
        } else {
            Some(self.vec[lo])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_index::{BlockIndexNode, VALID_TRANSACTIONS};
    use crate::uint256::Uint256;

    fn hash_of(n: u32) -> BlockHash {
        let mut b = [0u8; 32];
        b[..4].copy_from_slice(&n.to_le_bytes());
        BlockHash(b)
    }

    fn build_chain(len: u32) -> (BlockMap, Vec<BlockHash>, ActiveChain) {
        let mut map = BlockMap::new();
        let mut hashes = Vec::new();
        for h in 0..len {
            let hash = hash_of(h);
            let prev = if h == 0 { None } else { Some(hashes[(h - 1) as usize]) };
            map.insert(BlockIndexNode {
                hash,
                prev,
                skip: None,
                height: h,
                file: 0,
                data_offset: 0,
                undo_offset: 0,
                chain_work: Uint256::from_u64(h as u64 + 1),
                n_tx: 1,
                chain_tx: h as u64 + 1,
                status: VALID_TRANSACTIONS,
                version: 1,
                merkle_root: [0u8; 32],
                time: h * 600,
                bits: 0x1d00ffff,
                nonce: 0,
                sequence_id: h as u64,
                time_max: h * 600,
            });
            map.build_skip(&hash);
            hashes.push(hash);
        }
        let mut chain = ActiveChain::new();
        chain.set_tip(&map, *hashes.last().unwrap());
        (map, hashes, chain)
    }

    #[test]
    fn set_tip_projects_full_chain() {
        let (_map, hashes, chain) = build_chain(50);
        assert_eq!(chain.height(), 49);
        for (h, hash) in hashes.iter().enumerate() {
            assert_eq!(chain.at(h as u32), Some(*hash));
        }
    }

    #[test]
    fn locator_always_includes_genesis() {
        let (map, hashes, chain) = build_chain(500);
        let locator = chain.get_locator(&map, None);
        assert_eq!(*locator.last().unwrap(), hashes[0]);
        assert_eq!(locator[0], *hashes.last().unwrap());
    }

    #[test]
    fn find_fork_on_common_ancestor() {
        let (map, hashes, chain) = build_chain(100);
        let fork = chain.find_fork(&map, hashes[30]);
        assert_eq!(fork, Some(hashes[30]));
    }

    #[test]
    fn find_earliest_at_least_matches_linear_scan() {
        let (map, _hashes, chain) = build_chain(200);
        for t in [0u32, 599, 600, 60000, 119999999] {
            let found = chain.find_earliest_at_least(&map, t);
            let expected = (0..=chain.height() as u32)
                .find(|&h| map.get(&chain.at(h).unwrap()).unwrap().time_max >= t)
                .map(|h| chain.at(h).unwrap());
            assert_eq!(found, expected, "t={}", t);
        }
    }
}
