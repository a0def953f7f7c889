//! In-memory block-index node and the arena that owns the whole header DAG.
//!
//! Hashing is out of scope for this crate (see crate root docs): a [`BlockHash`] is an opaque
//! 32-byte value supplied by the caller, never computed here.

use crate::uint256::Uint256;

pub const VALID_UNKNOWN: u32 = 0;
pub const VALID_HEADER: u32 = 1;
pub const VALID_TREE: u32 = 2;
pub const VALID_TRANSACTIONS: u32 = 3;
pub const VALID_CHAIN: u32 = 4;
pub const VALID_SCRIPTS: u32 = 5;
const VALID_MASK: u32 = 0x07;

pub const HAVE_DATA: u32 = 8;
pub const HAVE_UNDO: u32 = 16;
pub const FAILED_VALID: u32 = 32;
pub const FAILED_CHILD: u32 = 64;
const FAILED_MASK: u32 = FAILED_VALID | FAILED_CHILD;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub const fn zero() -> Self {
        BlockHash([0u8; 32])
    }
}

/// Disk position of a stored block or undo record: `(-1, 0)` is the null sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskPos {
    pub file: i32,
    pub offset: u32,
}

impl DiskPos {
    pub const NULL: DiskPos = DiskPos { file: -1, offset: 0 };

    pub fn is_null(&self) -> bool {
        self.file == -1
    }
}

#[derive(Clone, Debug)]
pub struct BlockIndexNode {
    pub hash: BlockHash,
    pub prev: Option<BlockHash>,
    pub skip: Option<BlockHash>,
    pub height: u32,

    pub file: i32,
    pub data_offset: u32,
    pub undo_offset: u32,

    pub chain_work: Uint256,
    pub n_tx: u32,
    pub chain_tx: u64,
    pub status: u32,

    pub version: i32,
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,

    pub sequence_id: u64,
    pub time_max: u32,
}

impl BlockIndexNode {
    pub fn block_pos(&self) -> Option<DiskPos> {
        if self.status & HAVE_DATA != 0 {
            Some(DiskPos { file: self.file, offset: self.data_offset })
        } else {
            None
        }
    }

    pub fn undo_pos(&self) -> Option<DiskPos> {
        if self.status & HAVE_UNDO != 0 {
            Some(DiskPos { file: self.file, offset: self.undo_offset })
        } else {
            None
        }
    }

    pub fn block_hash(&self) -> BlockHash {
        self.hash
    }

    pub fn block_time(&self) -> u32 {
        self.time
    }

    pub fn block_time_max(&self) -> u32 {
        self.time_max
    }

    pub fn is_valid(&self, level: u32) -> bool {
        if self.status & FAILED_MASK != 0 {
            return false;
        }
        self.status & VALID_MASK >= level
    }

    /// Overwrites the validity nibble if it would rise; refuses once `FAILED_MASK` is set.
    pub fn raise_validity(&mut self, level: u32) -> bool {
        if self.status & FAILED_MASK != 0 {
            return false;
        }
        if self.status & VALID_MASK < level {
            self.status = (self.status & !VALID_MASK) | level;
            return true;
        }
        false
    }
}

/// `n & (n - 1)`: clears the lowest set bit.
fn invert_lowest_one(n: u32) -> u32 {
    n & n.wrapping_sub(1)
}

/// Height of the ancestor a node at height `h` should keep a direct skip-pointer to.
///
/// The odd-height branch applies `invert_lowest_one` twice to `h - 1`, matching
/// `CBlockIndex::GetSkipHeight` rather than a single-invert reading of the formula.
pub fn skip_height(h: u32) -> u32 {
    if h < 2 {
        return 0;
    }
    if h % 2 == 0 {
        invert_lowest_one(h)
    } else {
        invert_lowest_one(invert_lowest_one(h - 1)) + 1
    }
}

/// The header DAG, keyed by hash. Nodes are never removed: they live for the process lifetime
/// once inserted, referenced by descendants and by whichever chain projections point at them.
#[derive(Default)]
pub struct BlockMap {
    nodes: std::collections::HashMap<BlockHash, BlockIndexNode>,
}

impl BlockMap {
    pub fn new() -> Self {
        Self { nodes: std::collections::HashMap::new() }
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&BlockIndexNode> {
        self.nodes.get(hash)
    }

    pub fn get_mut(&mut self, hash: &BlockHash) -> Option<&mut BlockIndexNode> {
        self.nodes.get_mut(hash)
    }

    pub fn insert(&mut self, node: BlockIndexNode) {
        self.nodes.insert(node.hash, node);
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `median_time_past`: middle element of the `time` values over the last 11 nodes
    /// (self included), walking `prev`. Uses the available window if the chain is shorter.
    pub fn median_time_past(&self, start: &BlockHash) -> u32 {
        let mut times = Vec::with_capacity(11);
        let mut cur = Some(*start);
        for _ in 0..11 {
            let Some(h) = cur else { break };
            let Some(n) = self.get(&h) else { break };
            times.push(n.time);
            cur = n.prev;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// `build_skip`: must run after `prev` has its own skip pointer resolved.
    pub fn build_skip(&mut self, hash: &BlockHash) {
        let Some(node) = self.get(hash) else { return };
        let Some(prev_hash) = node.prev else { return };
        let target_height = skip_height(node.height);
        let skip = self.get_ancestor(&prev_hash, target_height);
        if let Some(n) = self.get_mut(hash) {
            n.skip = skip;
        }
    }

    /// Walks `prev`/`skip` edges to find the unique ancestor at `target_height`, bounded at
    /// roughly 110 hops up to 2^18 blocks back.
    pub fn get_ancestor(&self, from: &BlockHash, target_height: u32) -> Option<BlockHash> {
        let mut walk_hash = *from;
        let mut walk = self.get(&walk_hash)?;
        if target_height > walk.height {
            return None;
        }
        let mut height = walk.height;

        while height > target_height {
            let walk_skip_height = skip_height(height);
            let prev_skip_height = walk.prev.and_then(|p| self.get(&p)).map(|p| skip_height(p.height));

            let take_skip = walk.skip.is_some()
                && (walk_skip_height == target_height
                    || (walk_skip_height > target_height
                        && !(prev_skip_height.is_some()
                            && prev_skip_height.unwrap() < walk_skip_height.saturating_sub(2)
                            && prev_skip_height.unwrap() >= target_height)));

            if take_skip {
                walk_hash = walk.skip.expect("checked Some above");
                walk = self.get(&walk_hash)?;
                height = walk.height;
            } else {
                walk_hash = walk.prev.expect("target_height reachable, must have prev");
                walk = self.get(&walk_hash)?;
                height -= 1;
            }
        }
        Some(walk_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(n: u32) -> BlockHash {
        let mut b = [0u8; 32];
        b[..4].copy_from_slice(&n.to_le_bytes());
        BlockHash(b)
    }

    fn build_chain(len: u32) -> (BlockMap, Vec<BlockHash>) {
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
        (map, hashes)
    }

    #[test]
    fn skip_height_matches_double_invert() {
        assert_eq!(skip_height(0), 0);
        assert_eq!(skip_height(1), 0);
        assert_eq!(skip_height(4), 4 & 3);
        assert_eq!(skip_height(5), (invert_lowest_one(invert_lowest_one(4))) + 1);
    }

    #[test]
    fn get_ancestor_matches_linear_walk_for_small_chain() {
        let (map, hashes) = build_chain(200);
        let tip = hashes[199];
        for target in 0..=199u32 {
            let via_skip = map.get_ancestor(&tip, target).unwrap();
            let mut cur = tip;
            for _ in 0..(199 - target) {
                cur = map.get(&cur).unwrap().prev.unwrap();
            }
            assert_eq!(via_skip, cur, "target {}", target);
        }
    }

    #[test]
    fn raise_validity_is_idempotent() {
        let mut node = BlockIndexNode {
            hash: hash_of(0),
            prev: None,
            skip: None,
            height: 0,
            file: 0,
            data_offset: 0,
            undo_offset: 0,
            chain_work: Uint256::zero(),
            n_tx: 0,
            chain_tx: 0,
            status: VALID_HEADER,
            version: 1,
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
            sequence_id: 0,
            time_max: 0,
        };
        assert!(node.raise_validity(VALID_TREE));
        assert!(!node.raise_validity(VALID_TREE));
        assert!(!node.raise_validity(VALID_HEADER));
    }

    #[test]
    fn raise_validity_refused_after_failed() {
        let mut node = BlockIndexNode {
            hash: hash_of(0),
            prev: None,
            skip: None,
            height: 0,
            file: 0,
            data_offset: 0,
            undo_offset: 0,
            chain_work: Uint256::zero(),
            n_tx: 0,
            chain_tx: 0,
            status: VALID_HEADER | FAILED_VALID,
            version: 1,
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
            sequence_id: 0,
            time_max: 0,
        };
        assert!(!node.raise_validity(VALID_CHAIN));
    }

    #[test]
    fn median_time_past_short_chain() {
        let (map, hashes) = build_chain(5);
        let mtp = map.median_time_past(&hashes[4]);
        let mut times: Vec<u32> = (0..5).map(|h| h * 600).collect();
        times.sort_unstable();
        assert_eq!(mtp, times[2]);
    }
}
