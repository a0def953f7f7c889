//! Layered, write-back UTXO cache stack.
//!
//! A [`CoinsViewCache`] wraps any [`CoinsView`] (including another cache) and tracks, per
//! outpoint, whether a locally-held coin differs from its base (`DIRTY`) and whether the base
//! has no matching entry at all (`FRESH`). `flush`/`batch_write` implement the merge protocol
//! that lets an arbitrarily deep stack of caches behave exactly like one direct view.

use crate::block_index::BlockHash;
use crate::coin::{Coin, Outpoint};
use std::collections::HashMap;
use tracing::debug;

pub const CACHE_DIRTY: u8 = 1;
pub const CACHE_FRESH: u8 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub coin: Coin,
    pub flags: u8,
}

impl CacheEntry {
    fn is_dirty(&self) -> bool {
        self.flags & CACHE_DIRTY != 0
    }

    fn is_fresh(&self) -> bool {
        self.flags & CACHE_FRESH != 0
    }

    fn memory_usage(&self) -> usize {
        std::mem::size_of::<CacheEntry>() + self.coin.script.len()
    }
}

pub trait CoinsView {
    fn get_coin(&self, op: &Outpoint) -> Option<Coin>;

    fn have_coin(&self, op: &Outpoint) -> bool {
        self.get_coin(op).map(|c| !c.is_spent()).unwrap_or(false)
    }

    fn get_best_block(&self) -> BlockHash;

    /// Applies `entries` (the dirty subset of a child cache's map) atomically; `false` means
    /// the caller must treat the current reorg/flush attempt as failed.
    fn batch_write(&mut self, entries: Vec<(Outpoint, CacheEntry)>, best_block: BlockHash) -> bool;

    fn cursor(&self) -> Vec<(Outpoint, Coin)>;

    fn estimate_size(&self) -> usize {
        0
    }
}

/// A minimal leaf view for tests and for hosts that want an in-memory-only backing store.
#[derive(Default)]
pub struct MemoryCoinsView {
    coins: HashMap<Outpoint, Coin>,
    best_block: BlockHash,
}

impl MemoryCoinsView {
    pub fn new() -> Self {
        Self { coins: HashMap::new(), best_block: BlockHash::zero() }
    }
}

impl CoinsView for MemoryCoinsView {
    fn get_coin(&self, op: &Outpoint) -> Option<Coin> {
        self.coins.get(op).cloned()
    }

    fn get_best_block(&self) -> BlockHash {
        self.best_block
    }

    fn batch_write(&mut self, entries: Vec<(Outpoint, CacheEntry)>, best_block: BlockHash) -> bool {
        for (op, entry) in entries {
            if entry.coin.is_spent() {
                self.coins.remove(&op);
            } else {
                self.coins.insert(op, entry.coin);
            }
        }
        self.best_block = best_block;
        true
    }

    fn cursor(&self) -> Vec<(Outpoint, Coin)> {
        self.coins.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    fn estimate_size(&self) -> usize {
        self.coins.len() * std::mem::size_of::<Coin>()
    }
}

pub struct CoinsViewCache {
    base: Box<dyn CoinsView>,
    map: HashMap<Outpoint, CacheEntry>,
    best_block: BlockHash,
    memory_usage: usize,
}

impl CoinsViewCache {
    pub fn new(base: Box<dyn CoinsView>) -> Self {
        let best_block = base.get_best_block();
        Self { base, map: HashMap::new(), best_block, memory_usage: 0 }
    }

    pub fn dynamic_memory_usage(&self) -> usize {
        self.memory_usage
    }

    /// Pulls an entry from the base into the local map if not already present. Returns whether
    /// an entry now exists locally.
    fn fetch(&mut self, op: &Outpoint) -> bool {
        if self.map.contains_key(op) {
            return true;
        }
        match self.base.get_coin(op) {
            None => false,
            Some(coin) => {
                let flags = if coin.is_spent() { CACHE_FRESH } else { 0 };
                let entry = CacheEntry { coin, flags };
                self.memory_usage += entry.memory_usage();
                self.map.insert(*op, entry);
                true
            }
        }
    }

    pub fn get_coin(&mut self, op: &Outpoint) -> Option<Coin> {
        if self.fetch(op) {
            Some(self.map.get(op).unwrap().coin.clone())
        } else {
            None
        }
    }

    pub fn have_coin(&mut self, op: &Outpoint) -> bool {
        self.fetch(op) && !self.map.get(op).unwrap().coin.is_spent()
    }

    pub fn access_coin(&mut self, op: &Outpoint) -> Coin {
        if self.fetch(op) {
            self.map.get(op).unwrap().coin.clone()
        } else {
            Coin::spent()
        }
    }

    /// Creates a coin at `op`. Operates purely on the local map: an outpoint with no local
    /// entry is treated as an implicit spent placeholder with flags `0`, exactly as if the
    /// entry had already been checked and found pruned, without consulting the base. A coin
    /// with an unspendable script (e.g. `OP_RETURN`) is never worth caching and is dropped
    /// silently, matching `CCoinsViewCache::AddCoin`.
    pub fn add_coin(&mut self, op: Outpoint, coin: Coin, maybe_overwrite: bool) {
        assert!(!coin.is_spent(), "add_coin: coin must not already be spent");
        if coin.is_unspendable() {
            return;
        }

        let (existing_is_spent, existing_flags) = match self.map.get(&op) {
            Some(e) => (e.coin.is_spent(), e.flags),
            None => (true, 0),
        };

        let fresh = if maybe_overwrite {
            false
        } else {
            if !existing_is_spent {
                panic!("add_coin: replacing non-pruned entry without maybe_overwrite");
            }
            existing_flags & CACHE_DIRTY == 0
        };

        let new_flags = CACHE_DIRTY | if fresh { CACHE_FRESH } else { 0 };
        let entry = CacheEntry { coin, flags: new_flags };
        if let Some(old) = self.map.insert(op, entry) {
            self.memory_usage -= old.memory_usage();
        }
        self.memory_usage += self.map.get(&op).unwrap().memory_usage();
    }

    /// Returns `false` if the outpoint is not present. On success, `out` (if given) receives a
    /// copy of the spent coin's prior value.
    pub fn spend_coin(&mut self, op: &Outpoint, out: Option<&mut Coin>) -> bool {
        if !self.fetch(op) {
            return false;
        }
        let entry = self.map.get(op).unwrap().clone();
        if let Some(slot) = out {
            *slot = entry.coin.clone();
        }
        if entry.is_fresh() {
            let removed = self.map.remove(op).unwrap();
            self.memory_usage -= removed.memory_usage();
        } else {
            self.memory_usage -= entry.memory_usage();
            let new_entry = CacheEntry { coin: Coin::spent(), flags: entry.flags | CACHE_DIRTY };
            self.memory_usage += new_entry.memory_usage();
            self.map.insert(*op, new_entry);
        }
        true
    }

    /// Drops a clean (flags == 0) entry to shed memory; entries that differ from the base
    /// must stay, since dropping them would lose the pending write.
    pub fn uncache(&mut self, op: &Outpoint) {
        if let Some(entry) = self.map.get(op) {
            if entry.flags == 0 {
                let removed = self.map.remove(op).unwrap();
                self.memory_usage -= removed.memory_usage();
            }
        }
    }

    pub fn get_best_block(&self) -> BlockHash {
        self.best_block
    }

    pub fn set_best_block(&mut self, hash: BlockHash) {
        self.best_block = hash;
    }

    /// Propagates the accumulated delta to the base and clears local state. Returns `false`
    /// (leaving the local map cleared regardless) if the base's `batch_write` failed.
    pub fn flush(&mut self) -> bool {
        debug!(entries = self.map.len(), "coins cache flush");
        let entries: Vec<(Outpoint, CacheEntry)> = self.map.drain().collect();
        self.memory_usage = 0;
        self.base.batch_write(entries, self.best_block)
    }

    pub fn get_value_in(&mut self, inputs: &[Outpoint], is_coinbase: bool) -> i64 {
        if is_coinbase {
            return 0;
        }
        inputs.iter().map(|op| self.access_coin(op).value_satoshis.max(0)).sum()
    }

    pub fn have_inputs(&mut self, inputs: &[Outpoint], is_coinbase: bool) -> bool {
        if is_coinbase {
            return true;
        }
        inputs.iter().all(|op| self.have_coin(op))
    }

    /// Weighted age of inputs: `sum(value * (height - coin.height))`, as `f64`. Coinbase
    /// inputs and still-immature coins (height unknown, i.e. absent) contribute nothing.
    /// `chain_input_value` accumulates the total spendable value of resolved inputs.
    pub fn get_priority(&mut self, inputs: &[Outpoint], height: u32, chain_input_value: &mut i64) -> f64 {
        let mut priority = 0f64;
        for op in inputs {
            let coin = self.access_coin(op);
            if coin.is_spent() {
                continue;
            }
            *chain_input_value += coin.value_satoshis;
            if coin.height <= height {
                let age = (height - coin.height) as f64;
                priority += coin.value_satoshis as f64 * age;
            }
        }
        priority
    }
}

impl CoinsView for CoinsViewCache {
    fn get_coin(&self, op: &Outpoint) -> Option<Coin> {
        if let Some(entry) = self.map.get(op) {
            Some(entry.coin.clone())
        } else {
            self.base.get_coin(op)
        }
    }

    fn get_best_block(&self) -> BlockHash {
        self.best_block
    }

    fn batch_write(&mut self, entries: Vec<(Outpoint, CacheEntry)>, best_block: BlockHash) -> bool {
        for (op, child) in entries {
            if !child.is_dirty() {
                continue;
            }
            merge_one(&mut self.map, &mut self.memory_usage, op, child);
        }
        self.best_block = best_block;
        true
    }

    fn cursor(&self) -> Vec<(Outpoint, Coin)> {
        let mut seen: HashMap<Outpoint, Coin> = self.base.cursor().into_iter().collect();
        for (op, entry) in &self.map {
            if entry.coin.is_spent() {
                seen.remove(op);
            } else {
                seen.insert(*op, entry.coin.clone());
            }
        }
        seen.into_iter().collect()
    }

    fn estimate_size(&self) -> usize {
        self.base.estimate_size() + self.memory_usage
    }
}

/// The merge table from the design: `child` is always dirty here (callers filter non-dirty
/// entries before calling). Mutates `parent_map`/`parent_usage` in place.
fn merge_one(
    parent_map: &mut HashMap<Outpoint, CacheEntry>,
    parent_usage: &mut usize,
    op: Outpoint,
    child: CacheEntry,
) {
    match parent_map.get(&op) {
        None => {
            if child.is_fresh() && child.coin.is_spent() {
                // Pure create-then-delete within this flush: nothing to record.
                return;
            }
            let entry = CacheEntry { coin: child.coin, flags: CACHE_DIRTY | (child.flags & CACHE_FRESH) };
            *parent_usage += entry.memory_usage();
            parent_map.insert(op, entry);
        }
        Some(parent_entry) => {
            if !parent_entry.coin.is_spent() && child.is_fresh() {
                panic!("batch_write: FRESH flag misapplied against a parent holding an unspent coin");
            }
            if parent_entry.is_fresh() && child.coin.is_spent() {
                let removed = parent_map.remove(&op).unwrap();
                *parent_usage -= removed.memory_usage();
                return;
            }
            let preserved_fresh = parent_entry.flags & CACHE_FRESH;
            *parent_usage -= parent_entry.memory_usage();
            let entry = CacheEntry { coin: child.coin, flags: CACHE_DIRTY | preserved_fresh };
            *parent_usage += entry.memory_usage();
            parent_map.insert(op, entry);
        }
    }
}

/// Caps the linear scan in [`access_by_txid`]; matches the original format's output-count
/// ceiling for a single transaction.
pub const MAX_OUTPUTS_PER_TX: u32 = 10_000;

/// Finds the first unspent output of `txid`, scanning indexes `0..MAX_OUTPUTS_PER_TX`.
pub fn access_by_txid(view: &mut CoinsViewCache, txid: crate::coin::Txid) -> Option<(Outpoint, Coin)> {
    for index in 0..MAX_OUTPUTS_PER_TX {
        let op = Outpoint::new(txid, index);
        let coin = view.access_coin(&op);
        if !coin.is_spent() {
            return Some((op, coin));
        }
    }
    None
}
