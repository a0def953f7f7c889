//! Consensus state layer of a Bitcoin-Cash-style blockchain node: the block-index chain,
//! the layered UTXO coins-view cache, difficulty retargeting, the versionbits threshold
//! machine, and the satoshi money-string codec.
//!
//! Hashing, script execution, signature verification, and persistent storage are all external
//! collaborators; this crate treats them as opaque interfaces (a hash is a `[u8; 32]` someone
//! else computed, a backing coin store is anything implementing [`coins_view::CoinsView`]).

mod block_index;
mod chain;
mod coin;
mod coins_view;
mod compactsize;
mod diskformat;
mod error;
mod moneystr;
mod params;
mod pow;
mod uint256;
mod versionbits;
mod wire_read;

pub use block_index::{
    skip_height, BlockHash, BlockIndexNode, BlockMap, DiskPos, FAILED_CHILD, FAILED_VALID,
    HAVE_DATA, HAVE_UNDO, VALID_CHAIN, VALID_HEADER, VALID_SCRIPTS, VALID_TRANSACTIONS,
    VALID_TREE, VALID_UNKNOWN,
};
pub use chain::ActiveChain;
pub use coin::{Coin, Outpoint, Txid, SPENT_VALUE};
pub use coins_view::{
    access_by_txid, CacheEntry, CoinsView, CoinsViewCache, MemoryCoinsView, CACHE_DIRTY,
    CACHE_FRESH, MAX_OUTPUTS_PER_TX,
};
pub use compactsize::{read_compact_size, write_compact_size};
pub use diskformat::{
    decode_block_index_record, decode_coin, disk_pos, encode_block_index_record, encode_coin,
    DiskBlockIndexRecord, MAX_SCRIPT_SIZE,
};
pub use error::{ConsensusError, ErrorCode};
pub use moneystr::{format_money, parse_money, COIN_SATOSHIS};
pub use params::{ConsensusParams, Deployment};
pub use pow::{check_proof_of_work, get_next_work_required};
pub use uint256::{block_proof, block_proof_equivalent_time, Uint256};
pub use versionbits::{
    state_for, state_since_height_for, ThresholdState, VersionBitsCache, VERSIONBITS_TOP_BITS,
    VERSIONBITS_TOP_MASK,
};
pub use wire_read::Reader;
