//! On-disk encodings: the block-index record and the compressed `Coin` record.
//!
//! Both use the base-128, MSB-continuation varint (as opposed to the CompactSize scheme in
//! `compactsize.rs`, which is reserved for vector-length prefixes elsewhere in the wire format).
//! This is confirmed against the seed vectors: decoding S4's `0x8a95c0bb00` tail as this scheme
//! yields exactly `3_000_000_000`, matching the documented overlong-script expectation.

use crate::block_index::{BlockHash, BlockIndexNode, DiskPos};
use crate::coin::Coin;
use crate::error::{ConsensusError, ErrorCode};
use crate::uint256::Uint256;
use crate::wire_read::Reader;

const HAVE_DATA: u32 = crate::block_index::HAVE_DATA;
const HAVE_UNDO: u32 = crate::block_index::HAVE_UNDO;

pub const MAX_SCRIPT_SIZE: usize = 10_000;
const N_SPECIAL_SCRIPTS: u64 = 6;

pub fn write_varint(out: &mut Vec<u8>, mut n: u64) {
    let mut tmp = [0u8; 10];
    let mut len = 0usize;
    loop {
        tmp[len] = (n & 0x7f) as u8 | if len > 0 { 0x80 } else { 0x00 };
        if n <= 0x7f {
            break;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
    for i in (0..=len).rev() {
        out.push(tmp[i]);
    }
}

pub fn read_varint(r: &mut Reader<'_>) -> Result<u64, ConsensusError> {
    let mut n: u64 = 0;
    loop {
        let b = r.read_u8()?;
        if n > (u64::MAX >> 7) {
            return Err(ConsensusError::new(ErrorCode::ParseOverlong, "varint too large"));
        }
        n = (n << 7) | (b & 0x7f) as u64;
        if b & 0x80 != 0 {
            n = n
                .checked_add(1)
                .ok_or_else(|| ConsensusError::new(ErrorCode::ParseOverlong, "varint overflow"))?;
        } else {
            return Ok(n);
        }
    }
}

pub fn compress_amount(mut n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut e = 0u64;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    if e < 9 {
        let d = n % 10;
        n /= 10;
        1 + (n * 9 + d - 1) * 10 + e
    } else {
        1 + (n - 1) * 10 + 9
    }
}

pub fn decompress_amount(x: u64) -> u64 {
    if x == 0 {
        return 0;
    }
    let mut x = x - 1;
    let e = x % 10;
    x /= 10;
    let mut n;
    if e < 9 {
        let d = (x % 9) + 1;
        x /= 9;
        n = x * 10 + d;
    } else {
        n = x + 1;
    }
    for _ in 0..e {
        n *= 10;
    }
    n
}

fn p2pkh_script(hash160: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(25);
    s.push(0x76);
    s.push(0xa9);
    s.push(0x14);
    s.extend_from_slice(hash160);
    s.push(0x88);
    s.push(0xac);
    s
}

fn p2sh_script(hash160: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(23);
    s.push(0xa9);
    s.push(0x14);
    s.extend_from_slice(hash160);
    s.push(0x87);
    s
}

fn encode_script(out: &mut Vec<u8>, script: &[u8]) {
    write_varint(out, script.len() as u64 + N_SPECIAL_SCRIPTS);
    out.extend_from_slice(script);
}

fn decode_script(r: &mut Reader<'_>) -> Result<Vec<u8>, ConsensusError> {
    let n_size = read_varint(r)?;
    match n_size {
        0 | 1 => {
            let payload = r.read_bytes(20)?;
            Ok(if n_size == 0 { p2pkh_script(payload) } else { p2sh_script(payload) })
        }
        2..=5 => {
            r.read_bytes(32)?;
            Err(ConsensusError::new(
                ErrorCode::ParseUnsupportedScriptType,
                "pubkey-template script not reconstructed",
            ))
        }
        _ => {
            let len = (n_size - N_SPECIAL_SCRIPTS) as usize;
            if len > MAX_SCRIPT_SIZE {
                return Err(ConsensusError::new(ErrorCode::ParseOverlong, "script too long"));
            }
            Ok(r.read_bytes(len)?.to_vec())
        }
    }
}

pub fn encode_coin(coin: &Coin) -> Vec<u8> {
    let mut out = Vec::new();
    let code = coin.height as u64 * 2 + if coin.is_coinbase { 1 } else { 0 };
    write_varint(&mut out, code);
    write_varint(&mut out, compress_amount(coin.value_satoshis.max(0) as u64));
    encode_script(&mut out, &coin.script);
    out
}

pub fn decode_coin(bytes: &[u8]) -> Result<Coin, ConsensusError> {
    let mut r = Reader::new(bytes);
    let code = read_varint(&mut r)?;
    let height = (code / 2) as u32;
    let is_coinbase = code % 2 == 1;
    let amount = decompress_amount(read_varint(&mut r)?);
    let script = decode_script(&mut r)?;
    Ok(Coin { value_satoshis: amount as i64, script, height, is_coinbase })
}

/// Fields persisted for one block-index record; `prev`/`chain_work`/`chain_tx`/`skip`/
/// `sequence_id`/`time_max` are runtime-derived and rebuilt by the host while reloading the
/// index in height order, not stored here.
pub struct DiskBlockIndexRecord {
    pub height: u32,
    pub status: u32,
    pub n_tx: u32,
    pub file: i32,
    pub data_offset: u32,
    pub undo_offset: u32,
    pub version: i32,
    pub prev_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl DiskBlockIndexRecord {
    pub fn from_node(node: &BlockIndexNode) -> Self {
        let prev_hash = node.prev.map(|h| h.0).unwrap_or([0u8; 32]);
        Self {
            height: node.height,
            status: node.status,
            n_tx: node.n_tx,
            file: node.file,
            data_offset: node.data_offset,
            undo_offset: node.undo_offset,
            version: node.version,
            prev_hash,
            merkle_root: node.merkle_root,
            time: node.time,
            bits: node.bits,
            nonce: node.nonce,
        }
    }

    /// Reconstructs a full in-memory node. `chain_work`/`chain_tx`/`skip`/`sequence_id`/
    /// `time_max` are left at placeholder values the host must recompute during index rebuild.
    pub fn into_node(self, hash: BlockHash) -> BlockIndexNode {
        let prev = if self.prev_hash == [0u8; 32] { None } else { Some(BlockHash(self.prev_hash)) };
        BlockIndexNode {
            hash,
            prev,
            skip: None,
            height: self.height,
            file: self.file,
            data_offset: self.data_offset,
            undo_offset: self.undo_offset,
            chain_work: Uint256::zero(),
            n_tx: self.n_tx,
            chain_tx: 0,
            status: self.status,
            version: self.version,
            merkle_root: self.merkle_root,
            time: self.time,
            bits: self.bits,
            nonce: self.nonce,
            sequence_id: 0,
            time_max: self.time,
        }
    }
}

pub fn encode_block_index_record(r: &DiskBlockIndexRecord) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint(&mut out, r.height as u64);
    write_varint(&mut out, r.status as u64);
    write_varint(&mut out, r.n_tx as u64);
    if r.status & (HAVE_DATA | HAVE_UNDO) != 0 {
        write_varint(&mut out, r.file as u64);
    }
    if r.status & HAVE_DATA != 0 {
        write_varint(&mut out, r.data_offset as u64);
    }
    if r.status & HAVE_UNDO != 0 {
        write_varint(&mut out, r.undo_offset as u64);
    }
    out.extend_from_slice(&r.version.to_le_bytes());
    out.extend_from_slice(&r.prev_hash);
    out.extend_from_slice(&r.merkle_root);
    out.extend_from_slice(&r.time.to_le_bytes());
    out.extend_from_slice(&r.bits.to_le_bytes());
    out.extend_from_slice(&r.nonce.to_le_bytes());
    out
}

pub fn decode_block_index_record(bytes: &[u8]) -> Result<DiskBlockIndexRecord, ConsensusError> {
    let mut r = Reader::new(bytes);
    let height = read_varint(&mut r)? as u32;
    let status = read_varint(&mut r)? as u32;
    let n_tx = read_varint(&mut r)? as u32;

    let file = if status & (HAVE_DATA | HAVE_UNDO) != 0 { read_varint(&mut r)? as i32 } else { -1 };
    let data_offset = if status & HAVE_DATA != 0 { read_varint(&mut r)? as u32 } else { 0 };
    let undo_offset = if status & HAVE_UNDO != 0 { read_varint(&mut r)? as u32 } else { 0 };

    let version = r.read_i32_le()?;
    let prev_hash = r.read_array32()?;
    let merkle_root = r.read_array32()?;
    let time = r.read_u32_le()?;
    let bits = r.read_u32_le()?;
    let nonce = r.read_u32_le()?;

    Ok(DiskBlockIndexRecord {
        height,
        status,
        n_tx,
        file,
        data_offset,
        undo_offset,
        version,
        prev_hash,
        merkle_root,
        time,
        bits,
        nonce,
    })
}

pub fn disk_pos(record: &DiskBlockIndexRecord, want_undo: bool) -> DiskPos {
    if want_undo {
        DiskPos { file: record.file, offset: record.undo_offset }
    } else {
        DiskPos { file: record.file, offset: record.data_offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn s1_coin_roundtrip_non_coinbase() {
        let bytes = from_hex("97f23c835800816115944e077fe7c803cfa57f29b36bf87c1d35");
        let coin = decode_coin(&bytes).unwrap();
        assert!(!coin.is_coinbase);
        assert_eq!(coin.height, 203998);
        assert_eq!(coin.value_satoshis, 60_000_000_000);
        assert_eq!(coin.script, p2pkh_script(&from_hex("816115944e077fe7c803cfa57f29b36bf87c1d35")));
    }

    #[test]
    fn s2_coin_roundtrip_coinbase() {
        let bytes = from_hex("8ddf77bbd123008c988f1a4a4de2161e0f50aac7f17e7f9555caa4");
        let coin = decode_coin(&bytes).unwrap();
        assert!(coin.is_coinbase);
        assert_eq!(coin.height, 120891);
        assert_eq!(coin.value_satoshis, 110397);
        assert_eq!(coin.script, p2pkh_script(&from_hex("8c988f1a4a4de2161e0f50aac7f17e7f9555caa4")));
    }

    #[test]
    fn s3_minimal_coin() {
        let bytes = from_hex("000006");
        let coin = decode_coin(&bytes).unwrap();
        assert!(!coin.is_coinbase);
        assert_eq!(coin.height, 0);
        assert_eq!(coin.value_satoshis, 0);
        assert!(coin.script.is_empty());
    }

    #[test]
    fn s4_overlong_script_rejected() {
        let bytes = from_hex("00008a95c0bb00");
        assert!(decode_coin(&bytes).is_err());
    }

    #[test]
    fn varint_roundtrip() {
        for n in [0u64, 1, 127, 128, 16383, 16384, 3_000_000_000, u64::MAX / 2] {
            let mut buf = Vec::new();
            write_varint(&mut buf, n);
            let mut r = Reader::new(&buf);
            assert_eq!(read_varint(&mut r).unwrap(), n);
        }
    }

    #[test]
    fn compress_amount_roundtrip() {
        for n in [0u64, 1, 100, 60_000_000_000, 110397, 1_234_567_890] {
            assert_eq!(decompress_amount(compress_amount(n)), n);
        }
    }

    #[test]
    fn block_index_record_roundtrip_without_undo() {
        let r = DiskBlockIndexRecord {
            height: 500,
            status: HAVE_DATA,
            n_tx: 3,
            file: 7,
            data_offset: 1234,
            undo_offset: 0,
            version: 1,
            prev_hash: [9u8; 32],
            merkle_root: [8u8; 32],
            time: 111,
            bits: 0x1d00ffff,
            nonce: 42,
        };
        let bytes = encode_block_index_record(&r);
        let decoded = decode_block_index_record(&bytes).unwrap();
        assert_eq!(decoded.height, 500);
        assert_eq!(decoded.file, 7);
        assert_eq!(decoded.data_offset, 1234);
        assert_eq!(decoded.undo_offset, 0);
        assert_eq!(decoded.prev_hash, [9u8; 32]);
        assert_eq!(decoded.nonce, 42);
    }
}
