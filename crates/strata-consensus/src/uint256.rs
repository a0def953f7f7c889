//! Fixed-width 256-bit unsigned integer with Bitcoin's "compact" (`nBits`) encoding.
//!
//! Backed by `num_bigint::BigUint`, masked to 256 bits after every operation so it behaves
//! like the fixed-width `arith_uint256` type it mirrors rather than an arbitrary-precision one.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Shl, Shr, Sub};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Uint256(BigUint);

fn modulus() -> BigUint {
    BigUint::one() << 256
}

fn mask(v: BigUint) -> BigUint {
    v % modulus()
}

impl Uint256 {
    pub fn zero() -> Self {
        Uint256(BigUint::zero())
    }

    pub fn one() -> Self {
        Uint256(BigUint::one())
    }

    pub fn from_u64(v: u64) -> Self {
        Uint256(BigUint::from(v))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parses a little-endian 32-byte buffer (the on-wire orientation of a block hash or target).
    pub fn from_le_bytes(b: &[u8; 32]) -> Self {
        let mut be = *b;
        be.reverse();
        Uint256(BigUint::from_bytes_be(&be))
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        let be = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        let start = 32 - be.len();
        out[start..].copy_from_slice(&be);
        out.reverse();
        out
    }

    /// Parses a big-endian 32-byte buffer (the conventional human-readable orientation for a
    /// `pow_limit` constant written out as a hex literal).
    pub fn from_be_bytes(b: &[u8; 32]) -> Self {
        Uint256(BigUint::from_bytes_be(b))
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let be = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - be.len()..].copy_from_slice(&be);
        out
    }

    /// Bitwise complement within the fixed 256-bit width: `!x = (2^256 - 1) - x`.
    pub fn complement(&self) -> Self {
        Uint256(&modulus() - BigUint::one() - &self.0)
    }

    pub fn bits(&self) -> u32 {
        self.0.bits() as u32
    }

    pub fn to_u64_saturating(&self) -> u64 {
        if self.bits() > 64 {
            u64::MAX
        } else {
            let bytes = self.0.to_bytes_le();
            let mut buf = [0u8; 8];
            buf[..bytes.len()].copy_from_slice(&bytes);
            u64::from_le_bytes(buf)
        }
    }

    /// Decodes a compact (`nBits`) target. Returns `(value, negative, overflow)`.
    ///
    /// Negative or overflowing encodings must be rejected by the caller: an `arith_uint256`
    /// has no sign, so this crate reports the flags rather than folding them into the value.
    pub fn set_compact(compact: u32) -> (Uint256, bool, bool) {
        let size = (compact >> 24) as i32;
        let mut word = compact & 0x007f_ffff;
        let negative = word != 0 && (compact & 0x0080_0000) != 0;
        let overflow =
            word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

        let value = if size <= 3 {
            word >>= 8 * (3 - size).max(0) as u32;
            Uint256(BigUint::from(word))
        } else {
            Uint256(BigUint::from(word) << (8 * (size - 3)) as u32)
        };

        (value, negative, overflow)
    }

    /// Encodes this value as a compact (`nBits`) target, matching `arith_uint256::GetCompact`.
    pub fn get_compact(&self, negative: bool) -> u32 {
        let mut size = (self.bits() + 7) / 8;
        let mut compact: u32 = if size <= 3 {
            (self.to_u64_saturating() as u32) << (8 * (3 - size))
        } else {
            let shifted = self.clone() >> (8 * (size - 3));
            shifted.to_u64_saturating() as u32
        };

        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        compact |= size << 24;
        if negative && (compact & 0x007f_ffff) != 0 {
            compact |= 0x0080_0000;
        }
        compact
    }
}

impl Add for Uint256 {
    type Output = Uint256;
    fn add(self, rhs: Uint256) -> Uint256 {
        Uint256(mask(self.0 + rhs.0))
    }
}

impl<'a> Add<&'a Uint256> for &'a Uint256 {
    type Output = Uint256;
    fn add(self, rhs: &'a Uint256) -> Uint256 {
        Uint256(mask(&self.0 + &rhs.0))
    }
}

impl Sub for Uint256 {
    type Output = Uint256;
    fn sub(self, rhs: Uint256) -> Uint256 {
        Uint256(mask(&modulus() + self.0 - rhs.0))
    }
}

impl<'a> Sub<&'a Uint256> for &'a Uint256 {
    type Output = Uint256;
    fn sub(self, rhs: &'a Uint256) -> Uint256 {
        Uint256(mask(&modulus() + &self.0 - &rhs.0))
    }
}

impl Mul<u64> for Uint256 {
    type Output = Uint256;
    fn mul(self, rhs: u64) -> Uint256 {
        Uint256(mask(self.0 * BigUint::from(rhs)))
    }
}

impl Div<u64> for Uint256 {
    type Output = Uint256;
    fn div(self, rhs: u64) -> Uint256 {
        Uint256(self.0 / BigUint::from(rhs))
    }
}

impl Div for Uint256 {
    type Output = Uint256;
    fn div(self, rhs: Uint256) -> Uint256 {
        Uint256(self.0 / rhs.0)
    }
}

impl<'a> Div<&'a Uint256> for &'a Uint256 {
    type Output = Uint256;
    fn div(self, rhs: &'a Uint256) -> Uint256 {
        Uint256(&self.0 / &rhs.0)
    }
}

impl Shl<u32> for Uint256 {
    type Output = Uint256;
    fn shl(self, rhs: u32) -> Uint256 {
        Uint256(mask(self.0 << rhs))
    }
}

impl Shr<u32> for Uint256 {
    type Output = Uint256;
    fn shr(self, rhs: u32) -> Uint256 {
        Uint256(self.0 >> rhs)
    }
}

impl PartialOrd<u64> for Uint256 {
    fn partial_cmp(&self, other: &u64) -> Option<Ordering> {
        self.0.partial_cmp(&BigUint::from(*other))
    }
}

impl PartialEq<u64> for Uint256 {
    fn eq(&self, other: &u64) -> bool {
        self.0 == BigUint::from(*other)
    }
}

/// `block_proof(n) = floor(2^256 / (target+1))`, computed without materializing `2^256`.
pub fn block_proof(target: &Uint256) -> Uint256 {
    if target.is_zero() {
        return Uint256::zero();
    }
    let denom = target.clone() + Uint256::one();
    (target.complement() / denom) + Uint256::one()
}

/// `sign(to-from) * |work| * spacing / block_proof(tip)`, saturating to `i64::MAX`.
pub fn block_proof_equivalent_time(
    to_work: &Uint256,
    from_work: &Uint256,
    tip_target: &Uint256,
    target_spacing: u64,
) -> i64 {
    let (diff, sign): (Uint256, i64) = match to_work.cmp(from_work) {
        Ordering::Greater | Ordering::Equal => (to_work.clone() - from_work.clone(), 1),
        Ordering::Less => (from_work.clone() - to_work.clone(), -1),
    };
    let tip_proof = block_proof(tip_target);
    if tip_proof.is_zero() {
        return 0;
    }
    let r = (diff * target_spacing) / tip_proof;
    if r.bits() > 63 {
        return sign * i64::MAX;
    }
    sign * r.to_u64_saturating() as i64
}
