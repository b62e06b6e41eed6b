//! Key -> bit-vector transformation strategies.
//!
//! The core consumes this seam only; any encoding works as long as it is
//! deterministic, order-preserving, and yields distinct prefix-free vectors
//! for the caller's sorted keys.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bits::BitVector;

/// Turns caller keys into the bit vectors the core hashes and compares.
pub trait TransformationStrategy {
    type Key: ?Sized;

    /// Deterministic, idempotent encoding of `key`.
    fn to_bit_vector(&self, key: &Self::Key) -> BitVector;

    /// Encoded length in bits.
    fn length(&self, key: &Self::Key) -> u64 {
        self.to_bit_vector(key).len() as u64
    }

    /// Space overhead of the strategy itself, in bits.
    fn num_bits(&self) -> u64 {
        0
    }
}

fn encode_prefix_free(bytes: &[u8]) -> BitVector {
    let mut bv = BitVector::with_capacity(bytes.len() * 9 + 1);
    for &b in bytes {
        bv.push(true);
        for k in (0..8).rev() {
            bv.push((b >> k) & 1 == 1);
        }
    }
    bv.push(false);
    bv
}

/// Order-preserving prefix-free encoding of byte strings.
///
/// Every byte is emitted behind a 1 continuation bit and the string ends
/// with a single 0 bit. At the first length divergence one encoding carries
/// a 0 where the other carries a 1, so no encoding is a prefix of another
/// and byte-lexicographic order carries over to the bit vectors.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefixFreeBytes;

impl TransformationStrategy for PrefixFreeBytes {
    type Key = [u8];

    fn to_bit_vector(&self, key: &[u8]) -> BitVector {
        encode_prefix_free(key)
    }

    fn length(&self, key: &[u8]) -> u64 {
        key.len() as u64 * 9 + 1
    }
}

/// [`PrefixFreeBytes`] over UTF-8 string keys.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefixFreeStr;

impl TransformationStrategy for PrefixFreeStr {
    type Key = str;

    fn to_bit_vector(&self, key: &str) -> BitVector {
        encode_prefix_free(key.as_bytes())
    }

    fn length(&self, key: &str) -> u64 {
        key.len() as u64 * 9 + 1
    }
}

/// Identity strategy for callers that already hold prefix-free bit vectors.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawBitVectors;

impl TransformationStrategy for RawBitVectors {
    type Key = BitVector;

    fn to_bit_vector(&self, key: &BitVector) -> BitVector {
        key.clone()
    }

    fn length(&self, key: &BitVector) -> u64 {
        key.len() as u64
    }
}
