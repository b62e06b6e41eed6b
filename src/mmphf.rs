//! Monotone minimal perfect hashing over sorted, prefix-free bit-string keys.
//!
//! Keys are grouped into fixed-size buckets of consecutive ranks. Per bucket
//! the longest common prefix of its keys (the distributor) is extracted; a
//! retrieval function over the distributor set then recovers the bucket of
//! any key from its own prefix, and two more retrieval functions over the
//! full key set recover the prefix length to cut at and the offset inside
//! the bucket:
//!
//! `rank(key) = bucket(key[0 .. lcp_len(key)]) * bucket_size + offset(key)`

use std::borrow::Borrow;
use std::path::PathBuf;

use hashbrown::HashSet;
use log::debug;
#[cfg(feature = "serde")]
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::bits::{bits_for, BitVector, CompactArray};
use crate::error::MphfError;
use crate::hash::{jenkins, next_seed};
use crate::mwhc::{MwhcConfig, MwhcFunction, GAMMA};
use crate::store::ChunkedHashStore;
use crate::transform::TransformationStrategy;
use crate::two_steps::TwoStepsMwhcFunction;

/// Reseed rounds for the shared-store function builds before giving up.
const BUILD_ATTEMPT_LIMIT: u32 = 16;

/// Default sentinel returned for non-members and degenerate inputs.
pub const DEFAULT_SENTINEL: i64 = -1;

/// Immutable monotone minimal perfect hash function: maps each build key to
/// its rank in `[0, n)` and anything else to the sentinel (probabilistically,
/// unless signatures are configured).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct MonotoneMphf<T> {
    n: u64,
    log2_bucket_size: u32,
    seed: u64,
    def_ret_value: i64,
    offsets: Option<MwhcFunction>,
    lcp_lengths: Option<TwoStepsMwhcFunction>,
    lcp_to_bucket: Option<MwhcFunction>,
    signatures: Option<CompactArray>,
    signature_mask: u64,
    transform: T,
}

impl<T> MonotoneMphf<T> {
    /// Rank of `key`, or the sentinel for non-members (subject to the
    /// signature's false-positive rate) and malformed inputs. Never fails.
    pub fn rank(&self, key: &T::Key) -> i64
    where
        T: TransformationStrategy,
    {
        let (Some(offsets), Some(lcp_lengths), Some(lcp_to_bucket)) =
            (&self.offsets, &self.lcp_lengths, &self.lcp_to_bucket)
        else {
            return self.def_ret_value;
        };

        let bv = self.transform.to_bit_vector(key);
        let triple = jenkins(&bv, self.seed);

        let prefix = lcp_lengths.get_by_triple(triple);
        if prefix > bv.len() as u64 {
            return self.def_ret_value;
        }

        let slice = bv.prefix(prefix as usize);
        let bucket = lcp_to_bucket.get(&slice);
        let result = (bucket << self.log2_bucket_size) + offsets.get_by_triple(triple);
        if result >= self.n {
            return self.def_ret_value;
        }

        if let Some(signatures) = &self.signatures {
            if (signatures.get(result as usize) ^ triple.h0) & self.signature_mask != 0 {
                return self.def_ret_value;
            }
        }
        result as i64
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    pub fn bucket_size(&self) -> u64 {
        1 << self.log2_bucket_size
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    pub fn def_ret_value(&self) -> i64 {
        self.def_ret_value
    }

    /// Bits of owned storage across the three retrieval functions and the
    /// optional signature table.
    pub fn num_bits(&self) -> u64 {
        self.offsets.as_ref().map_or(0, MwhcFunction::num_bits)
            + self
                .lcp_lengths
                .as_ref()
                .map_or(0, TwoStepsMwhcFunction::num_bits)
            + self.lcp_to_bucket.as_ref().map_or(0, MwhcFunction::num_bits)
            + self.signatures.as_ref().map_or(0, CompactArray::num_bits)
    }
}

#[cfg(feature = "serde")]
impl<T: Serialize + DeserializeOwned> MonotoneMphf<T> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MphfError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MphfError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Builder for [`MonotoneMphf`].
///
/// Keys must arrive sorted ascending and encode, through the strategy, to
/// distinct prefix-free bit vectors; violations surface as
/// [`MphfError::DuplicateKey`], [`MphfError::NotPrefixFree`] or
/// [`MphfError::NotSorted`].
pub struct MmphfBuilder<T> {
    transform: T,
    num_keys: i64,
    signature_width: i32,
    temp_dir: Option<PathBuf>,
    def_ret_value: i64,
    config: MwhcConfig,
}

impl<T> MmphfBuilder<T> {
    pub fn new(transform: T) -> Self {
        Self {
            transform,
            num_keys: -1,
            signature_width: 0,
            temp_dir: None,
            def_ret_value: DEFAULT_SENTINEL,
            config: MwhcConfig::default(),
        }
    }

    /// Known key cardinality; `-1` (the default) means "determine while
    /// scanning". Used only as an allocation hint.
    pub fn num_keys(mut self, num_keys: i64) -> Self {
        self.num_keys = num_keys;
        self
    }

    /// `0` disables signatures; `w > 0` stores a `w`-bit signature per rank
    /// for probabilistic non-member rejection. Negative widths request
    /// dictionary behavior and are treated as `|w|`-bit signatures.
    pub fn signature_width(mut self, width: i32) -> Self {
        self.signature_width = width;
        self
    }

    /// Directory for spill files; defaults to the OS temp directory.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Value reported for non-members; defaults to `-1`.
    pub fn def_ret_value(mut self, value: i64) -> Self {
        self.def_ret_value = value;
        self
    }

    pub fn with_config(mut self, config: MwhcConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the function from sorted keys. Consumes the iterator exactly
    /// once; the retrieval functions re-read keys through the hash store.
    pub fn build<Q, I>(self, keys: I) -> Result<MonotoneMphf<T>, MphfError>
    where
        T: TransformationStrategy,
        Q: Borrow<T::Key>,
        I: IntoIterator<Item = Q>,
    {
        let iter = keys.into_iter();
        let mut bvs: Vec<BitVector> = if self.num_keys >= 0 {
            Vec::with_capacity(self.num_keys as usize)
        } else {
            Vec::with_capacity(iter.size_hint().0)
        };
        for key in iter {
            bvs.push(self.transform.to_bit_vector(key.borrow()));
        }

        let n = bvs.len() as u64;
        if n == 0 {
            return Ok(MonotoneMphf {
                n: 0,
                log2_bucket_size: 0,
                seed: 0,
                def_ret_value: self.def_ret_value,
                offsets: None,
                lcp_lengths: None,
                lcp_to_bucket: None,
                signatures: None,
                signature_mask: 0,
                transform: self.transform,
            });
        }

        // Bucketing: t keys per bucket balance the distributor function
        // against the offset width, rounded up to a power of two.
        let ln_n = (n as f64).ln();
        let t = (1.0 + GAMMA * std::f64::consts::LN_2 + ln_n - (1.0 + ln_n).ln()).ceil();
        let log2_bucket_size = t.log2().ceil() as u32;
        let bucket_mask = (1usize << log2_bucket_size) - 1;
        let num_buckets = (n as usize).div_ceil(1 << log2_bucket_size);
        debug!("{n} keys, bucket size {}, {num_buckets} buckets", 1 << log2_bucket_size);

        let mut store = ChunkedHashStore::new(self.config.salt, self.temp_dir.as_deref());

        // Single ordered pass: validate adjacent keys, feed the store, and
        // extract each bucket's longest common prefix.
        let mut lcp_lens: Vec<u64> = Vec::with_capacity(num_buckets);
        let mut distributors: Vec<BitVector> = Vec::with_capacity(num_buckets);
        let mut bucket_lcp = 0usize;
        for (i, curr) in bvs.iter().enumerate() {
            if i > 0 {
                let prev = &bvs[i - 1];
                let prefix = prev.lcp(curr);
                if prefix == prev.len() && prefix == curr.len() {
                    return Err(MphfError::DuplicateKey);
                }
                if prefix == prev.len() || prefix == curr.len() {
                    return Err(MphfError::NotPrefixFree);
                }
                if prev.get(prefix) {
                    return Err(MphfError::NotSorted);
                }
                if i & bucket_mask != 0 {
                    bucket_lcp = bucket_lcp.min(prefix);
                }
            }
            if i & bucket_mask == 0 {
                bucket_lcp = curr.len();
            }
            store.add(curr)?;
            if i & bucket_mask == bucket_mask || i == bvs.len() - 1 {
                distributors.push(curr.prefix(bucket_lcp));
                lcp_lens.push(bucket_lcp as u64);
            }
        }
        debug_assert_eq!(distributors.len(), num_buckets);
        debug_assert!(
            distributors.iter().collect::<HashSet<_>>().len() == num_buckets,
            "bucket distributors must be distinct"
        );

        store.check_and_retry(&bvs)?;

        let max_lcp = *lcp_lens.iter().max().unwrap();
        let lcp_width = bits_for(max_lcp);
        let bucket_width = bits_for(num_buckets as u64 - 1);
        let offset_mask = (1u64 << log2_bucket_size) - 1;

        let offset_of = |index: u64| index & offset_mask;
        let lcp_of = |index: u64| lcp_lens[(index >> log2_bucket_size) as usize];

        // The offset and LCP-length functions share the store seed, so one
        // unpeelable graph forces a reseed of both.
        let mut reseed_state = store.seed();
        let mut round = 0;
        let (offsets, lcp_lengths) = loop {
            let built = MwhcFunction::from_store(&store, &offset_of, log2_bucket_size)
                .and_then(|offsets| {
                    TwoStepsMwhcFunction::from_store(&store, &lcp_of, lcp_width)
                        .map(|lcp_lengths| (offsets, lcp_lengths))
                });
            match built {
                Ok(pair) => break pair,
                Err(MphfError::ConstructionFailed) if round < BUILD_ATTEMPT_LIMIT => {
                    round += 1;
                    store.reset(next_seed(&mut reseed_state));
                    store.check_and_retry(&bvs)?;
                }
                Err(e) => return Err(e),
            }
        };
        let seed = store.seed();
        debug!(
            "lcp lengths: rank mean {:.2}, width {}",
            lcp_lengths.rank_mean(),
            lcp_lengths.width()
        );

        // The distributor function hashes key prefixes, so it gets its own
        // seed and retry loop.
        let lcp_to_bucket =
            MwhcFunction::build(&distributors, &|b| b as u64, bucket_width, &self.config)?;

        let signature_width = self.signature_width.unsigned_abs().min(64);
        let (signatures, signature_mask) = if signature_width == 0 {
            (None, 0)
        } else {
            let mask = if signature_width == 64 {
                u64::MAX
            } else {
                (1u64 << signature_width) - 1
            };
            let mut signatures = CompactArray::new(signature_width, n as usize);
            for record in store.records()? {
                signatures.set(record.index as usize, record.h0 & mask);
            }
            (Some(signatures), mask)
        };

        // The store and its spill files are scoped to construction.
        drop(store);

        Ok(MonotoneMphf {
            n,
            log2_bucket_size,
            seed,
            def_ret_value: self.def_ret_value,
            offsets: Some(offsets),
            lcp_lengths: Some(lcp_lengths),
            lcp_to_bucket: Some(lcp_to_bucket),
            signatures,
            signature_mask,
            transform: self.transform,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{PrefixFreeStr, RawBitVectors};

    #[test]
    fn empty_input_always_returns_sentinel() {
        let mmphf = MmphfBuilder::new(PrefixFreeStr)
            .build(std::iter::empty::<&str>())
            .unwrap();
        assert_eq!(mmphf.rank("anything"), -1);
        assert_eq!(mmphf.rank(""), -1);
        assert_eq!(mmphf.num_bits(), 0);
        assert!(mmphf.is_empty());
    }

    #[test]
    fn single_key_maps_to_zero() {
        let mmphf = MmphfBuilder::new(PrefixFreeStr).build(["lonely"]).unwrap();
        assert_eq!(mmphf.rank("lonely"), 0);
        // Without a signature, other inputs are either 0 or the sentinel.
        for probe in ["alone", "lonesome", "z"] {
            assert!([0, -1].contains(&mmphf.rank(probe)), "probe {probe}");
        }
    }

    #[test]
    fn single_key_with_signature_rejects_others() {
        let mmphf = MmphfBuilder::new(PrefixFreeStr)
            .signature_width(32)
            .build(["lonely"])
            .unwrap();
        assert_eq!(mmphf.rank("lonely"), 0);
        for probe in ["alone", "lonesome", "z"] {
            assert_eq!(mmphf.rank(probe), -1, "probe {probe}");
        }
    }

    #[test]
    fn custom_sentinel_is_honored() {
        let mmphf = MmphfBuilder::new(PrefixFreeStr)
            .signature_width(16)
            .def_ret_value(i64::MIN)
            .build(["a", "b"])
            .unwrap();
        assert_eq!(mmphf.rank("a"), 0);
        assert_eq!(mmphf.rank("b"), 1);
        assert_eq!(mmphf.rank("zebra"), i64::MIN);
    }

    #[test]
    fn raw_bit_vector_keys() {
        // 00, 010, 011, 1: sorted, distinct, prefix-free.
        let keys = [
            bv(&[false, false]),
            bv(&[false, true, false]),
            bv(&[false, true, true]),
            bv(&[true]),
        ];
        let mmphf = MmphfBuilder::new(RawBitVectors).build(&keys).unwrap();
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(mmphf.rank(k), i as i64);
        }
    }

    fn bv(bits: &[bool]) -> BitVector {
        let mut out = BitVector::new();
        for &b in bits {
            out.push(b);
        }
        out
    }
}
