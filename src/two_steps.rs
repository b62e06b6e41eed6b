//! Two-step retrieval: frequent values get a short rank code, rare values
//! fall through to a full-width secondary function.
//!
//! A first MWHC function stores, per key, a code of `s` bits: 0 for "rare",
//! otherwise an index into a table of the `2^s - 1` most frequent values. A
//! second function over the rare keys alone keeps the original width. The
//! rank width `s` comes from a Lambert-W closed form driven by the frequency
//! of the dominant value.

use ahash::AHashMap;
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::MphfError;
use crate::hash::HashTriple;
use crate::mwhc::{MwhcFunction, GAMMA};
use crate::store::ChunkedHashStore;

/// Layered MWHC function keyed by the same triples as its siblings.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TwoStepsMwhcFunction {
    n: u64,
    width: u32,
    rank_width: u32,
    rank_table: Vec<u64>,
    rank_codes: MwhcFunction,
    remainder: Option<MwhcFunction>,
    rank_mean: f64,
}

impl TwoStepsMwhcFunction {
    /// Build from a checked store. `values` is indexed by store record index
    /// and must be idempotent: it is consulted once for the frequency scan
    /// and again, lazily, during each assignment pass.
    pub(crate) fn from_store(
        store: &ChunkedHashStore,
        values: &dyn Fn(u64) -> u64,
        width: u32,
    ) -> Result<Self, MphfError> {
        let records = store.records()?;
        let n = records.len();
        if n == 0 || width == 0 {
            return Ok(Self {
                n: n as u64,
                width,
                rank_width: 0,
                rank_table: Vec::new(),
                rank_codes: MwhcFunction::trivial(n as u64, 0),
                remainder: None,
                rank_mean: 0.0,
            });
        }

        let mut counts: AHashMap<u64, u64> = AHashMap::new();
        for r in &records {
            *counts.entry(values(r.index)).or_insert(0) += 1;
        }
        let rank_width = plan_rank_width(n, width, &counts);

        // Most frequent first; ties broken by value so the layout is
        // deterministic regardless of map iteration order.
        let mut by_freq: Vec<(u64, u64)> = counts.into_iter().collect();
        by_freq.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let kept = ((1usize << rank_width) - 1).min(by_freq.len());

        let mut rank_table = vec![0u64; 1 << rank_width];
        let mut code_of: AHashMap<u64, u64> = AHashMap::with_capacity(kept);
        for (i, &(value, _)) in by_freq[..kept].iter().enumerate() {
            rank_table[i + 1] = value;
            code_of.insert(value, i as u64 + 1);
        }
        let code = |index: u64| code_of.get(&values(index)).copied().unwrap_or(0);

        let rank_codes = MwhcFunction::from_store(store, &|index| code(index), rank_width)?;

        let rare: Vec<_> = records.iter().filter(|r| code(r.index) == 0).collect();
        let remainder = if rare.is_empty() {
            None
        } else {
            let triples: Vec<HashTriple> = rare.iter().map(|r| r.triple()).collect();
            Some(MwhcFunction::from_triples(
                store.seed(),
                &triples,
                &|pos| values(rare[pos].index),
                width,
                GAMMA,
            )?)
        };

        let rank_mean =
            records.iter().map(|r| code(r.index)).sum::<u64>() as f64 / n as f64;
        debug!(
            "two-step function: rank width {rank_width}, {} rare of {n} keys",
            rare.len()
        );

        Ok(Self {
            n: n as u64,
            width,
            rank_width,
            rank_table,
            rank_codes,
            remainder,
            rank_mean,
        })
    }

    /// Value stored for the key hashing to `t`; arbitrary for non-members.
    #[inline]
    pub fn get_by_triple(&self, t: HashTriple) -> u64 {
        if self.n == 0 || self.width == 0 {
            return 0;
        }
        let code = self.rank_codes.get_by_triple(t);
        if code != 0 {
            self.rank_table[code as usize]
        } else {
            self.remainder.as_ref().map_or(0, |f| f.get_by_triple(t))
        }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Width of the original values (the remainder layer's cell width).
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mean rank code over the build keys; 0 means every value was rare.
    #[inline]
    pub fn rank_mean(&self) -> f64 {
        self.rank_mean
    }

    pub fn num_bits(&self) -> u64 {
        self.rank_table.len() as u64 * 64
            + self.rank_codes.num_bits()
            + self.remainder.as_ref().map_or(0, MwhcFunction::num_bits)
    }
}

/// Rank width from the closed form `s(p, r)`, where `p` is the relative
/// frequency of the dominant value and `r` the value width:
///
/// `W(x) = -ln(-1/x) - ln(ln(-1/x))`,
/// `s(p, r) = log2( W(1 / (ln 2 * (r + gamma) * (p - 1))) / ln(1 - p) )`.
///
/// Degenerate distributions fall back to one bit; the result is capped so
/// the table never outgrows the distinct values or the original width.
fn plan_rank_width(n: usize, width: u32, counts: &AHashMap<u64, u64>) -> u32 {
    let distinct = counts.len() as u64;
    if distinct <= 1 {
        return 1;
    }
    let max_count = *counts.values().max().unwrap();
    let p = max_count as f64 / n as f64;
    let r = width as f64;

    let s = if p < 1.0 {
        let x = 1.0 / (std::f64::consts::LN_2 * (r + GAMMA) * (p - 1.0));
        let s = (lambert_w(x) / (1.0 - p).ln()).log2();
        if s.is_finite() { s.ceil().max(1.0) as u32 } else { 1 }
    } else {
        1
    };
    s.min(64 - distinct.leading_zeros()).min(width.max(1)).min(16)
}

/// Asymptotic expansion of the Lambert W function used for space planning.
#[inline]
fn lambert_w(x: f64) -> f64 {
    let l = (-1.0 / x).ln();
    -l - l.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitVector;

    fn checked_store(keys: &[BitVector]) -> ChunkedHashStore {
        let mut store = ChunkedHashStore::new(0xC0FF_EE00_D15E_A5E, None);
        for bv in keys {
            store.add(bv).unwrap();
        }
        store.check_and_retry(keys).unwrap();
        store
    }

    fn byte_keys(n: usize) -> Vec<BitVector> {
        (0..n)
            .map(|i| BitVector::from_bytes(&(i as u64).to_be_bytes()))
            .collect()
    }

    #[test]
    fn skewed_values_roundtrip() {
        // 90% of keys share one value, the rest spread over a wide range.
        let keys = byte_keys(1000);
        let value = |i: u64| if i % 10 != 0 { 42 } else { (i * 31) & 0xffff };
        let store = checked_store(&keys);
        let f = TwoStepsMwhcFunction::from_store(&store, &value, 16).unwrap();

        for r in store.records().unwrap() {
            assert_eq!(f.get_by_triple(r.triple()), value(r.index), "key {}", r.index);
        }
        assert!(f.rank_mean() > 0.0);
        assert_eq!(f.width(), 16);
    }

    #[test]
    fn constant_values_need_no_remainder() {
        let keys = byte_keys(200);
        let store = checked_store(&keys);
        let f = TwoStepsMwhcFunction::from_store(&store, &|_| 7, 3).unwrap();
        assert!(f.remainder.is_none());
        for r in store.records().unwrap() {
            assert_eq!(f.get_by_triple(r.triple()), 7);
        }
    }

    #[test]
    fn all_distinct_values_roundtrip() {
        let keys = byte_keys(300);
        let store = checked_store(&keys);
        let f = TwoStepsMwhcFunction::from_store(&store, &|i| i, 9).unwrap();
        for r in store.records().unwrap() {
            assert_eq!(f.get_by_triple(r.triple()), r.index);
        }
    }

    #[test]
    fn planned_width_is_sane() {
        let mut counts = AHashMap::new();
        counts.insert(1u64, 900u64);
        counts.insert(2, 50);
        counts.insert(3, 50);
        let s = plan_rank_width(1000, 16, &counts);
        assert!((1..=2).contains(&s));

        let mut flat = AHashMap::new();
        for v in 0..1000u64 {
            flat.insert(v, 1u64);
        }
        let s = plan_rank_width(1000, 16, &flat);
        assert!((1..=10).contains(&s));
    }
}
