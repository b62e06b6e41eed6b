//! MWHC retrieval: three XORed bit-packed cells encode each key's value.
//!
//! Each key's hash triple picks one vertex in each third of a 3-uniform
//! hypergraph sized at `gamma` vertices per key. Peeling the graph yields an
//! order in which every value can be planted into a still-free cell, so that
//! `c[v0] ^ c[v1] ^ c[v2]` reconstructs the value at query time.

use log::trace;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bits::{BitVector, CompactArray};
use crate::error::MphfError;
use crate::hash::{jenkins, mix_salt, HashTriple};
use crate::peel::peel_hypergraph;
use crate::store::ChunkedHashStore;

/// Peelability overhead: vertices per edge. 3-uniform hypergraphs with this
/// ratio peel with high probability.
pub(crate) const GAMMA: f64 = 1.23;

/// Build parameters, shared by all retrieval functions in this crate.
#[derive(Debug, Clone)]
pub struct MwhcConfig {
    /// Vertex ratio m/n; classic MWHC value is 1.23.
    pub gamma: f64,
    /// Maximum rehash attempts if the graph is not peelable.
    pub rehash_limit: u32,
    /// Base salt. Effective seeds are derived deterministically.
    pub salt: u64,
}

impl Default for MwhcConfig {
    fn default() -> Self {
        Self {
            gamma: GAMMA,
            rehash_limit: 16,
            salt: 0xC0FF_EE00_D15E_A5E,
        }
    }
}

/// Static function from keys to `width`-bit values.
///
/// Query: `get(k) = c[v0] ^ c[v1] ^ c[v2]`, with the three vertices derived
/// from the key's hash triple. Keys outside the build set map to arbitrary
/// `width`-bit values.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MwhcFunction {
    n: u64,
    seg: u64, // m / 3, one segment per triple component
    width: u32,
    seed: u64,
    data: CompactArray,
}

impl MwhcFunction {
    /// Build from bit-vector keys, retrying with fresh seeds until the
    /// hypergraph peels. `values(i)` supplies the value of `keys[i]` and is
    /// materialized lazily, once per edge, during assignment.
    pub fn build(
        keys: &[BitVector],
        values: &dyn Fn(usize) -> u64,
        width: u32,
        cfg: &MwhcConfig,
    ) -> Result<Self, MphfError> {
        if keys.is_empty() || width == 0 {
            return Ok(Self::trivial(keys.len() as u64, width));
        }
        for round in 0..=cfg.rehash_limit {
            let seed = mix_salt(cfg.salt, round);
            let triples: Vec<HashTriple> = keys.iter().map(|k| jenkins(k, seed)).collect();
            match Self::from_triples(seed, &triples, values, width, cfg.gamma) {
                Ok(f) => return Ok(f),
                Err(MphfError::ConstructionFailed) => {
                    trace!("hypergraph not peelable, rehashing (round {round})");
                }
                Err(e) => return Err(e),
            }
        }
        Err(MphfError::ConstructionFailed)
    }

    /// Build from a checked store, keying into its stable seed. `values` is
    /// indexed by the store record index (the key's ingestion rank).
    ///
    /// A single attempt: on an unpeelable graph the caller must reseed the
    /// store and retry, since the seed is shared with its sibling functions.
    pub(crate) fn from_store(
        store: &ChunkedHashStore,
        values: &dyn Fn(u64) -> u64,
        width: u32,
    ) -> Result<Self, MphfError> {
        let records = store.records()?;
        if records.is_empty() || width == 0 {
            return Ok(Self::trivial(records.len() as u64, width));
        }
        let triples: Vec<HashTriple> = records.iter().map(|r| r.triple()).collect();
        Self::from_triples(
            store.seed(),
            &triples,
            &|pos| values(records[pos].index),
            width,
            GAMMA,
        )
    }

    /// One orientation-and-assignment attempt over fixed triples.
    pub(crate) fn from_triples(
        seed: u64,
        triples: &[HashTriple],
        values: &dyn Fn(usize) -> u64,
        width: u32,
        gamma: f64,
    ) -> Result<Self, MphfError> {
        let n = triples.len();
        if n == 0 || width == 0 {
            return Ok(Self::trivial(n as u64, width));
        }

        let seg = segment_size(n, gamma);
        let m = (3 * seg) as usize;
        let mut v0 = Vec::with_capacity(n);
        let mut v1 = Vec::with_capacity(n);
        let mut v2 = Vec::with_capacity(n);
        for t in triples {
            v0.push((t.h0 % seg) as u32);
            v1.push((seg + t.h1 % seg) as u32);
            v2.push((2 * seg + t.h2 % seg) as u32);
        }

        let peeling =
            peel_hypergraph(m, &v0, &v1, &v2).ok_or(MphfError::ConstructionFailed)?;

        // Plant values in reverse peel order. The hinge cell is still zero
        // when its edge is processed, so XORing all three cells into the
        // value leaves exactly the missing share.
        let mut data = CompactArray::new(width, m);
        for &e in peeling.order.iter().rev() {
            let e = e as usize;
            let cell = values(e)
                ^ data.get(v0[e] as usize)
                ^ data.get(v1[e] as usize)
                ^ data.get(v2[e] as usize);
            data.set(peeling.hinges[e] as usize, cell);
        }

        Ok(Self {
            n: n as u64,
            seg,
            width,
            seed,
            data,
        })
    }

    pub(crate) fn trivial(n: u64, width: u32) -> Self {
        Self {
            n,
            seg: 1,
            width,
            seed: 0,
            data: CompactArray::default(),
        }
    }

    /// Value stored for the key hashing to `t`. Never fails; unknown triples
    /// yield arbitrary `width`-bit values.
    #[inline]
    pub fn get_by_triple(&self, t: HashTriple) -> u64 {
        if self.data.is_empty() {
            return 0;
        }
        let seg = self.seg;
        self.data.get((t.h0 % seg) as usize)
            ^ self.data.get((seg + t.h1 % seg) as usize)
            ^ self.data.get((2 * seg + t.h2 % seg) as usize)
    }

    #[inline]
    pub fn get(&self, bv: &BitVector) -> u64 {
        self.get_by_triple(jenkins(bv, self.seed))
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
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Bits of owned cell storage.
    pub fn num_bits(&self) -> u64 {
        self.data.num_bits()
    }
}

/// Segment size `m / 3` for `n` edges: `ceil(gamma * n)` vertices rounded up
/// to a multiple of three, with a few spare vertices so tiny graphs stay
/// clear of the peelability threshold (one vertex per segment could never
/// give two edges distinct triples).
#[inline]
pub(crate) fn segment_size(n: usize, gamma: f64) -> u64 {
    ((gamma * n as f64).ceil() as u64 + 8).div_ceil(3)
}
