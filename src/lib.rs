//! monotone_mphf — monotone minimal perfect hashing (LCP distributors + MWHC
//! retrieval, 3-hypergraph peeling).
//!
//! - Build once on **sorted, distinct, prefix-free** bit-string keys.
//! - O(1) queries: key -> rank in `[0..n)`; non-members yield a sentinel,
//!   probabilistically rejected when a signature is configured.
//! - Robust: unpeelable hypergraphs and hash collisions trigger a bounded,
//!   deterministic reseed.

mod bits;
mod error;
mod hash;
mod mmphf;
mod mwhc;
mod peel;
mod store;
mod transform;
mod two_steps;

pub use bits::{BitVector, CompactArray};
pub use error::MphfError;
pub use hash::{jenkins, HashTriple};
pub use mmphf::{MmphfBuilder, MonotoneMphf, DEFAULT_SENTINEL};
pub use mwhc::{MwhcConfig, MwhcFunction};
pub use peel::{degrees, peel_hypergraph, Peeling};
pub use store::{ChunkedHashStore, HashRecord};
pub use transform::{PrefixFreeBytes, PrefixFreeStr, RawBitVectors, TransformationStrategy};
pub use two_steps::TwoStepsMwhcFunction;
