use thiserror::Error;

/// Errors surfaced at the builder boundary.
///
/// Queries never fail: out-of-domain or malformed inputs yield the configured
/// sentinel instead.
#[derive(Debug, Error)]
pub enum MphfError {
    #[error("duplicate key detected during build")]
    DuplicateKey,
    #[error("key set is not prefix-free")]
    NotPrefixFree,
    #[error("keys are not in ascending lexicographic order")]
    NotSorted,
    #[error("construction failed after reseed attempts")]
    ConstructionFailed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serde")]
    #[error("serialization error: {0}")]
    Serde(#[from] Box<bincode::ErrorKind>),
}
