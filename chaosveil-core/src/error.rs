use thiserror::Error;

pub type VeilResult<T> = Result<T, VeilError>;

/// Why a secret key was refused. The key value itself is never carried.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum KeyRejection {
    #[error("key is not a finite number")]
    NonFinite,
    #[error("key must lie strictly inside (0, 1)")]
    OutOfDomain,
    #[error("key sits on a degenerate point of the logistic map")]
    ExcludedPoint,
    #[error("trajectory collapsed to a cycle of period {period}")]
    ShortCycle { period: usize },
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum VeilError {
    #[error("invalid key: {reason}")]
    InvalidKey { reason: KeyRejection },
    #[error("matrix construction failed: {0}")]
    MatrixConstruction(String),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("candidate set is empty")]
    EmptyCandidateSet,
    #[error("dimension must be >= 1, got {0}")]
    InvalidDimension(usize),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("matrix snapshot rejected: {0}")]
    CorruptSnapshot(String),
}

impl From<KeyRejection> for VeilError {
    fn from(reason: KeyRejection) -> Self {
        VeilError::InvalidKey { reason }
    }
}

impl VeilError {
    pub(crate) fn mismatch(expected: usize, actual: usize) -> Self {
        VeilError::DimensionMismatch { expected, actual }
    }
}
