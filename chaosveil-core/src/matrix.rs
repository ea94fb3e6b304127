//! Orthogonal matrix construction.
//!
//! The chaotic sequence is reshaped row-major into `M`, factored as `M = QR`
//! with Householder reflections, and `R` is dropped. QR is unique only up to
//! the sign of each column of `Q`, so the builder flips every column whose
//! matching diagonal entry of `R` is negative. After that step `diag(R) > 0`
//! and two builders fed the same sequence agree bit for bit.

use blake3::Hasher;
use nalgebra::DMatrix;
use tracing::{info, warn};

use crate::{
    config::MatrixConfig,
    error::{VeilError, VeilResult},
};

const FINGERPRINT_DOMAIN: &[u8] = b"chaosveil/rotation/v1";

/// Immutable d×d orthogonal matrix `Q`. Its transpose is the inverse transform.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationMatrix {
    q: DMatrix<f64>,
    fingerprint: [u8; 32],
}

impl RotationMatrix {
    pub(crate) fn from_orthogonal(q: DMatrix<f64>) -> Self {
        let fingerprint = fingerprint(&q);
        Self { q, fingerprint }
    }

    pub fn dimension(&self) -> usize {
        self.q.nrows()
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.q
    }

    /// BLAKE3 digest of the exact entries; identifies the key without revealing it.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    pub fn fingerprint_hex(&self) -> String {
        blake3::Hash::from(self.fingerprint).to_hex().to_string()
    }

    /// `max |QᵀQ - I|`.
    pub fn orthogonality_defect(&self) -> f64 {
        orthogonality_defect(&self.q)
    }

    pub fn row_major(&self) -> Vec<f64> {
        let n = self.dimension();
        let mut entries = Vec::with_capacity(n * n);
        for row in self.q.row_iter() {
            entries.extend(row.iter().copied());
        }
        entries
    }
}

#[derive(Clone, Debug, Default)]
pub struct OrthogonalMatrixBuilder {
    config: MatrixConfig,
}

impl OrthogonalMatrixBuilder {
    pub fn new(config: MatrixConfig) -> VeilResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    pub fn build(&self, sequence: &[f64], dimension: usize) -> VeilResult<RotationMatrix> {
        if dimension == 0 {
            return Err(VeilError::InvalidDimension(dimension));
        }
        let expected = dimension
            .checked_mul(dimension)
            .ok_or(VeilError::InvalidDimension(dimension))?;
        if sequence.len() != expected {
            return Err(VeilError::mismatch(expected, sequence.len()));
        }

        let qr = DMatrix::from_row_slice(dimension, dimension, sequence).qr();
        let r = qr.r();
        let mut q = qr.q();

        let scale = (0..dimension).map(|j| r[(j, j)].abs()).fold(0.0, f64::max);
        if !scale.is_finite() || scale == 0.0 {
            warn!(dimension, "QR produced a degenerate triangular factor");
            return Err(VeilError::MatrixConstruction(
                "triangular factor is zero or non-finite".into(),
            ));
        }
        for j in 0..dimension {
            let pivot = r[(j, j)];
            if !pivot.is_finite() || pivot.abs() <= self.config.rank_epsilon * scale {
                warn!(dimension, column = j, "chaotic matrix is rank deficient");
                return Err(VeilError::MatrixConstruction(format!(
                    "rank deficient input: |R[{j},{j}]| = {:.3e}",
                    pivot.abs()
                )));
            }
            if pivot < 0.0 {
                for value in q.column_mut(j).iter_mut() {
                    *value = -*value;
                }
            }
        }

        let defect = orthogonality_defect(&q);
        if defect > self.config.orthogonality_tolerance {
            warn!(dimension, defect, "orthogonality check failed");
            return Err(VeilError::MatrixConstruction(format!(
                "orthogonality defect {defect:.3e} exceeds {:.3e}",
                self.config.orthogonality_tolerance
            )));
        }

        let matrix = RotationMatrix::from_orthogonal(q);
        let fingerprint = matrix.fingerprint_hex();
        info!(
            dimension,
            defect,
            fingerprint = %&fingerprint[..16],
            "rotation matrix ready"
        );
        Ok(matrix)
    }
}

pub(crate) fn orthogonality_defect(q: &DMatrix<f64>) -> f64 {
    let gram = q.tr_mul(q);
    let mut worst = 0.0_f64;
    for j in 0..gram.ncols() {
        for i in 0..gram.nrows() {
            let target = if i == j { 1.0 } else { 0.0 };
            let deviation = (gram[(i, j)] - target).abs();
            if !deviation.is_finite() {
                return f64::INFINITY;
            }
            worst = worst.max(deviation);
        }
    }
    worst
}

pub(crate) fn fingerprint(q: &DMatrix<f64>) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(FINGERPRINT_DOMAIN);
    hasher.update(&(q.nrows() as u64).to_le_bytes());
    for row in q.row_iter() {
        for value in row.iter() {
            hasher.update(&value.to_le_bytes());
        }
    }
    *hasher.finalize().as_bytes()
}
