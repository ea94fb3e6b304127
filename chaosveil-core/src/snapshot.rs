//! Serialized form of a rotation matrix for callers that persist `Q`.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    error::{VeilError, VeilResult},
    matrix::{fingerprint, orthogonality_defect, RotationMatrix},
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MatrixSnapshot {
    pub dimension: usize,
    /// Row-major entries, exact f64 values.
    pub entries: Vec<f64>,
    /// Hex BLAKE3 fingerprint of `entries`.
    pub fingerprint: String,
}

impl MatrixSnapshot {
    pub fn to_json(&self) -> VeilResult<String> {
        serde_json::to_string(self).map_err(|err| VeilError::CorruptSnapshot(err.to_string()))
    }

    pub fn from_json(json: &str) -> VeilResult<Self> {
        serde_json::from_str(json).map_err(|err| VeilError::CorruptSnapshot(err.to_string()))
    }
}

impl RotationMatrix {
    pub fn snapshot(&self) -> MatrixSnapshot {
        MatrixSnapshot {
            dimension: self.dimension(),
            entries: self.row_major(),
            fingerprint: self.fingerprint_hex(),
        }
    }

    /// Restores a persisted matrix, refusing anything that is not bit-identical
    /// to what was saved or no longer orthogonal within `tolerance`.
    pub fn from_snapshot(snapshot: &MatrixSnapshot, tolerance: f64) -> VeilResult<Self> {
        let dimension = snapshot.dimension;
        if dimension == 0 {
            return Err(VeilError::CorruptSnapshot("dimension is zero".into()));
        }
        let expected = dimension.checked_mul(dimension).ok_or_else(|| {
            VeilError::CorruptSnapshot(format!("dimension {dimension} overflows"))
        })?;
        if snapshot.entries.len() != expected {
            return Err(VeilError::CorruptSnapshot(format!(
                "expected {expected} entries, found {}",
                snapshot.entries.len()
            )));
        }
        let q = DMatrix::from_row_slice(dimension, dimension, &snapshot.entries);
        let digest = blake3::Hash::from(fingerprint(&q)).to_hex();
        if digest.as_str() != snapshot.fingerprint {
            return Err(VeilError::CorruptSnapshot("fingerprint mismatch".into()));
        }
        let defect = orthogonality_defect(&q);
        if defect > tolerance {
            return Err(VeilError::CorruptSnapshot(format!(
                "orthogonality defect {defect:.3e} exceeds {tolerance:.3e}"
            )));
        }
        Ok(RotationMatrix::from_orthogonal(q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chaos::{ChaosSource, LogisticMap, SecretKey},
        matrix::OrthogonalMatrixBuilder,
    };

    fn matrix(dimension: usize) -> RotationMatrix {
        let sequence = LogisticMap::default()
            .sequence(&SecretKey::new(0.271).unwrap(), dimension * dimension)
            .unwrap();
        OrthogonalMatrixBuilder::default()
            .build(&sequence, dimension)
            .unwrap()
    }

    #[test]
    fn json_restores_identical_matrix() {
        let original = matrix(24);
        let json = original.snapshot().to_json().unwrap();
        let restored =
            RotationMatrix::from_snapshot(&MatrixSnapshot::from_json(&json).unwrap(), 1e-10)
                .unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn detects_tampered_entry() {
        let mut snapshot = matrix(8).snapshot();
        snapshot.entries[3] += 1e-12;
        assert_eq!(
            RotationMatrix::from_snapshot(&snapshot, 1e-10).unwrap_err(),
            VeilError::CorruptSnapshot("fingerprint mismatch".into())
        );
    }

    #[test]
    fn detects_truncated_entries() {
        let mut snapshot = matrix(8).snapshot();
        snapshot.entries.pop();
        assert!(matches!(
            RotationMatrix::from_snapshot(&snapshot, 1e-10),
            Err(VeilError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn rejects_non_orthogonal_entries_with_valid_fingerprint() {
        let entries = vec![1.0, 0.5, 0.0, 1.0];
        let sheared = DMatrix::from_row_slice(2, 2, &entries);
        let snapshot = MatrixSnapshot {
            dimension: 2,
            entries,
            fingerprint: blake3::Hash::from(fingerprint(&sheared)).to_hex().to_string(),
        };
        match RotationMatrix::from_snapshot(&snapshot, 1e-10).unwrap_err() {
            VeilError::CorruptSnapshot(message) => {
                assert!(message.contains("orthogonality defect"), "{message}")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage_json() {
        assert!(matches!(
            MatrixSnapshot::from_json("{\"dimension\": 2}"),
            Err(VeilError::CorruptSnapshot(_))
        ));
    }
}
