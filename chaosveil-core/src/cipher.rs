use std::sync::Arc;

use nalgebra::DVector;
use rayon::prelude::*;
use tracing::debug;

use crate::{
    error::{VeilError, VeilResult},
    matrix::RotationMatrix,
    search::Candidate,
};

/// Linear obfuscation `v -> Q·v` and its inverse `e -> Qᵀ·e`.
///
/// Not encryption in the cryptographic sense: anyone holding enough
/// (plain, rotated) pairs can solve for `Q`.
#[derive(Clone, Debug)]
pub struct RotationCipher {
    matrix: Arc<RotationMatrix>,
}

impl RotationCipher {
    pub fn new(matrix: Arc<RotationMatrix>) -> Self {
        Self { matrix }
    }

    pub fn dimension(&self) -> usize {
        self.matrix.dimension()
    }

    pub fn matrix(&self) -> &RotationMatrix {
        &self.matrix
    }

    pub fn encrypt(&self, vector: &[f64]) -> VeilResult<Vec<f64>> {
        self.check(vector.len())?;
        Ok(self.rotate(vector))
    }

    pub fn decrypt(&self, encrypted: &[f64]) -> VeilResult<Vec<f64>> {
        self.check(encrypted.len())?;
        Ok(self.unrotate(encrypted))
    }

    /// Every row is checked before any is rotated; output order is input order.
    pub fn encrypt_batch(&self, vectors: &[Vec<f64>]) -> VeilResult<Vec<Vec<f64>>> {
        self.check_all(vectors.iter().map(Vec::len))?;
        debug!(rows = vectors.len(), dimension = self.dimension(), "encrypting batch");
        Ok(vectors.par_iter().map(|row| self.rotate(row)).collect())
    }

    pub fn decrypt_batch(&self, encrypted: &[Vec<f64>]) -> VeilResult<Vec<Vec<f64>>> {
        self.check_all(encrypted.iter().map(Vec::len))?;
        debug!(rows = encrypted.len(), dimension = self.dimension(), "decrypting batch");
        Ok(encrypted.par_iter().map(|row| self.unrotate(row)).collect())
    }

    pub fn encrypt_candidates<I>(&self, items: &[Candidate<I>]) -> VeilResult<Vec<Candidate<I>>>
    where
        I: Clone + Send + Sync,
    {
        self.check_all(items.iter().map(|item| item.vector.len()))?;
        Ok(items
            .par_iter()
            .map(|item| Candidate::new(item.id.clone(), self.rotate(&item.vector)))
            .collect())
    }

    pub fn decrypt_candidates<I>(&self, items: &[Candidate<I>]) -> VeilResult<Vec<Candidate<I>>>
    where
        I: Clone + Send + Sync,
    {
        self.check_all(items.iter().map(|item| item.vector.len()))?;
        Ok(items
            .par_iter()
            .map(|item| Candidate::new(item.id.clone(), self.unrotate(&item.vector)))
            .collect())
    }

    fn rotate(&self, vector: &[f64]) -> Vec<f64> {
        let v = DVector::from_column_slice(vector);
        (self.matrix.as_matrix() * v).iter().copied().collect()
    }

    fn unrotate(&self, encrypted: &[f64]) -> Vec<f64> {
        let e = DVector::from_column_slice(encrypted);
        self.matrix.as_matrix().tr_mul(&e).iter().copied().collect()
    }

    fn check(&self, len: usize) -> VeilResult<()> {
        if len != self.dimension() {
            return Err(VeilError::mismatch(self.dimension(), len));
        }
        Ok(())
    }

    fn check_all(&self, mut lengths: impl Iterator<Item = usize>) -> VeilResult<()> {
        match lengths.find(|len| *len != self.dimension()) {
            Some(len) => Err(VeilError::mismatch(self.dimension(), len)),
            None => Ok(()),
        }
    }
}
