use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::{
    chaos::{ChaosSource, LogisticMap, SecretKey},
    cipher::RotationCipher,
    config::{EngineConfig, VeilConfig},
    error::{VeilError, VeilResult},
    matrix::{OrthogonalMatrixBuilder, RotationMatrix},
    search::{Candidate, Neighbor, NeighborSearch},
};

/// One key, one dimension, one cached rotation. Immutable once built and
/// safe to share across threads; build another engine for another key.
#[derive(Clone, Debug)]
pub struct ObfuscationEngine {
    config: EngineConfig,
    cipher: RotationCipher,
    search: NeighborSearch,
}

impl ObfuscationEngine {
    pub fn new(secret_key: f64, dimension: usize) -> VeilResult<Self> {
        Self::with_config(SecretKey::new(secret_key)?, dimension, EngineConfig::default())
    }

    pub fn with_config(
        key: SecretKey,
        dimension: usize,
        config: EngineConfig,
    ) -> VeilResult<Self> {
        config.validate()?;
        let source = LogisticMap::new(&config.chaos)?;
        Self::from_source(&source, key, dimension, config)
    }

    pub fn from_config(config: &VeilConfig) -> VeilResult<Self> {
        Self::with_config(
            SecretKey::new(config.key.secret_key)?,
            config.key.dimension,
            config.engine.clone(),
        )
    }

    /// Builds the rotation from an arbitrary chaos source.
    pub fn from_source(
        source: &dyn ChaosSource,
        key: SecretKey,
        dimension: usize,
        config: EngineConfig,
    ) -> VeilResult<Self> {
        if dimension == 0 {
            return Err(VeilError::InvalidDimension(dimension));
        }
        let len = dimension
            .checked_mul(dimension)
            .ok_or(VeilError::InvalidDimension(dimension))?;
        let sequence = source.sequence(&key, len)?;
        let matrix =
            OrthogonalMatrixBuilder::new(config.matrix.clone())?.build(&sequence, dimension)?;
        Self::from_matrix(Arc::new(matrix), config)
    }

    /// Wraps an already built (for example restored) rotation.
    pub fn from_matrix(matrix: Arc<RotationMatrix>, config: EngineConfig) -> VeilResult<Self> {
        config.validate()?;
        let search = NeighborSearch::new(config.search.clone())?;
        let engine = Self {
            cipher: RotationCipher::new(matrix),
            search,
            config,
        };
        let fingerprint = engine.fingerprint_hex();
        info!(
            dimension = engine.dimension(),
            metric = ?engine.config.search.metric,
            fingerprint = %&fingerprint[..16],
            "obfuscation engine ready"
        );
        Ok(engine)
    }

    pub fn dimension(&self) -> usize {
        self.cipher.dimension()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn matrix(&self) -> &RotationMatrix {
        self.cipher.matrix()
    }

    pub fn fingerprint_hex(&self) -> String {
        self.matrix().fingerprint_hex()
    }

    pub fn cipher(&self) -> &RotationCipher {
        &self.cipher
    }

    pub fn searcher(&self) -> &NeighborSearch {
        &self.search
    }

    pub fn encrypt(&self, vector: &[f64]) -> VeilResult<Vec<f64>> {
        self.cipher.encrypt(vector)
    }

    pub fn decrypt(&self, encrypted: &[f64]) -> VeilResult<Vec<f64>> {
        self.cipher.decrypt(encrypted)
    }

    pub fn encrypt_batch(&self, vectors: &[Vec<f64>]) -> VeilResult<Vec<Vec<f64>>> {
        self.cipher.encrypt_batch(vectors)
    }

    pub fn decrypt_batch(&self, encrypted: &[Vec<f64>]) -> VeilResult<Vec<Vec<f64>>> {
        self.cipher.decrypt_batch(encrypted)
    }

    pub fn encrypt_candidates<I>(&self, items: &[Candidate<I>]) -> VeilResult<Vec<Candidate<I>>>
    where
        I: Clone + Send + Sync,
    {
        self.cipher.encrypt_candidates(items)
    }

    /// Searches encrypted candidates with an encrypted query of this engine's dimension.
    pub fn search<I>(
        &self,
        query: &[f64],
        candidates: &[Candidate<I>],
        top_k: usize,
    ) -> VeilResult<Vec<Neighbor<I>>>
    where
        I: Clone + Send + Sync,
    {
        if query.len() != self.dimension() {
            return Err(VeilError::mismatch(self.dimension(), query.len()));
        }
        self.search.search(query, candidates, top_k)
    }

    pub fn search_batch<I>(
        &self,
        queries: &[Vec<f64>],
        candidates: &[Candidate<I>],
        top_k: usize,
    ) -> VeilResult<Vec<Vec<Neighbor<I>>>>
    where
        I: Clone + Send + Sync,
    {
        if let Some(bad) = queries.iter().find(|query| query.len() != self.dimension()) {
            return Err(VeilError::mismatch(self.dimension(), bad.len()));
        }
        self.search.search_batch(queries, candidates, top_k)
    }
}

/// Shared slot for the active engine. Readers take an `Arc` snapshot and never
/// wait on each other; only re-keying takes the write lock.
pub struct EngineHandle {
    current: RwLock<Arc<ObfuscationEngine>>,
    rekeying: Mutex<()>,
}

impl EngineHandle {
    pub fn new(engine: ObfuscationEngine) -> Self {
        Self {
            current: RwLock::new(Arc::new(engine)),
            rekeying: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Arc<ObfuscationEngine> {
        self.current.read().clone()
    }

    /// Builds a new engine with the current tuning and swaps it in. On error the
    /// previous engine stays active.
    pub fn rekey(&self, key: SecretKey, dimension: usize) -> VeilResult<Arc<ObfuscationEngine>> {
        let _guard = self.rekeying.lock();
        let config = self.current().config().clone();
        let fresh = Arc::new(ObfuscationEngine::with_config(key, dimension, config)?);
        let previous = std::mem::replace(&mut *self.current.write(), Arc::clone(&fresh));
        let (old, new) = (previous.fingerprint_hex(), fresh.fingerprint_hex());
        info!(
            previous = %&old[..16],
            current = %&new[..16],
            dimension,
            "engine re-keyed"
        );
        Ok(fresh)
    }

    /// Installs a prebuilt engine and returns the one it replaced.
    pub fn replace(&self, engine: ObfuscationEngine) -> Arc<ObfuscationEngine> {
        let _guard = self.rekeying.lock();
        std::mem::replace(&mut *self.current.write(), Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::indexed_candidates;

    #[test]
    fn rejects_zero_dimension() {
        assert_eq!(
            ObfuscationEngine::new(0.4, 0).unwrap_err(),
            VeilError::InvalidDimension(0)
        );
    }

    #[test]
    fn search_checks_query_dimension() {
        let engine = ObfuscationEngine::new(0.4, 4).unwrap();
        let candidates = indexed_candidates(vec![vec![0.0; 3]]);
        assert_eq!(
            engine.search(&[0.0; 3], &candidates, 1),
            Err(VeilError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn from_config_uses_key_section() {
        let mut config = VeilConfig::sample();
        config.key.dimension = 12;
        let engine = ObfuscationEngine::from_config(&config).unwrap();
        let direct = ObfuscationEngine::new(config.key.secret_key, 12).unwrap();
        assert_eq!(engine.matrix(), direct.matrix());
    }

    #[test]
    fn failed_rekey_keeps_previous_engine() {
        let handle = EngineHandle::new(ObfuscationEngine::new(0.4, 6).unwrap());
        let before = handle.current().fingerprint_hex();
        let err = handle.rekey(SecretKey::new(0.3).unwrap(), 0).unwrap_err();
        assert_eq!(err, VeilError::InvalidDimension(0));
        assert_eq!(handle.current().fingerprint_hex(), before);
    }

    #[test]
    fn rekey_swaps_matrix() {
        let handle = EngineHandle::new(ObfuscationEngine::new(0.4, 6).unwrap());
        let old = handle.current();
        let fresh = handle.rekey(SecretKey::new(0.41).unwrap(), 8).unwrap();
        assert_eq!(handle.current().dimension(), 8);
        assert_ne!(old.fingerprint_hex(), fresh.fingerprint_hex());
        // Holders of the old snapshot keep a working engine.
        assert_eq!(old.encrypt(&[1.0; 6]).unwrap().len(), 6);
    }

    #[test]
    fn replace_installs_restored_engine() {
        let original = ObfuscationEngine::new(0.37, 5).unwrap();
        let snapshot = original.matrix().snapshot();
        let handle = EngineHandle::new(ObfuscationEngine::new(0.61, 5).unwrap());
        let stale = handle.current().fingerprint_hex();

        let restored = RotationMatrix::from_snapshot(&snapshot, 1e-10).unwrap();
        let revived = ObfuscationEngine::from_matrix(Arc::new(restored), EngineConfig::default())
            .unwrap();
        let previous = handle.replace(revived);

        assert_eq!(previous.fingerprint_hex(), stale);
        assert_eq!(handle.current().fingerprint_hex(), original.fingerprint_hex());
        let plain = [0.1, -0.4, 0.3, 0.0, 0.9];
        assert_eq!(
            handle.current().encrypt(&plain).unwrap(),
            original.encrypt(&plain).unwrap()
        );
    }
}
