//! ChaosVeil: a distance-preserving obfuscation layer for embedding search.
//!
//! A secret key seeds a logistic-map sequence, the sequence is orthogonalized
//! into a rotation `Q`, and vectors are stored as `Q·v`. Euclidean distance,
//! cosine similarity and inner products survive the rotation, so an untrusted
//! backend can rank encrypted vectors exactly as it would rank the originals.
//!
//! # Trust boundary
//!
//! The transform is linear and recoverable from enough (plain, rotated)
//! pairs. It hides raw embeddings from a passive store; it is **not**
//! semantically secure encryption and offers no known-plaintext resistance.
//!
//! ```
//! use chaosveil_core::{indexed_candidates, ObfuscationEngine};
//!
//! # fn main() -> Result<(), chaosveil_core::VeilError> {
//! let engine = ObfuscationEngine::new(0.45, 4)?;
//! let docs = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]];
//! let encrypted = engine.encrypt_candidates(&indexed_candidates(docs))?;
//! let query = engine.encrypt(&[0.9, 0.1, 0.0, 0.0])?;
//! let hits = engine.search(&query, &encrypted, 1)?;
//! assert_eq!(hits[0].id, 0);
//! # Ok(())
//! # }
//! ```

pub mod chaos;
pub mod cipher;
pub mod config;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod search;
pub mod snapshot;
pub mod synthetic;
pub mod validation;

pub use chaos::{ChaosSource, LogisticMap, SecretKey};
pub use cipher::RotationCipher;
pub use config::{
    load_config, ChaosConfig, ConfigError, ConfigFormat, EngineConfig, KeySection, MatrixConfig,
    SearchConfig, VeilConfig,
};
pub use engine::{EngineHandle, ObfuscationEngine};
pub use error::{KeyRejection, VeilError, VeilResult};
pub use matrix::{OrthogonalMatrixBuilder, RotationMatrix};
pub use search::{
    cosine_similarity, euclidean_distance, indexed_candidates, Candidate, DistanceMetric,
    Neighbor, NeighborSearch,
};
pub use snapshot::MatrixSnapshot;
pub use synthetic::{PlantedScenario, PlantedTarget, SyntheticCorpus};
pub use validation::{
    isometry_probe, retrieval_accuracy, IsometryProbe, RetrievalOutcome, ValidationCriteria,
    ValidationReport, ValidationStatus,
};
