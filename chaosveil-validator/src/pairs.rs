//! Externally produced (query, passage) embeddings fed to the validator.

use std::{fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PairsError {
    #[error("unable to read pairs file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse pairs file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{queries} queries but {passages} passages")]
    CountMismatch { queries: usize, passages: usize },
    #[error("pairs file holds no passages")]
    Empty,
    #[error("vector {index} has {actual} components, expected {expected}")]
    Ragged {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// Query `i` is the paraphrase of passage `i`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EmbeddingPairs {
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub queries: Vec<Vec<f64>>,
    pub passages: Vec<Vec<f64>>,
}

impl EmbeddingPairs {
    pub fn load(path: &Path) -> Result<Self, PairsError> {
        let contents = fs::read_to_string(path).map_err(|source| PairsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, PairsError> {
        let pairs: Self = serde_json::from_str(contents)?;
        pairs.check()?;
        Ok(pairs)
    }

    /// Common width of every vector in the file.
    pub fn dimension(&self) -> usize {
        self.passages.first().map_or(0, Vec::len)
    }

    fn check(&self) -> Result<(), PairsError> {
        if self.passages.is_empty() {
            return Err(PairsError::Empty);
        }
        if self.queries.len() != self.passages.len() {
            return Err(PairsError::CountMismatch {
                queries: self.queries.len(),
                passages: self.passages.len(),
            });
        }
        let expected = self.dimension();
        for (index, vector) in self.queries.iter().chain(&self.passages).enumerate() {
            if vector.len() != expected {
                return Err(PairsError::Ragged {
                    index,
                    expected,
                    actual: vector.len(),
                });
            }
        }
        Ok(())
    }
}
