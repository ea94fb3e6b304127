use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    chaos::SecretKey,
    error::{VeilError, VeilResult},
    search::DistanceMetric,
};

pub const DEFAULT_CONTROL_PARAMETER: f64 = 3.99;
pub const DEFAULT_BURN_IN: usize = 1_000;
pub const MIN_BURN_IN: usize = 100;
/// Onset of chaos for the logistic map (Feigenbaum accumulation point).
pub const CHAOS_ONSET: f64 = 3.57;

/// Tuning for the whole transform: sequence, matrix and search stages.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub chaos: ChaosConfig,
    pub matrix: MatrixConfig,
    pub search: SearchConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> VeilResult<()> {
        self.chaos.validate()?;
        self.matrix.validate()?;
        self.search.validate()
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.search.metric = metric;
        self
    }
}

/// Logistic-map parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChaosConfig {
    pub control_parameter: f64,
    /// Iterations discarded before the first emitted value.
    pub burn_in: usize,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            control_parameter: DEFAULT_CONTROL_PARAMETER,
            burn_in: DEFAULT_BURN_IN,
        }
    }
}

impl ChaosConfig {
    pub fn validate(&self) -> VeilResult<()> {
        let r = self.control_parameter;
        if !(CHAOS_ONSET..4.0).contains(&r) {
            return Err(VeilError::InvalidConfig(format!(
                "control parameter {r} outside the chaotic band [{CHAOS_ONSET}, 4.0)"
            )));
        }
        if self.burn_in < MIN_BURN_IN {
            return Err(VeilError::InvalidConfig(format!(
                "burn-in {} below minimum {MIN_BURN_IN}",
                self.burn_in
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct MatrixConfig {
    /// Largest accepted `max|QᵀQ - I|`.
    pub orthogonality_tolerance: f64,
    /// Relative floor for `|R_jj|` below which the input counts as rank deficient.
    pub rank_epsilon: f64,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            orthogonality_tolerance: 1e-10,
            rank_epsilon: 1e-12,
        }
    }
}

impl MatrixConfig {
    pub fn validate(&self) -> VeilResult<()> {
        if !(self.orthogonality_tolerance > 0.0 && self.orthogonality_tolerance < 1.0) {
            return Err(VeilError::InvalidConfig(
                "orthogonality tolerance must lie in (0, 1)".into(),
            ));
        }
        if !(self.rank_epsilon > 0.0 && self.rank_epsilon < 1.0) {
            return Err(VeilError::InvalidConfig(
                "rank epsilon must lie in (0, 1)".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SearchConfig {
    pub metric: DistanceMetric,
    /// Distances closer than this keep their original candidate order.
    pub tie_tolerance: f64,
    /// Candidate count at which distance evaluation moves onto rayon.
    pub parallel_threshold: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            tie_tolerance: 1e-9,
            parallel_threshold: 4_096,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> VeilResult<()> {
        if !(self.tie_tolerance >= 0.0 && self.tie_tolerance.is_finite()) {
            return Err(VeilError::InvalidConfig(
                "tie tolerance must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigFormat {
    Auto,
    Toml,
    Yaml,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format:?} config: {details}")]
    Parse {
        format: ConfigFormat,
        details: String,
    },
    #[error("configuration invalid: {0}")]
    Validation(String),
}

/// Deployment file: the key material handed in by the embedding pipeline plus tuning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct VeilConfig {
    pub key: KeySection,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct KeySection {
    pub secret_key: f64,
    pub dimension: usize,
}

impl VeilConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key.dimension == 0 {
            return Err(ConfigError::Validation(
                "dimension must be greater than zero".into(),
            ));
        }
        SecretKey::new(self.key.secret_key)
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        self.engine
            .validate()
            .map_err(|err| ConfigError::Validation(err.to_string()))
    }

    pub fn sample() -> Self {
        Self {
            key: KeySection {
                secret_key: 0.42,
                dimension: 384,
            },
            engine: EngineConfig::default(),
        }
    }
}

pub fn load_config(path: &Path, format: ConfigFormat) -> Result<VeilConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents, resolve_format(path, format))?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<VeilConfig, ConfigError> {
    match format {
        ConfigFormat::Toml | ConfigFormat::Auto => {
            toml::from_str(contents).map_err(|err| ConfigError::Parse {
                format: ConfigFormat::Toml,
                details: err.to_string(),
            })
        }
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse {
            format,
            details: err.to_string(),
        }),
    }
}

fn resolve_format(path: &Path, format: ConfigFormat) -> ConfigFormat {
    match format {
        ConfigFormat::Auto => match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        },
        _ => format,
    }
}
