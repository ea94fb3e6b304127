use std::fmt;

use tracing::warn;

use crate::{
    config::ChaosConfig,
    error::{KeyRejection, VeilResult},
};

/// Keys closer than this to an excluded point are treated as that point.
pub const KEY_EXCLUSION_RADIUS: f64 = 1e-12;
const EXCLUDED_KEYS: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];
const CYCLE_WINDOW: usize = 8;

/// Initial condition of the logistic map. Owned by the obfuscating party only.
#[derive(Clone, Copy, PartialEq)]
pub struct SecretKey(f64);

impl SecretKey {
    pub fn new(value: f64) -> VeilResult<Self> {
        let rejection = if !value.is_finite() {
            Some(KeyRejection::NonFinite)
        } else if value <= 0.0 || value >= 1.0 {
            Some(KeyRejection::OutOfDomain)
        } else if EXCLUDED_KEYS
            .iter()
            .any(|point| (value - point).abs() < KEY_EXCLUSION_RADIUS)
        {
            Some(KeyRejection::ExcludedPoint)
        } else {
            None
        };
        match rejection {
            Some(reason) => {
                warn!(%reason, "secret key rejected");
                Err(reason.into())
            }
            None => Ok(Self(value)),
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Deterministic real-valued sequence derived from a secret key.
pub trait ChaosSource: Send + Sync {
    fn sequence(&self, key: &SecretKey, len: usize) -> VeilResult<Vec<f64>>;
}

/// `x_{k+1} = r * x_k * (1 - x_k)` with a discarded burn-in prefix.
#[derive(Clone, Debug, PartialEq)]
pub struct LogisticMap {
    r: f64,
    burn_in: usize,
}

impl Default for LogisticMap {
    fn default() -> Self {
        let config = ChaosConfig::default();
        Self {
            r: config.control_parameter,
            burn_in: config.burn_in,
        }
    }
}

impl LogisticMap {
    pub fn new(config: &ChaosConfig) -> VeilResult<Self> {
        config.validate()?;
        Ok(Self {
            r: config.control_parameter,
            burn_in: config.burn_in,
        })
    }

    pub fn control_parameter(&self) -> f64 {
        self.r
    }

    pub fn burn_in(&self) -> usize {
        self.burn_in
    }

    /// Non-trivial fixed point `1 - 1/r`.
    pub fn fixed_point(&self) -> f64 {
        1.0 - 1.0 / self.r
    }

    #[inline]
    fn step(&self, x: f64) -> f64 {
        self.r * x * (1.0 - x)
    }
}

impl ChaosSource for LogisticMap {
    fn sequence(&self, key: &SecretKey, len: usize) -> VeilResult<Vec<f64>> {
        let mut x = key.value();
        if (x - self.fixed_point()).abs() < KEY_EXCLUSION_RADIUS {
            warn!("rejecting key on the logistic fixed point");
            return Err(KeyRejection::ExcludedPoint.into());
        }
        let mut guard = CycleGuard::default();
        for _ in 0..self.burn_in {
            x = self.step(x);
            guard.observe(x)?;
        }
        let mut sequence = Vec::with_capacity(len);
        for _ in 0..len {
            x = self.step(x);
            guard.observe(x)?;
            sequence.push(x);
        }
        Ok(sequence)
    }
}

/// Rejects trajectories that revisit one of their last few values.
#[derive(Default)]
struct CycleGuard {
    recent: [f64; CYCLE_WINDOW],
    filled: usize,
    cursor: usize,
}

impl CycleGuard {
    fn observe(&mut self, x: f64) -> Result<(), KeyRejection> {
        if !(x > 0.0 && x < 1.0) {
            warn!("logistic trajectory left (0, 1)");
            return Err(KeyRejection::ShortCycle { period: 1 });
        }
        for lag in 1..=self.filled {
            let slot = (self.cursor + CYCLE_WINDOW - lag) % CYCLE_WINDOW;
            if self.recent[slot] == x {
                warn!(period = lag, "logistic trajectory collapsed to a short cycle");
                return Err(KeyRejection::ShortCycle { period: lag });
            }
        }
        self.recent[self.cursor] = x;
        self.cursor = (self.cursor + 1) % CYCLE_WINDOW;
        self.filled = (self.filled + 1).min(CYCLE_WINDOW);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VeilError;

    fn key(value: f64) -> SecretKey {
        SecretKey::new(value).expect("valid key")
    }

    #[test]
    fn sequence_is_bit_reproducible() {
        let map = LogisticMap::default();
        let a = map.sequence(&key(0.45), 4_096).unwrap();
        let b = map.sequence(&key(0.45), 4_096).unwrap();
        assert_eq!(a.len(), 4_096);
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn values_stay_inside_unit_interval() {
        let sequence = LogisticMap::default().sequence(&key(0.123), 10_000).unwrap();
        assert!(sequence.iter().all(|x| *x > 0.0 && *x < 1.0));
    }

    #[test]
    fn burn_in_prefix_is_discarded() {
        let map = LogisticMap::default();
        let first = map.sequence(&key(0.3), 1).unwrap()[0];
        let mut x = 0.3;
        for _ in 0..=map.burn_in() {
            x = map.control_parameter() * x * (1.0 - x);
        }
        assert_eq!(first.to_bits(), x.to_bits());
    }

    #[test]
    fn nearby_keys_diverge() {
        let map = LogisticMap::default();
        let a = map.sequence(&key(0.45), 64).unwrap();
        let b = map.sequence(&key(0.45 + 1e-10), 64).unwrap();
        let max_gap = a
            .iter()
            .zip(&b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max);
        assert!(max_gap > 0.1, "max gap {max_gap}");
    }

    #[test]
    fn rejects_degenerate_keys() {
        for value in [0.0, 0.25, 0.5, 0.75, 1.0] {
            assert!(matches!(
                SecretKey::new(value),
                Err(VeilError::InvalidKey { .. })
            ));
        }
        assert!(matches!(
            SecretKey::new(f64::NAN),
            Err(VeilError::InvalidKey {
                reason: KeyRejection::NonFinite
            })
        ));
        assert!(matches!(
            SecretKey::new(1.5),
            Err(VeilError::InvalidKey {
                reason: KeyRejection::OutOfDomain
            })
        ));
    }

    #[test]
    fn rejects_fixed_point_of_map() {
        let map = LogisticMap::default();
        let fixed = key(map.fixed_point());
        assert!(matches!(
            map.sequence(&fixed, 16),
            Err(VeilError::InvalidKey {
                reason: KeyRejection::ExcludedPoint
            })
        ));
    }

    #[test]
    fn cycle_guard_flags_repeats() {
        let mut guard = CycleGuard::default();
        guard.observe(0.2).unwrap();
        guard.observe(0.7).unwrap();
        assert_eq!(
            guard.observe(0.2),
            Err(KeyRejection::ShortCycle { period: 2 })
        );
    }

    #[test]
    fn debug_output_hides_key() {
        assert_eq!(format!("{:?}", key(0.4321)), "SecretKey(..)");
    }
}
