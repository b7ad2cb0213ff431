//! Temporal scoring configuration.
//!
//! A frozen, validated parameter set read once at startup. Every option has
//! a default and may be overridden per-process through `REMANENCE_`-prefixed
//! environment variables (e.g. `REMANENCE_DECAY_LAMBDA=0.1`). Unrecognized
//! `REMANENCE_` variables are ignored with a warning. Runtime changes are
//! not supported; tuning requires a restart.

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

/// Environment variable prefix for all config overrides
pub const ENV_PREFIX: &str = "REMANENCE_";

// ============================================================================
// CONFIG
// ============================================================================

/// Parameters for temporal scoring, rehearsal, and eviction
///
/// Shared read-only after startup (wrap in `Arc`). See [`TemporalConfig::from_env`]
/// for the environment override mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalConfig {
    /// Master switch. When false the temporal score collapses to the clamped
    /// importance and neither rehearsal nor eviction occurs.
    pub enabled: bool,
    /// Rate of the exponential decay component, per day. Higher forgets faster.
    pub decay_lambda: f64,
    /// Exponent of the power-law decay component. Higher keeps a longer tail.
    pub decay_alpha: f64,
    /// Normalized relevance at or above which a retrieved item is strengthened.
    pub rehearsal_threshold: f64,
    /// Temporal score strictly below which an item becomes evictable.
    pub deletion_threshold: f64,
    /// Absolute age in days beyond which an item is evicted regardless of score.
    pub max_age_days: f64,
    /// Weight of normalized relevance in the combined retrieval score.
    pub retrieval_weight_relevance: f64,
    /// Weight of the temporal score in the combined retrieval score.
    pub retrieval_weight_temporal: f64,
    /// Additive importance increment applied on rehearsal.
    pub rehearsal_boost: f64,
    /// Upper clamp of importance.
    pub max_importance: f64,
    /// Lower clamp of importance.
    pub min_importance: f64,
    /// Divisor applied to raw BM25 scores before clamping to [0, 1].
    pub relevance_normalization_scale: f64,
    /// Per-day exponent inside the recency bonus.
    pub recency_halving_rate: f64,
    /// Additive weight of the recency term in the temporal score.
    pub recency_weight: f64,
    /// Additive weight of the frequency term in the temporal score.
    pub frequency_weight: f64,
    /// Divisor applied to `log2(access_count + 1)`.
    pub frequency_scale: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decay_lambda: 0.05,
            decay_alpha: 1.5,
            rehearsal_threshold: 0.7,
            deletion_threshold: 0.1,
            max_age_days: 365.0,
            retrieval_weight_relevance: 0.6,
            retrieval_weight_temporal: 0.4,
            rehearsal_boost: 0.05,
            max_importance: 1.0,
            min_importance: 0.0,
            relevance_normalization_scale: 10.0,
            recency_halving_rate: 0.1,
            recency_weight: 0.3,
            frequency_weight: 0.2,
            frequency_scale: 10.0,
        }
    }
}

impl TemporalConfig {
    /// Load defaults, apply `REMANENCE_*` environment overrides, validate
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`from_env`](Self::from_env) but over an explicit variable set
    pub fn from_vars(vars: impl Iterator<Item = (String, String)>) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(option) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match option {
                "ENABLED" => config.enabled = parse_bool(&key, &value)?,
                "DECAY_LAMBDA" => config.decay_lambda = parse_f64(&key, &value)?,
                "DECAY_ALPHA" => config.decay_alpha = parse_f64(&key, &value)?,
                "REHEARSAL_THRESHOLD" => config.rehearsal_threshold = parse_f64(&key, &value)?,
                "DELETION_THRESHOLD" => config.deletion_threshold = parse_f64(&key, &value)?,
                "MAX_AGE_DAYS" => config.max_age_days = parse_f64(&key, &value)?,
                "RETRIEVAL_WEIGHT_RELEVANCE" => {
                    config.retrieval_weight_relevance = parse_f64(&key, &value)?
                }
                "RETRIEVAL_WEIGHT_TEMPORAL" => {
                    config.retrieval_weight_temporal = parse_f64(&key, &value)?
                }
                "REHEARSAL_BOOST" => config.rehearsal_boost = parse_f64(&key, &value)?,
                "MAX_IMPORTANCE" => config.max_importance = parse_f64(&key, &value)?,
                "MIN_IMPORTANCE" => config.min_importance = parse_f64(&key, &value)?,
                "RELEVANCE_NORMALIZATION_SCALE" => {
                    config.relevance_normalization_scale = parse_f64(&key, &value)?
                }
                "RECENCY_HALVING_RATE" => config.recency_halving_rate = parse_f64(&key, &value)?,
                "RECENCY_WEIGHT" => config.recency_weight = parse_f64(&key, &value)?,
                "FREQUENCY_WEIGHT" => config.frequency_weight = parse_f64(&key, &value)?,
                "FREQUENCY_SCALE" => config.frequency_scale = parse_f64(&key, &value)?,
                _ => {
                    tracing::warn!("Ignoring unknown config variable {}", key);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges; called by `from_env`/`from_vars`
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("decay_lambda", self.decay_lambda),
            ("decay_alpha", self.decay_alpha),
            ("rehearsal_threshold", self.rehearsal_threshold),
            ("deletion_threshold", self.deletion_threshold),
            ("max_age_days", self.max_age_days),
            ("retrieval_weight_relevance", self.retrieval_weight_relevance),
            ("retrieval_weight_temporal", self.retrieval_weight_temporal),
            ("rehearsal_boost", self.rehearsal_boost),
            ("recency_halving_rate", self.recency_halving_rate),
            ("recency_weight", self.recency_weight),
            ("frequency_weight", self.frequency_weight),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(MemoryError::Init(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }

        if self.relevance_normalization_scale <= 0.0 || !self.relevance_normalization_scale.is_finite() {
            return Err(MemoryError::Init(format!(
                "relevance_normalization_scale must be positive, got {}",
                self.relevance_normalization_scale
            )));
        }
        if self.frequency_scale <= 0.0 || !self.frequency_scale.is_finite() {
            return Err(MemoryError::Init(format!(
                "frequency_scale must be positive, got {}",
                self.frequency_scale
            )));
        }
        if !self.min_importance.is_finite()
            || !self.max_importance.is_finite()
            || self.min_importance > self.max_importance
        {
            return Err(MemoryError::Init(format!(
                "importance clamp range [{}, {}] is invalid",
                self.min_importance, self.max_importance
            )));
        }

        // Decay rates must be strictly positive while scoring is live,
        // otherwise the decay curves degenerate to constants.
        if self.enabled {
            for (name, value) in [
                ("decay_lambda", self.decay_lambda),
                ("decay_alpha", self.decay_alpha),
                ("recency_halving_rate", self.recency_halving_rate),
            ] {
                if value <= 0.0 {
                    return Err(MemoryError::Init(format!(
                        "{} must be > 0 while scoring is enabled, got {}",
                        name, value
                    )));
                }
            }
        }

        Ok(())
    }

    /// Clamp an importance value into the configured range
    pub fn clamp_importance(&self, importance: f64) -> f64 {
        importance.clamp(self.min_importance, self.max_importance)
    }
}

fn parse_f64(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| MemoryError::Init(format!("{} must be a number, got '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(MemoryError::Init(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> std::vec::IntoIter<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn defaults_are_valid() {
        let config = TemporalConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enabled);
        assert_eq!(config.decay_lambda, 0.05);
        assert_eq!(config.retrieval_weight_relevance, 0.6);
        assert_eq!(config.retrieval_weight_temporal, 0.4);
    }

    #[test]
    fn env_overrides_apply() {
        let config = TemporalConfig::from_vars(vars(&[
            ("REMANENCE_DECAY_LAMBDA", "0.2"),
            ("REMANENCE_MAX_AGE_DAYS", "30"),
            ("REMANENCE_ENABLED", "true"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.decay_lambda, 0.2);
        assert_eq!(config.max_age_days, 30.0);
        // Untouched options keep their defaults
        assert_eq!(config.decay_alpha, 1.5);
    }

    #[test]
    fn unknown_prefixed_variable_is_ignored() {
        let config =
            TemporalConfig::from_vars(vars(&[("REMANENCE_NO_SUCH_OPTION", "42")])).unwrap();
        assert_eq!(config, TemporalConfig::default());
    }

    #[test]
    fn malformed_value_is_rejected() {
        let result = TemporalConfig::from_vars(vars(&[("REMANENCE_DECAY_LAMBDA", "fast")]));
        assert!(result.is_err());
    }

    #[test]
    fn zero_decay_rate_rejected_while_enabled() {
        let mut config = TemporalConfig::default();
        config.decay_lambda = 0.0;
        assert!(config.validate().is_err());

        // But fine when scoring is disabled entirely
        config.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_importance_range_rejected() {
        let mut config = TemporalConfig::default();
        config.min_importance = 0.8;
        config.max_importance = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn weights_may_exceed_one_combined() {
        let config = TemporalConfig::from_vars(vars(&[
            ("REMANENCE_RETRIEVAL_WEIGHT_RELEVANCE", "0.9"),
            ("REMANENCE_RETRIEVAL_WEIGHT_TEMPORAL", "0.9"),
        ]))
        .unwrap();
        assert_eq!(config.retrieval_weight_relevance + config.retrieval_weight_temporal, 1.8);
    }

    #[test]
    fn clamp_importance_respects_range() {
        let config = TemporalConfig::default();
        assert_eq!(config.clamp_importance(1.7), 1.0);
        assert_eq!(config.clamp_importance(-0.3), 0.0);
        assert_eq!(config.clamp_importance(0.5), 0.5);
    }
}
