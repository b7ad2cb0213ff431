//! Temporal scoring engine
//!
//! Pure arithmetic over an item's temporal envelope. No I/O, no clocks:
//! `now` always arrives as a parameter, and every function returns a value
//! in [0, 1] for well-typed inputs — this layer never errors.
//!
//! ## Score anatomy
//!
//! - Decay is a hybrid of an exponential and a power-law curve, weighted by
//!   the item's own importance: low-importance items forget fast, important
//!   ones retain on a long tail, and the blend is continuous in importance.
//! - Recency rewards a fresh `last_accessed_at`, frequency rewards repeated
//!   access with diminishing (logarithmic) returns.
//! - The combined retrieval score mixes normalized query relevance with the
//!   temporal score under configurable weights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TemporalConfig;
use crate::memory::MemoryItem;

/// Seconds per day, the time unit of every decay formula
const SECONDS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// ATTRIBUTE VIEW
// ============================================================================

/// The temporal envelope the engine scores
///
/// Implemented by [`MemoryItem`] and by the store's lightweight scan rows, so
/// decay and admin paths score without materializing full items.
pub trait TemporalAttributes {
    fn created_at(&self) -> DateTime<Utc>;
    fn importance_score(&self) -> f64;
    fn access_count(&self) -> i64;
    fn last_accessed_at(&self) -> Option<DateTime<Utc>>;
}

impl TemporalAttributes for MemoryItem {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn importance_score(&self) -> f64 {
        self.importance_score
    }

    fn access_count(&self) -> i64 {
        self.access_count
    }

    fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        self.last_accessed_at
    }
}

// ============================================================================
// CORE FORMULAS
// ============================================================================

/// Age of an item in days, never negative
pub fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - created_at).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0)
}

/// Hybrid decay factor in [0, 1]
///
/// `(1 - w) * e^(-lambda * t) + w * (1 + t)^(-alpha)` with `w` the clamped
/// importance. At `t = 0` both curves are 1, so a newborn item has decay 1.
pub fn decay_factor(importance: f64, age_days: f64, config: &TemporalConfig) -> f64 {
    let w = config.clamp_importance(importance);
    let t = age_days.max(0.0);

    let exp_term = (-config.decay_lambda * t).exp();
    let power_term = (1.0 + t).powf(-config.decay_alpha);

    ((1.0 - w) * exp_term + w * power_term).clamp(0.0, 1.0)
}

/// Recency bonus in [0, 1]; 0 for items never accessed
pub fn recency_bonus(
    last_accessed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &TemporalConfig,
) -> f64 {
    match last_accessed_at {
        None => 0.0,
        Some(accessed) => {
            let delta_days = ((now - accessed).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
            (-config.recency_halving_rate * delta_days).exp().clamp(0.0, 1.0)
        }
    }
}

/// Frequency score in [0, 1]: `min(1, log2(access_count + 1) / scale)`
///
/// Zero accesses score exactly 0; each further access adds less than the one
/// before it.
pub fn frequency_score(access_count: i64, config: &TemporalConfig) -> f64 {
    let count = access_count.max(0) as f64;
    ((count + 1.0).log2() / config.frequency_scale).min(1.0)
}

/// Temporal score in [0, 1]: how "alive" an item is, independent of any query
///
/// `importance * decay + recency_weight * recency + frequency_weight * frequency`,
/// clamped. When scoring is disabled this collapses to the clamped importance.
pub fn temporal_score(
    item: &impl TemporalAttributes,
    now: DateTime<Utc>,
    config: &TemporalConfig,
) -> f64 {
    if !config.enabled {
        return item.importance_score().clamp(0.0, 1.0);
    }

    let t = age_days(item.created_at(), now);
    let decay = decay_factor(item.importance_score(), t, config);
    let recency = recency_bonus(item.last_accessed_at(), now, config);
    let frequency = frequency_score(item.access_count(), config);

    (item.importance_score() * decay
        + config.recency_weight * recency
        + config.frequency_weight * frequency)
        .clamp(0.0, 1.0)
}

// ============================================================================
// RELEVANCE
// ============================================================================

/// Normalize a raw BM25 score to [0, 1] by the configured scale
pub fn normalize_lexical(raw_bm25: f64, config: &TemporalConfig) -> f64 {
    (raw_bm25.max(0.0) / config.relevance_normalization_scale).min(1.0)
}

/// Normalize a cosine similarity to [0, 1]; negative similarity is no relevance
pub fn normalize_vector(cosine: f64) -> f64 {
    cosine.clamp(0.0, 1.0)
}

/// Combine lexical and vector relevance when both matched: the maximum
///
/// Any monotone aggregation in [0, 1] is admissible; max keeps either signal
/// sufficient on its own.
pub fn combine_relevance(lexical: Option<f64>, vector: Option<f64>) -> f64 {
    match (lexical, vector) {
        (Some(l), Some(v)) => l.max(v),
        (Some(l), None) => l,
        (None, Some(v)) => v,
        (None, None) => 0.0,
    }
}

/// Combined retrieval score in [0, 1]
pub fn combined_score(relevance: f64, temporal: f64, w_rel: f64, w_tmp: f64) -> f64 {
    (w_rel * relevance + w_tmp * temporal).clamp(0.0, 1.0)
}

// ============================================================================
// RANK ORDERING
// ============================================================================

/// The sort key of one ranked candidate
#[derive(Debug, Clone)]
pub struct RankKey<'a> {
    pub combined: f64,
    pub relevance: f64,
    pub created_at: DateTime<Utc>,
    pub id: &'a str,
}

/// Deterministic rank ordering: combined desc, then relevance desc, then
/// newer `created_at` first, then lexicographically smaller id
///
/// Two retrievals over the same candidate set and clock produce identical
/// orders.
pub fn rank_ordering(a: &RankKey<'_>, b: &RankKey<'_>) -> std::cmp::Ordering {
    b.combined
        .total_cmp(&a.combined)
        .then_with(|| b.relevance.total_cmp(&a.relevance))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(b.id))
}

// ============================================================================
// REHEARSAL
// ============================================================================

/// Whether a retrieval at this relevance strengthens the item
pub fn should_rehearse(relevance: f64, config: &TemporalConfig) -> bool {
    config.enabled && relevance >= config.rehearsal_threshold
}

/// Importance after one rehearsal: boosted, clamped to the upper bound
pub fn rehearsed_importance(importance: f64, config: &TemporalConfig) -> f64 {
    (importance + config.rehearsal_boost).min(config.max_importance)
}

// ============================================================================
// DELETION
// ============================================================================

/// Why an item became evictable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    /// Age strictly exceeded `max_age_days`
    ExceededMaxAge,
    /// Temporal score fell strictly below `deletion_threshold`
    ScoreBelowThreshold,
}

impl DeletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionReason::ExceededMaxAge => "exceeded max age",
            DeletionReason::ScoreBelowThreshold => "temporal score below threshold",
        }
    }
}

impl std::fmt::Display for DeletionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deletion predicate: `Some(reason)` when the item is forgettable
///
/// Age is checked first; both bounds are strict, so an item exactly at
/// `max_age_days` or exactly at `deletion_threshold` is retained. Disabled
/// scoring never deletes.
pub fn should_delete(
    item: &impl TemporalAttributes,
    now: DateTime<Utc>,
    config: &TemporalConfig,
) -> Option<DeletionReason> {
    if !config.enabled {
        return None;
    }

    if age_days(item.created_at(), now) > config.max_age_days {
        return Some(DeletionReason::ExceededMaxAge);
    }
    if temporal_score(item, now, config) < config.deletion_threshold {
        return Some(DeletionReason::ScoreBelowThreshold);
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================
