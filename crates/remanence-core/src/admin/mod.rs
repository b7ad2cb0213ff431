//! Admin views
//!
//! Read-only aggregates for dashboards: item counts, forgettable counts, and
//! per-field distributions. Never mutates the store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::TemporalConfig;
use crate::error::Result;
use crate::memory::{MemoryKind, TenantScope};
use crate::scoring;
use crate::storage::MemoryStore;

/// Rows pulled per page while scanning
const SCAN_PAGE_SIZE: usize = 500;

// ============================================================================
// TYPES
// ============================================================================

/// Field a distribution can be computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionField {
    ImportanceScore,
    AccessCount,
    AgeDays,
}

impl DistributionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionField::ImportanceScore => "importance_score",
            DistributionField::AccessCount => "access_count",
            DistributionField::AgeDays => "age_days",
        }
    }
}

impl std::fmt::Display for DistributionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One histogram bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBucket {
    pub label: String,
    pub count: u64,
}

/// A bucketed distribution over one field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub kind: MemoryKind,
    pub field: DistributionField,
    pub buckets: Vec<HistogramBucket>,
    pub total: u64,
}

// ============================================================================
// ADMIN VIEWS
// ============================================================================

/// Read-only aggregate queries over a shared store
pub struct AdminViews {
    store: Arc<MemoryStore>,
    config: Arc<TemporalConfig>,
    clock: Arc<dyn Clock>,
}

impl AdminViews {
    pub fn new(
        store: Arc<MemoryStore>,
        config: Arc<TemporalConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, config, clock }
    }

    /// Count a tenant's items, optionally restricted to one kind
    pub fn count_items(&self, tenant: &TenantScope, kind: Option<MemoryKind>) -> Result<i64> {
        self.store.count_items(tenant, kind)
    }

    /// Count items currently satisfying the deletion predicate
    pub fn forgettable_count(
        &self,
        tenant: &TenantScope,
        kind: Option<MemoryKind>,
    ) -> Result<i64> {
        let now = self.clock.now();
        let kinds: Vec<MemoryKind> = match kind {
            Some(k) => vec![k],
            None => MemoryKind::ALL.to_vec(),
        };

        let mut count = 0i64;
        for kind in kinds {
            let mut offset = 0usize;
            loop {
                let page = self
                    .store
                    .attribute_page(tenant, kind, SCAN_PAGE_SIZE, offset)?;
                if page.is_empty() {
                    break;
                }
                count += page
                    .iter()
                    .filter(|row| scoring::should_delete(*row, now, &self.config).is_some())
                    .count() as i64;
                offset += page.len();
                if page.len() < SCAN_PAGE_SIZE {
                    break;
                }
            }
        }
        Ok(count)
    }

    /// Bucketed distribution of one field over a tenant's items of a kind
    pub fn distribution(
        &self,
        tenant: &TenantScope,
        kind: MemoryKind,
        field: DistributionField,
    ) -> Result<Histogram> {
        let now = self.clock.now();
        let labels = bucket_labels(field);
        let mut counts = vec![0u64; labels.len()];
        let mut total = 0u64;

        let mut offset = 0usize;
        loop {
            let page = self
                .store
                .attribute_page(tenant, kind, SCAN_PAGE_SIZE, offset)?;
            if page.is_empty() {
                break;
            }
            for row in &page {
                let value = match field {
                    DistributionField::ImportanceScore => row.importance_score,
                    DistributionField::AccessCount => row.access_count as f64,
                    DistributionField::AgeDays => scoring::age_days(row.created_at, now),
                };
                counts[bucket_index(field, value)] += 1;
                total += 1;
            }
            offset += page.len();
            if page.len() < SCAN_PAGE_SIZE {
                break;
            }
        }

        Ok(Histogram {
            kind,
            field,
            buckets: labels
                .iter()
                .zip(counts)
                .map(|(label, count)| HistogramBucket { label: label.to_string(), count })
                .collect(),
            total,
        })
    }
}

// ============================================================================
// BUCKETING
// ============================================================================

fn bucket_labels(field: DistributionField) -> &'static [&'static str] {
    match field {
        DistributionField::ImportanceScore => &[
            "0.0-0.1", "0.1-0.2", "0.2-0.3", "0.3-0.4", "0.4-0.5", "0.5-0.6", "0.6-0.7",
            "0.7-0.8", "0.8-0.9", "0.9-1.0",
        ],
        DistributionField::AccessCount => &["0", "1-3", "4-15", "16-63", "64-255", "256+"],
        DistributionField::AgeDays => &["0-1", "1-7", "7-30", "30-90", "90-365", "365+"],
    }
}

fn bucket_index(field: DistributionField, value: f64) -> usize {
    match field {
        DistributionField::ImportanceScore => {
            ((value.clamp(0.0, 1.0) * 10.0).floor() as usize).min(9)
        }
        DistributionField::AccessCount => match value as i64 {
            i64::MIN..=0 => 0,
            1..=3 => 1,
            4..=15 => 2,
            16..=63 => 3,
            64..=255 => 4,
            _ => 5,
        },
        DistributionField::AgeDays => {
            if value < 1.0 {
                0
            } else if value < 7.0 {
                1
            } else if value < 30.0 {
                2
            } else if value < 90.0 {
                3
            } else if value < 365.0 {
                4
            } else {
                5
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
