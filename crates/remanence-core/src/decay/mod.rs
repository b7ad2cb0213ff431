//! Decay maintenance task
//!
//! Walks one tenant's items oldest-first, evaluates the deletion predicate
//! against a single `now` captured at cycle start, and deletes forgettable
//! items in per-batch transactions. A dry run returns the deletion plan
//! without writing. Batch failures are recorded in the report; earlier
//! batches stay committed.

mod scheduler;

pub use scheduler::{DecayScheduler, DecaySchedulerConfig, DecaySchedulerHandle};

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::config::TemporalConfig;
use crate::error::{MemoryError, Result};
use crate::memory::{MemoryKind, TenantScope};
use crate::scoring::{self, DeletionReason};
use crate::storage::MemoryStore;

/// Samples reported per kind
const SAMPLES_PER_KIND: usize = 20;

// ============================================================================
// OPTIONS AND REPORT
// ============================================================================

/// Inputs of one decay cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DecayOptions {
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Report the plan without deleting
    #[serde(default)]
    pub dry_run: bool,
    /// Rows per scan page and per delete transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    500
}

impl DecayOptions {
    /// Cycle over an organization with default batching
    pub fn for_org(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: None,
            dry_run: false,
            batch_size: default_batch_size(),
        }
    }

    /// Same, but planning only
    pub fn dry_run(organization_id: impl Into<String>) -> Self {
        Self {
            dry_run: true,
            ..Self::for_org(organization_id)
        }
    }

    fn tenant(&self) -> TenantScope {
        TenantScope {
            organization_id: self.organization_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// One forgettable item and why
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionSample {
    pub id: String,
    pub reason: DeletionReason,
}

/// Per-kind outcome of a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindDecayStats {
    pub kind: MemoryKind,
    /// Rows evaluated
    pub scanned: u64,
    /// Rows matching the deletion predicate
    pub to_delete: u64,
    /// Rows actually removed (0 on dry run)
    pub deleted: u64,
    /// Rows in failed delete batches
    pub errors: u64,
    /// Up to 20 `{id, reason}` pairs
    pub samples: Vec<DeletionSample>,
}

impl KindDecayStats {
    fn new(kind: MemoryKind) -> Self {
        Self {
            kind,
            scanned: 0,
            to_delete: 0,
            deleted: 0,
            errors: 0,
            samples: Vec::new(),
        }
    }
}

/// Result of one decay cycle over one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayReport {
    pub kinds: Vec<KindDecayStats>,
    pub dry_run: bool,
    /// True when a batch failed or the cycle was cancelled mid-way; earlier
    /// batches remain committed
    pub partial: bool,
    pub duration_ms: i64,
}

impl DecayReport {
    /// Total rows scanned across kinds
    pub fn total_scanned(&self) -> u64 {
        self.kinds.iter().map(|k| k.scanned).sum()
    }

    /// Total rows matching the predicate across kinds
    pub fn total_to_delete(&self) -> u64 {
        self.kinds.iter().map(|k| k.to_delete).sum()
    }

    /// Total rows removed across kinds
    pub fn total_deleted(&self) -> u64 {
        self.kinds.iter().map(|k| k.deleted).sum()
    }
}

// ============================================================================
// DECAY TASK
// ============================================================================

/// The eviction worker; safe to run while retrieval is live
pub struct DecayTask {
    store: Arc<MemoryStore>,
    config: Arc<TemporalConfig>,
    clock: Arc<dyn Clock>,
}

impl DecayTask {
    pub fn new(
        store: Arc<MemoryStore>,
        config: Arc<TemporalConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, config, clock }
    }

    /// Run one cycle for a tenant
    pub fn run_cycle(&self, options: &DecayOptions) -> Result<DecayReport> {
        self.run_cycle_with_cancel(options, &CancelToken::new())
    }

    /// Run one cycle, stopping at the next batch boundary if cancelled
    ///
    /// On cancellation the report is returned with `partial = true`; batches
    /// already committed stay committed.
    pub fn run_cycle_with_cancel(
        &self,
        options: &DecayOptions,
        cancel: &CancelToken,
    ) -> Result<DecayReport> {
        if options.organization_id.trim().is_empty() {
            return Err(MemoryError::InvalidQuery(
                "organization_id must not be empty".to_string(),
            ));
        }
        if options.batch_size == 0 {
            return Err(MemoryError::InvalidQuery(
                "batch_size must be at least 1".to_string(),
            ));
        }

        let started = Instant::now();
        // One `now` for the whole cycle so a long-running scan cannot race
        // ahead of its own decisions
        let now = self.clock.now();
        let tenant = options.tenant();

        let mut kinds = Vec::with_capacity(MemoryKind::ALL.len());
        let mut partial = false;

        if !self.config.enabled {
            tracing::info!(
                "Decay disabled by config; skipping cycle for {}",
                options.organization_id
            );
            return Ok(DecayReport {
                kinds: MemoryKind::ALL.iter().map(|k| KindDecayStats::new(*k)).collect(),
                dry_run: options.dry_run,
                partial: false,
                duration_ms: started.elapsed().as_millis() as i64,
            });
        }

        'kinds: for kind in MemoryKind::ALL {
            let mut stats = KindDecayStats::new(kind);
            let mut forgettable: Vec<(String, DeletionReason)> = Vec::new();

            // SCANNING: page oldest-first and collect the plan
            let mut offset = 0usize;
            loop {
                if cancel.is_cancelled() {
                    partial = true;
                    kinds.push(stats);
                    break 'kinds;
                }

                let page =
                    self.store
                        .attribute_page(&tenant, kind, options.batch_size, offset)?;
                if page.is_empty() {
                    break;
                }

                for row in &page {
                    if let Some(reason) = scoring::should_delete(row, now, &self.config) {
                        forgettable.push((row.id.clone(), reason));
                    }
                }

                stats.scanned += page.len() as u64;
                offset += page.len();
                if page.len() < options.batch_size {
                    break;
                }
            }

            stats.to_delete = forgettable.len() as u64;
            stats.samples = forgettable
                .iter()
                .take(SAMPLES_PER_KIND)
                .map(|(id, reason)| DeletionSample { id: id.clone(), reason: *reason })
                .collect();

            // DELETING: per-batch transactions; a failed batch is recorded
            // and the cycle moves on
            if !options.dry_run {
                for chunk in forgettable.chunks(options.batch_size) {
                    if cancel.is_cancelled() {
                        partial = true;
                        break;
                    }
                    let ids: Vec<String> = chunk.iter().map(|(id, _)| id.clone()).collect();
                    match self.store.delete_batch(kind, &ids) {
                        Ok(removed) => stats.deleted += removed as u64,
                        Err(e) => {
                            stats.errors += chunk.len() as u64;
                            partial = true;
                            tracing::warn!(
                                "Decay batch failed for kind {}: {}; continuing",
                                kind,
                                e
                            );
                        }
                    }
                }
            }

            kinds.push(stats);
        }

        let report = DecayReport {
            kinds,
            dry_run: options.dry_run,
            partial,
            duration_ms: started.elapsed().as_millis() as i64,
        };
        tracing::info!(
            "Decay cycle for {}: scanned {}, planned {}, deleted {}{}",
            options.organization_id,
            report.total_scanned(),
            report.total_to_delete(),
            report.total_deleted(),
            if report.dry_run { " (dry run)" } else { "" },
        );
        Ok(report)
    }

    /// Run a cycle for every organization in the store, one at a time
    pub fn run_all_organizations(
        &self,
        batch_size: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<(String, DecayReport)>> {
        let mut reports = Vec::new();
        for organization_id in self.store.list_organizations()? {
            if cancel.is_cancelled() {
                break;
            }
            let options = DecayOptions {
                batch_size,
                ..DecayOptions::for_org(organization_id.clone())
            };
            let report = self.run_cycle_with_cancel(&options, cancel)?;
            reports.push((organization_id, report));
        }
        Ok(reports)
    }
}

// ============================================================================
// TESTS
// ============================================================================
