//! Retrieval pipeline
//!
//! Turns a [`Query`] into a ranked result list: gathers lexical and vector
//! candidates per kind, merges them by id, scores each candidate with the
//! temporal engine, sorts under the deterministic tie-break rule, and applies
//! access tracking plus rehearsal to the returned items in one transaction.
//!
//! Candidates that were scanned but not returned are never touched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::config::TemporalConfig;
use crate::embeddings::Embedder;
use crate::error::{MemoryError, Result};
use crate::memory::{MemoryItem, MemoryKind, Query, RetrievalResult, RetrievedItem};
use crate::scoring;
use crate::storage::{AccessUpdate, MemoryStore};

/// Hard cap on candidates fetched from any single source query
const SOURCE_CANDIDATE_CAP: usize = 256;

/// Per-source candidate budget: `min(cap, max(limit * 5, 50))`
fn source_candidate_limit(limit: usize) -> usize {
    SOURCE_CANDIDATE_CAP.min((limit * 5).max(50))
}

/// Relevance signals collected for one candidate before scoring
#[derive(Debug, Clone, Copy, Default)]
struct CandidateSignals {
    raw_bm25: Option<f64>,
    cosine: Option<f64>,
}

// ============================================================================
// RETRIEVER
// ============================================================================

/// The retrieval pipeline over a shared store
pub struct Retriever {
    store: Arc<MemoryStore>,
    config: Arc<TemporalConfig>,
    clock: Arc<dyn Clock>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Retriever {
    /// Build a pipeline; `embedder` enables embedding query text when the
    /// caller supplies no vector
    pub fn new(
        store: Arc<MemoryStore>,
        config: Arc<TemporalConfig>,
        clock: Arc<dyn Clock>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self { store, config, clock, embedder }
    }

    /// Retrieve the top `limit` items for the query
    pub fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        self.retrieve_with_cancel(query, &CancelToken::new())
    }

    /// Retrieve with a cooperative cancellation token
    ///
    /// Cancellation observed before the side-effect transaction returns
    /// [`MemoryError::Cancelled`] and moves no counters.
    pub fn retrieve_with_cancel(
        &self,
        query: &Query,
        cancel: &CancelToken,
    ) -> Result<RetrievalResult> {
        let started = Instant::now();
        let (w_rel, w_tmp) = self.validate(query)?;

        let tenant = query.tenant();
        let now = self.clock.now();
        let kinds = query.effective_kinds();
        let per_source = source_candidate_limit(query.limit);
        let text = query
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let mut vector_unavailable = false;
        let mut scanned_candidates = 0usize;
        let mut candidates: Vec<(MemoryItem, CandidateSignals)> = Vec::new();

        for kind in kinds {
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }

            let mut signals: HashMap<String, CandidateSignals> = HashMap::new();

            if let Some(text) = text {
                for (id, raw) in
                    self.store.lexical_candidates(&tenant, kind, text, per_source)?
                {
                    signals.entry(id).or_default().raw_bm25 = Some(raw);
                }
            }

            if let Some(vector) = self.query_vector(query, text, kind, &mut vector_unavailable) {
                for (id, cosine) in
                    self.store.vector_candidates(&tenant, kind, &vector, per_source)?
                {
                    signals.entry(id).or_default().cosine = Some(cosine);
                }
            }

            if text.is_none() && query.vector.is_none() {
                for id in self.store.recent_candidates(&tenant, kind, per_source)? {
                    signals.entry(id).or_default();
                }
            }

            let ids: Vec<String> = signals.keys().cloned().collect();
            for item in self.store.fetch_by_ids(&tenant, kind, &ids)? {
                let signal = signals.get(&item.id).copied().unwrap_or_default();
                candidates.push((item, signal));
            }
            scanned_candidates += ids.len();
        }

        // Score and rank under the full tie-break rule
        let mut scored: Vec<(MemoryItem, f64, f64, f64, f64)> = candidates
            .into_iter()
            .map(|(item, signal)| {
                let lexical = signal.raw_bm25.map(|s| scoring::normalize_lexical(s, &self.config));
                let vector = signal.cosine.map(scoring::normalize_vector);
                let relevance = scoring::combine_relevance(lexical, vector);
                let temporal = scoring::temporal_score(&item, now, &self.config);
                let combined = scoring::combined_score(relevance, temporal, w_rel, w_tmp);
                let age = scoring::age_days(item.created_at, now);
                (item, relevance, temporal, combined, age)
            })
            .collect();

        scored.sort_by(|a, b| {
            scoring::rank_ordering(
                &scoring::RankKey {
                    combined: a.3,
                    relevance: a.1,
                    created_at: a.0.created_at,
                    id: &a.0.id,
                },
                &scoring::RankKey {
                    combined: b.3,
                    relevance: b.1,
                    created_at: b.0.created_at,
                    id: &b.0.id,
                },
            )
        });
        scored.truncate(query.limit);

        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }

        // Side effects for returned items only: access bump, and rehearsal
        // where relevance clears the threshold
        let updates: Vec<AccessUpdate> = scored
            .iter()
            .map(|(item, relevance, _, _, _)| AccessUpdate {
                kind: item.kind(),
                id: item.id.clone(),
                observed_access_count: item.access_count,
                rehearse: scoring::should_rehearse(*relevance, &self.config),
            })
            .collect();
        self.store.record_access(&updates, now)?;

        let items = scored
            .into_iter()
            .zip(updates)
            .map(|((mut item, relevance, temporal, combined, age_days), update)| {
                item.access_count += 1;
                item.last_accessed_at = Some(now);
                if update.rehearse {
                    item.importance_score =
                        scoring::rehearsed_importance(item.importance_score, &self.config);
                    item.rehearsal_count += 1;
                    item.last_modified = crate::memory::LastModified {
                        timestamp: now,
                        operation: crate::memory::MutationOp::Rehearsed,
                    };
                } else {
                    item.last_modified = crate::memory::LastModified {
                        timestamp: now,
                        operation: crate::memory::MutationOp::Accessed,
                    };
                }
                RetrievedItem {
                    item,
                    relevance,
                    temporal,
                    combined,
                    age_days,
                    was_rehearsed: update.rehearse,
                }
            })
            .collect();

        Ok(RetrievalResult {
            items,
            scanned_candidates,
            elapsed_ms: started.elapsed().as_millis() as i64,
            vector_unavailable,
        })
    }

    /// Resolve the vector for one kind: the caller's vector wins; otherwise
    /// embed the query text if a provider is configured. A failed provider
    /// degrades the query to lexical-only and flags the result envelope.
    fn query_vector(
        &self,
        query: &Query,
        text: Option<&str>,
        kind: MemoryKind,
        vector_unavailable: &mut bool,
    ) -> Option<Vec<f32>> {
        if let Some(vector) = &query.vector {
            return Some(vector.clone());
        }
        if *vector_unavailable {
            return None;
        }
        let (embedder, text) = (self.embedder.as_ref()?, text?);
        match embedder.embed(text, kind) {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!("Embedding provider unavailable, degrading to lexical: {}", e);
                *vector_unavailable = true;
                None
            }
        }
    }

    /// Validate the query and resolve the combined-score weights
    fn validate(&self, query: &Query) -> Result<(f64, f64)> {
        if query.organization_id.trim().is_empty() {
            return Err(MemoryError::InvalidQuery(
                "organization_id must not be empty".to_string(),
            ));
        }
        if query.limit < 1 {
            return Err(MemoryError::InvalidQuery(format!(
                "limit must be at least 1, got {}",
                query.limit
            )));
        }
        if let Some(vector) = &query.vector {
            if vector.is_empty() {
                return Err(MemoryError::InvalidQuery(
                    "query vector must not be empty".to_string(),
                ));
            }
        }

        let overrides = query.weight_overrides.unwrap_or_default();
        let w_rel = overrides.w_rel.unwrap_or(self.config.retrieval_weight_relevance);
        let w_tmp = overrides.w_tmp.unwrap_or(self.config.retrieval_weight_temporal);
        for (name, value) in [("w_rel", w_rel), ("w_tmp", w_tmp)] {
            if !value.is_finite() || value < 0.0 {
                return Err(MemoryError::InvalidQuery(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok((w_rel, w_tmp))
    }
}

// ============================================================================
// TESTS
// ============================================================================
