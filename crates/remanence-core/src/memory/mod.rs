//! Memory module - core types and data structures
//!
//! The data model of the store:
//! - Six memory item kinds sharing one temporal envelope
//! - Tenant scoping on every record
//! - Retrieval query and result envelopes

mod item;

pub use item::{
    ChatRole, CreateInput, ItemContent, LastModified, MemoryItem, MemoryKind, MutationOp,
    UpdatePatch,
};

use serde::{Deserialize, Serialize};

// ============================================================================
// TENANT SCOPE
// ============================================================================

/// The visibility scope every record carries
///
/// `organization_id` is mandatory; `user_id`, when present, narrows reads and
/// deletes to that user's items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TenantScope {
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl TenantScope {
    /// Organization-wide scope
    pub fn org(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: None,
        }
    }

    /// Scope narrowed to a single user
    pub fn user(organization_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: Some(user_id.into()),
        }
    }
}

// ============================================================================
// QUERY
// ============================================================================

/// Optional per-query override of the combined-score weights
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WeightOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w_rel: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w_tmp: Option<f64>,
}

/// A retrieval request
///
/// Uses `deny_unknown_fields` to prevent field injection attacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Query {
    /// Mandatory tenant organization
    pub organization_id: String,
    /// Optional narrowing user scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Kinds to search; empty means all kinds
    #[serde(default)]
    pub kinds: Vec<MemoryKind>,
    /// Lexical query text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Pre-computed query vector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Maximum results; must be at least 1
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Optional combined-score weight overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_overrides: Option<WeightOverrides>,
}

fn default_limit() -> usize {
    10
}

impl Query {
    /// Recent-items query for a tenant (no text, no vector)
    pub fn recent(tenant: &TenantScope) -> Self {
        Self {
            organization_id: tenant.organization_id.clone(),
            user_id: tenant.user_id.clone(),
            kinds: Vec::new(),
            text: None,
            vector: None,
            limit: default_limit(),
            weight_overrides: None,
        }
    }

    /// Text query for a tenant
    pub fn text(tenant: &TenantScope, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::recent(tenant)
        }
    }

    /// The tenant scope of this query
    pub fn tenant(&self) -> TenantScope {
        TenantScope {
            organization_id: self.organization_id.clone(),
            user_id: self.user_id.clone(),
        }
    }

    /// Kinds to search, defaulting to all
    pub fn effective_kinds(&self) -> Vec<MemoryKind> {
        if self.kinds.is_empty() {
            MemoryKind::ALL.to_vec()
        } else {
            let mut kinds: Vec<MemoryKind> = Vec::with_capacity(self.kinds.len());
            for kind in &self.kinds {
                if !kinds.contains(kind) {
                    kinds.push(*kind);
                }
            }
            kinds
        }
    }
}

// ============================================================================
// RETRIEVAL RESULTS
// ============================================================================

/// One ranked retrieval hit with its score breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedItem {
    /// The item, reflecting counters as committed by this retrieval
    pub item: MemoryItem,
    /// Normalized relevance in [0, 1]
    pub relevance: f64,
    /// Temporal score in [0, 1]
    pub temporal: f64,
    /// Combined ranking score in [0, 1]
    pub combined: f64,
    /// Age at retrieval time, in days
    pub age_days: f64,
    /// Whether this retrieval rehearsed the item
    pub was_rehearsed: bool,
}

/// Result envelope of one retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    /// Ranked hits, best first
    pub items: Vec<RetrievedItem>,
    /// Distinct candidates scanned before truncation
    pub scanned_candidates: usize,
    /// Wall time spent in the pipeline
    pub elapsed_ms: i64,
    /// True when vector search was requested but the embedding provider was
    /// unavailable and the pipeline degraded to lexical-only
    pub vector_unavailable: bool,
}

// ============================================================================
// TESTS
// ============================================================================
