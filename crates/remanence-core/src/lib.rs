//! # Remanence Core
//!
//! Temporal memory store for AI agents. Persists heterogeneous memory items,
//! scores them continuously by semantic relevance and time-aware utility,
//! strengthens what gets retrieved, and evicts what has faded:
//!
//! - **Hybrid decay**: exponential forgetting blended with a power-law tail,
//!   weighted by each item's own importance
//! - **Rehearsal**: items retrieved with high relevance get stronger, applied
//!   atomically with access tracking
//! - **Hybrid retrieval**: BM25 (SQLite FTS5) and cosine vector relevance
//!   combined with the temporal score under configurable weights
//! - **Decay maintenance**: batched, dry-runnable eviction of items past
//!   their age limit or below the score threshold
//! - **Multi-tenant**: every record and every read is scoped by
//!   `(organization_id, user_id?)`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use remanence_core::{CreateInput, ItemContent, Query, TemporalMemory, TenantScope};
//!
//! // Open the store (uses default platform-specific location)
//! let memory = TemporalMemory::open(None)?;
//!
//! // Remember something
//! let tenant = TenantScope::org("acme");
//! let item = memory.create(CreateInput::new(
//!     tenant.clone(),
//!     ItemContent::VaultItem {
//!         title: "deploy runbook".into(),
//!         content: "canary bakes for one hour before full rollout".into(),
//!         vault_type: "note".into(),
//!     },
//! ))?;
//!
//! // Retrieve, rehearsing whatever comes back highly relevant
//! let result = memory.retrieve(&Query::text(&tenant, "canary rollout"))?;
//!
//! // Evict what has decayed
//! let report = memory.run_decay_cycle(&remanence_core::DecayOptions::for_org("acme"))?;
//! ```
//!
//! ## Configuration
//!
//! All scoring parameters come from [`TemporalConfig`], overridable through
//! `REMANENCE_*` environment variables read once at startup. See the
//! [`config`] module.

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod admin;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod decay;
pub mod embeddings;
pub mod error;
pub mod memory;
pub mod retrieval;
pub mod scoring;
pub mod storage;

mod service;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Memory types
pub use memory::{
    ChatRole, CreateInput, ItemContent, LastModified, MemoryItem, MemoryKind, MutationOp,
    Query, RetrievalResult, RetrievedItem, TenantScope, UpdatePatch, WeightOverrides,
};

// Scoring engine
pub use scoring::{
    age_days, combine_relevance, combined_score, decay_factor, frequency_score,
    normalize_lexical, normalize_vector, recency_bonus, rehearsed_importance, should_delete,
    should_rehearse, temporal_score, DeletionReason, TemporalAttributes,
};

// Storage layer
pub use storage::{AccessUpdate, AttributeRow, MemoryStore};

// Retrieval pipeline
pub use retrieval::Retriever;

// Decay task
pub use decay::{
    DecayOptions, DecayReport, DecayScheduler, DecaySchedulerConfig, DecaySchedulerHandle,
    DecayTask, DeletionSample, KindDecayStats,
};

// Admin views
pub use admin::{AdminViews, DistributionField, Histogram, HistogramBucket};

// Infrastructure
pub use cancel::CancelToken;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::TemporalConfig;
pub use embeddings::{
    conform_dimensions, cosine_similarity, Embedder, Embedding, EmbeddingError,
    MAX_EMBEDDING_DIMENSIONS,
};
pub use error::{MemoryError, Result};

// Service facade
pub use service::TemporalMemory;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CreateInput, DecayOptions, DecayReport, ItemContent, MemoryError, MemoryItem,
        MemoryKind, MemoryStore, Query, Result, RetrievalResult, TemporalConfig, TemporalMemory,
        TenantScope, UpdatePatch,
    };

    pub use crate::{Clock, FixedClock, SystemClock};

    pub use crate::{AdminViews, DistributionField, Histogram};

    pub use crate::{Embedder, Embedding};
}
