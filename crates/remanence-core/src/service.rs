//! Service facade
//!
//! [`TemporalMemory`] wires the store, config, clock, and optional embedding
//! provider into the in-process API: retrieval, writes, the decay cycle, and
//! admin views. Components share the same `Arc`s, so a facade is cheap to
//! build around an existing store.

use std::path::PathBuf;
use std::sync::Arc;

use crate::admin::AdminViews;
use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::config::TemporalConfig;
use crate::decay::{DecayOptions, DecayReport, DecayTask};
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::memory::{
    CreateInput, MemoryItem, Query, RetrievalResult, TenantScope, UpdatePatch,
};
use crate::retrieval::Retriever;
use crate::storage::MemoryStore;

/// The assembled temporal memory service
pub struct TemporalMemory {
    store: Arc<MemoryStore>,
    config: Arc<TemporalConfig>,
    clock: Arc<dyn Clock>,
    embedder: Option<Arc<dyn Embedder>>,
    retriever: Retriever,
    decay: DecayTask,
    admin: AdminViews,
}

impl TemporalMemory {
    /// Open with config from the environment, the system clock, and no
    /// embedding provider
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let config = Arc::new(TemporalConfig::from_env()?);
        Self::with_parts(db_path, config, Arc::new(SystemClock), None)
    }

    /// Open with explicit components
    pub fn with_parts(
        db_path: Option<PathBuf>,
        config: Arc<TemporalConfig>,
        clock: Arc<dyn Clock>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(MemoryStore::new(db_path, config.clone(), clock.clone())?);
        Ok(Self::from_store(store, embedder))
    }

    /// Assemble the facade around an already-open store
    pub fn from_store(store: Arc<MemoryStore>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        let config = store.config().clone();
        let clock = store.clock().clone();
        let retriever = Retriever::new(
            store.clone(),
            config.clone(),
            clock.clone(),
            embedder.clone(),
        );
        let decay = DecayTask::new(store.clone(), config.clone(), clock.clone());
        let admin = AdminViews::new(store.clone(), config.clone(), clock.clone());
        Self { store, config, clock, embedder, retriever, decay, admin }
    }

    // ========================================================================
    // RETRIEVAL SURFACE
    // ========================================================================

    /// Retrieve the top `limit` items for a query
    pub fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        self.retriever.retrieve(query)
    }

    /// Retrieve with cooperative cancellation
    pub fn retrieve_with_cancel(
        &self,
        query: &Query,
        cancel: &CancelToken,
    ) -> Result<RetrievalResult> {
        self.retriever.retrieve_with_cancel(query, cancel)
    }

    // ========================================================================
    // WRITE SURFACE
    // ========================================================================

    /// Create a memory item; when an embedding provider is configured, each
    /// lexical field is embedded and attached best-effort
    pub fn create(&self, input: CreateInput) -> Result<MemoryItem> {
        let tenant = input.tenant.clone();
        let sources: Vec<(&'static str, String)> = input
            .content
            .embedding_sources()
            .into_iter()
            .map(|(column, text)| (column, text.to_string()))
            .collect();
        let kind = input.content.kind();

        let mut item = self.store.create(input)?;

        if let Some(embedder) = &self.embedder {
            for (column, text) in sources {
                match embedder.embed(&text, kind) {
                    Ok(vector) => {
                        self.store.put_embedding(&tenant, &item.id, column, vector)?;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Embedding {} for new item {} failed: {}; item stored without it",
                            column,
                            item.id,
                            e
                        );
                    }
                }
            }
            if let Some(refreshed) = self.store.get(&tenant, &item.id)? {
                item = refreshed;
            }
        }

        Ok(item)
    }

    /// Update content, importance, and/or metadata of an item
    pub fn update(&self, tenant: &TenantScope, id: &str, patch: UpdatePatch) -> Result<MemoryItem> {
        self.store.update(tenant, id, patch)
    }

    /// Hard-delete an item; idempotent
    pub fn delete(&self, tenant: &TenantScope, id: &str) -> Result<bool> {
        self.store.delete(tenant, id)
    }

    /// Fetch a single item by id
    pub fn get(&self, tenant: &TenantScope, id: &str) -> Result<Option<MemoryItem>> {
        self.store.get(tenant, id)
    }

    // ========================================================================
    // MAINTENANCE AND ADMIN
    // ========================================================================

    /// Run one decay cycle for a tenant
    pub fn run_decay_cycle(&self, options: &DecayOptions) -> Result<DecayReport> {
        self.decay.run_cycle(options)
    }

    /// Read-only aggregate views
    pub fn admin(&self) -> &AdminViews {
        &self.admin
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// The active configuration
    pub fn config(&self) -> &Arc<TemporalConfig> {
        &self.config
    }

    /// The shared clock
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

// ============================================================================
// TESTS
// ============================================================================
