//! Test Database Manager
//!
//! Provides isolated service instances for testing:
//! - Temporary databases that are automatically cleaned up
//! - A pinned, advanceable clock shared with the service
//! - Seeding helpers for aged items across kinds

use std::sync::Arc;

use chrono::{Duration, Utc};
use remanence_core::{
    ChatRole, Clock, CreateInput, FixedClock, ItemContent, MemoryItem, TemporalConfig,
    TemporalMemory, TenantScope,
};
use tempfile::TempDir;

/// An isolated temporal memory service backed by a temporary database
///
/// The database is deleted when the harness is dropped. The clock starts at
/// `Utc::now()` and only moves when a test advances it, so scoring arithmetic
/// is exact.
pub struct TestDb {
    /// The assembled service under test
    pub service: TemporalMemory,
    /// The pinned clock shared with the service
    pub clock: Arc<FixedClock>,
    /// Temporary directory (kept alive to prevent premature deletion)
    _temp_dir: TempDir,
}

impl TestDb {
    /// Create a fresh service with default config
    pub fn new() -> Self {
        Self::with_config(TemporalConfig::default())
    }

    /// Create a fresh service with explicit config
    pub fn with_config(config: TemporalConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let service = TemporalMemory::with_parts(
            Some(temp_dir.path().join("test_remanence.db")),
            Arc::new(config),
            clock.clone(),
            None,
        )
        .expect("Failed to create test service");

        Self { service, clock, _temp_dir: temp_dir }
    }

    /// Move the clock forward
    pub fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }

    // ========================================================================
    // SEEDING METHODS
    // ========================================================================

    /// Seed a chat message born `age_days` ago
    pub fn seed_message(
        &self,
        tenant: &TenantScope,
        age_days: i64,
        importance: f64,
        content: &str,
    ) -> MemoryItem {
        let mut input = CreateInput::new(
            tenant.clone(),
            ItemContent::ChatMessage {
                session_id: "session-1".to_string(),
                role: ChatRole::User,
                content: content.to_string(),
            },
        );
        input.occurred_at = Some(self.clock.now() - Duration::days(age_days));
        input.importance_score = Some(importance);
        self.service.create(input).expect("seed message")
    }

    /// Seed an episodic event that occurred `age_days` ago
    pub fn seed_event(
        &self,
        tenant: &TenantScope,
        age_days: i64,
        importance: f64,
        summary: &str,
    ) -> MemoryItem {
        let mut input = CreateInput::new(
            tenant.clone(),
            ItemContent::EpisodicEvent {
                actor: "agent".to_string(),
                event_type: "observation".to_string(),
                summary: summary.to_string(),
                details: format!("{} (details)", summary),
                tree_path: None,
            },
        );
        input.occurred_at = Some(self.clock.now() - Duration::days(age_days));
        input.importance_score = Some(importance);
        self.service.create(input).expect("seed event")
    }

    /// Seed a vault note born now
    pub fn seed_note(&self, tenant: &TenantScope, title: &str, content: &str) -> MemoryItem {
        self.service
            .create(CreateInput::new(
                tenant.clone(),
                ItemContent::VaultItem {
                    title: title.to_string(),
                    content: content.to_string(),
                    vault_type: "note".to_string(),
                },
            ))
            .expect("seed note")
    }

    /// Attach a 2-d unit-ish embedding whose cosine against `[1, 0]` is
    /// exactly `target`
    pub fn embed_at(&self, tenant: &TenantScope, item: &MemoryItem, column: &str, target: f64) {
        let vector = vec![target as f32, ((1.0 - target * target).max(0.0)).sqrt() as f32];
        self.service
            .store()
            .put_embedding(tenant, &item.id, column, vector)
            .expect("attach embedding");
    }
}

impl Default for TestDb {
    fn default() -> Self {
        Self::new()
    }
}
