//! SQLite Storage Implementation
//!
//! One table per memory kind, each carrying the shared temporal envelope.
//! Separate reader/writer connections behind mutexes give interior
//! mutability: all methods take `&self`, so callers share an
//! `Arc<MemoryStore>` across workers.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::TemporalConfig;
use crate::embeddings::{conform_dimensions, cosine_similarity, Embedding};
use crate::error::{MemoryError, Result};
use crate::memory::{
    ChatRole, CreateInput, ItemContent, LastModified, MemoryItem, MemoryKind, MutationOp,
    TenantScope, UpdatePatch,
};
use crate::scoring::TemporalAttributes;

// ============================================================================
// SCHEMA MAPPING
// ============================================================================

/// Content table of a kind
fn table(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::ChatMessage => "chat_messages",
        MemoryKind::EpisodicEvent => "episodic_events",
        MemoryKind::SemanticItem => "semantic_items",
        MemoryKind::ProceduralItem => "procedural_items",
        MemoryKind::ResourceItem => "resource_items",
        MemoryKind::VaultItem => "vault_items",
    }
}

/// FTS5 index table of a kind
fn fts_table(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::ChatMessage => "chat_messages_fts",
        MemoryKind::EpisodicEvent => "episodic_events_fts",
        MemoryKind::SemanticItem => "semantic_items_fts",
        MemoryKind::ProceduralItem => "procedural_items_fts",
        MemoryKind::ResourceItem => "resource_items_fts",
        MemoryKind::VaultItem => "vault_items_fts",
    }
}

/// Embedding columns of a kind
fn embedding_columns(kind: MemoryKind) -> &'static [&'static str] {
    match kind {
        MemoryKind::ChatMessage | MemoryKind::VaultItem => &["content_embedding"],
        MemoryKind::EpisodicEvent | MemoryKind::SemanticItem => {
            &["summary_embedding", "details_embedding"]
        }
        MemoryKind::ProceduralItem | MemoryKind::ResourceItem => &["description_embedding"],
    }
}

/// Escape a user query for FTS5 MATCH: each token becomes a quoted phrase
/// term, stripping FTS operators and punctuation
pub fn sanitize_match_query(query: &str) -> String {
    query
        .split_whitespace()
        .filter_map(|token| {
            let cleaned: String = token
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(format!("\"{}\"", cleaned))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// SCAN ROWS
// ============================================================================

/// Lightweight temporal envelope of one row, for decay and admin scans
#[derive(Debug, Clone)]
pub struct AttributeRow {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub importance_score: f64,
    pub access_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub rehearsal_count: i64,
}

impl TemporalAttributes for AttributeRow {
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

/// One returned item's counter update, applied atomically with retrieval
#[derive(Debug, Clone)]
pub struct AccessUpdate {
    pub kind: MemoryKind,
    pub id: String,
    /// access_count observed when the candidate was read; guards the
    /// conditional write
    pub observed_access_count: i64,
    /// whether the rehearsal effect applies alongside the access bump
    pub rehearse: bool,
}

// ============================================================================
// STORE
// ============================================================================

/// Tenant-scoped persistent store for the six memory kinds
///
/// All methods take `&self`; share via `Arc<MemoryStore>`.
pub struct MemoryStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    config: Arc<TemporalConfig>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `db_path`, or at the platform default
    /// data directory when `None`
    pub fn new(
        db_path: Option<PathBuf>,
        config: Arc<TemporalConfig>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = directories::ProjectDirs::from("com", "remanence", "core")
                    .ok_or_else(|| {
                        MemoryError::Init("Could not determine project directories".to_string())
                    })?;

                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                // Restrict directory permissions to owner-only on Unix
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(data_dir, perms);
                }
                data_dir.join("remanence.db")
            }
        };

        let writer_conn = Connection::open(&path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;

        // Apply migrations on writer only
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            config,
            clock,
        })
    }

    /// The store's config
    pub fn config(&self) -> &Arc<TemporalConfig> {
        &self.config
    }

    /// The store's clock
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| MemoryError::Init("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| MemoryError::Init("Reader lock poisoned".into()))
    }

    // ========================================================================
    // WRITE API
    // ========================================================================

    /// Create a new memory item
    ///
    /// Assigns a fresh id, clamps importance into the configured range, zeroes
    /// the counters, and stamps the audit column. `occurred_at` is honored for
    /// the chat and episodic kinds only.
    pub fn create(&self, input: CreateInput) -> Result<MemoryItem> {
        let tenant = &input.tenant;
        if tenant.organization_id.trim().is_empty() {
            return Err(MemoryError::InvariantViolation(
                "organization_id must not be empty".to_string(),
            ));
        }

        let kind = input.content.kind();
        if input.occurred_at.is_some()
            && !matches!(kind, MemoryKind::ChatMessage | MemoryKind::EpisodicEvent)
        {
            return Err(MemoryError::InvariantViolation(format!(
                "occurred_at is only valid for chat and episodic kinds, not {}",
                kind
            )));
        }

        let raw_importance = input.importance_score.unwrap_or(0.5);
        if !raw_importance.is_finite() {
            return Err(MemoryError::InvariantViolation(format!(
                "importance_score must be finite, got {}",
                raw_importance
            )));
        }
        let importance = self.config.clamp_importance(raw_importance);

        let now = self.clock.now();
        let created_at = input.occurred_at.unwrap_or(now);
        let id = Uuid::new_v4().to_string();
        let metadata = input.metadata.unwrap_or_else(|| serde_json::json!({}));
        let metadata_json =
            serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".to_string());

        {
            let writer = self.writer()?;
            match &input.content {
                ItemContent::ChatMessage { session_id, role, content } => {
                    writer.execute(
                        "INSERT INTO chat_messages (
                            id, organization_id, user_id, created_at, importance_score,
                            access_count, last_accessed_at, rehearsal_count, metadata,
                            last_modified_at, last_modified_op,
                            session_id, role, content
                        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, 0, ?6, ?7, 'created', ?8, ?9, ?10)",
                        params![
                            id,
                            tenant.organization_id,
                            tenant.user_id,
                            created_at.to_rfc3339(),
                            importance,
                            metadata_json,
                            now.to_rfc3339(),
                            session_id,
                            role.as_str(),
                            content,
                        ],
                    )?;
                }
                ItemContent::EpisodicEvent { actor, event_type, summary, details, tree_path } => {
                    writer.execute(
                        "INSERT INTO episodic_events (
                            id, organization_id, user_id, created_at, importance_score,
                            access_count, last_accessed_at, rehearsal_count, metadata,
                            last_modified_at, last_modified_op,
                            actor, event_type, summary, details, tree_path
                        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, 0, ?6, ?7, 'created', ?8, ?9, ?10, ?11, ?12)",
                        params![
                            id,
                            tenant.organization_id,
                            tenant.user_id,
                            created_at.to_rfc3339(),
                            importance,
                            metadata_json,
                            now.to_rfc3339(),
                            actor,
                            event_type,
                            summary,
                            details,
                            tree_path,
                        ],
                    )?;
                }
                ItemContent::SemanticItem { name, summary, details, source, tree_path } => {
                    writer.execute(
                        "INSERT INTO semantic_items (
                            id, organization_id, user_id, created_at, importance_score,
                            access_count, last_accessed_at, rehearsal_count, metadata,
                            last_modified_at, last_modified_op,
                            name, summary, details, source, tree_path
                        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, 0, ?6, ?7, 'created', ?8, ?9, ?10, ?11, ?12)",
                        params![
                            id,
                            tenant.organization_id,
                            tenant.user_id,
                            created_at.to_rfc3339(),
                            importance,
                            metadata_json,
                            now.to_rfc3339(),
                            name,
                            summary,
                            details,
                            source,
                            tree_path,
                        ],
                    )?;
                }
                ItemContent::ProceduralItem { skill_name, description, steps } => {
                    let steps_json =
                        serde_json::to_string(steps).unwrap_or_else(|_| "[]".to_string());
                    writer.execute(
                        "INSERT INTO procedural_items (
                            id, organization_id, user_id, created_at, importance_score,
                            access_count, last_accessed_at, rehearsal_count, metadata,
                            last_modified_at, last_modified_op,
                            skill_name, description, steps
                        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, 0, ?6, ?7, 'created', ?8, ?9, ?10)",
                        params![
                            id,
                            tenant.organization_id,
                            tenant.user_id,
                            created_at.to_rfc3339(),
                            importance,
                            metadata_json,
                            now.to_rfc3339(),
                            skill_name,
                            description,
                            steps_json,
                        ],
                    )?;
                }
                ItemContent::ResourceItem { resource_name, description, resource_type, location } => {
                    writer.execute(
                        "INSERT INTO resource_items (
                            id, organization_id, user_id, created_at, importance_score,
                            access_count, last_accessed_at, rehearsal_count, metadata,
                            last_modified_at, last_modified_op,
                            resource_name, description, resource_type, location
                        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, 0, ?6, ?7, 'created', ?8, ?9, ?10, ?11)",
                        params![
                            id,
                            tenant.organization_id,
                            tenant.user_id,
                            created_at.to_rfc3339(),
                            importance,
                            metadata_json,
                            now.to_rfc3339(),
                            resource_name,
                            description,
                            resource_type,
                            location,
                        ],
                    )?;
                }
                ItemContent::VaultItem { title, content, vault_type } => {
                    writer.execute(
                        "INSERT INTO vault_items (
                            id, organization_id, user_id, created_at, importance_score,
                            access_count, last_accessed_at, rehearsal_count, metadata,
                            last_modified_at, last_modified_op,
                            title, content, vault_type
                        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, 0, ?6, ?7, 'created', ?8, ?9, ?10)",
                        params![
                            id,
                            tenant.organization_id,
                            tenant.user_id,
                            created_at.to_rfc3339(),
                            importance,
                            metadata_json,
                            now.to_rfc3339(),
                            title,
                            content,
                            vault_type,
                        ],
                    )?;
                }
            }
        }

        self.get_in_kind(tenant, kind, &id)?
            .ok_or(MemoryError::NotFound(id))
    }

    /// Fetch an item by id within the tenant scope, searching all kinds
    pub fn get(&self, tenant: &TenantScope, id: &str) -> Result<Option<MemoryItem>> {
        for kind in MemoryKind::ALL {
            if let Some(item) = self.get_in_kind(tenant, kind, id)? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Fetch an item by id within a single kind's table
    pub fn get_in_kind(
        &self,
        tenant: &TenantScope,
        kind: MemoryKind,
        id: &str,
    ) -> Result<Option<MemoryItem>> {
        let sql = format!(
            "SELECT * FROM {} WHERE id = ?1 AND organization_id = ?2
             AND (?3 IS NULL OR user_id = ?3)",
            table(kind)
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let item = stmt
            .query_row(params![id, tenant.organization_id, tenant.user_id], |row| {
                Self::row_to_item(kind, row)
            })
            .optional()?;
        Ok(item)
    }

    /// Update content, importance, and/or metadata of an item
    ///
    /// The patch cannot reach id, tenant, or counter fields. An all-`None`
    /// patch only refreshes the audit stamp.
    pub fn update(&self, tenant: &TenantScope, id: &str, patch: UpdatePatch) -> Result<MemoryItem> {
        let (kind, current) = self
            .find_with_kind(tenant, id)?
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

        if let Some(content) = &patch.content {
            if content.kind() != kind {
                return Err(MemoryError::InvariantViolation(format!(
                    "cannot change item kind from {} to {}",
                    kind,
                    content.kind()
                )));
            }
        }

        let importance = match patch.importance_score {
            Some(value) => {
                if !value.is_finite() {
                    return Err(MemoryError::InvariantViolation(format!(
                        "importance_score must be finite, got {}",
                        value
                    )));
                }
                self.config.clamp_importance(value)
            }
            None => current.importance_score,
        };

        let content = patch.content.unwrap_or(current.content);
        let metadata = patch.metadata.unwrap_or(current.metadata);
        let metadata_json =
            serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".to_string());
        let now = self.clock.now();

        {
            let writer = self.writer()?;
            match &content {
                ItemContent::ChatMessage { session_id, role, content } => {
                    writer.execute(
                        "UPDATE chat_messages SET
                            importance_score = ?1, metadata = ?2,
                            last_modified_at = ?3, last_modified_op = 'updated',
                            session_id = ?4, role = ?5, content = ?6
                         WHERE id = ?7",
                        params![importance, metadata_json, now.to_rfc3339(),
                                session_id, role.as_str(), content, id],
                    )?;
                }
                ItemContent::EpisodicEvent { actor, event_type, summary, details, tree_path } => {
                    writer.execute(
                        "UPDATE episodic_events SET
                            importance_score = ?1, metadata = ?2,
                            last_modified_at = ?3, last_modified_op = 'updated',
                            actor = ?4, event_type = ?5, summary = ?6, details = ?7, tree_path = ?8
                         WHERE id = ?9",
                        params![importance, metadata_json, now.to_rfc3339(),
                                actor, event_type, summary, details, tree_path, id],
                    )?;
                }
                ItemContent::SemanticItem { name, summary, details, source, tree_path } => {
                    writer.execute(
                        "UPDATE semantic_items SET
                            importance_score = ?1, metadata = ?2,
                            last_modified_at = ?3, last_modified_op = 'updated',
                            name = ?4, summary = ?5, details = ?6, source = ?7, tree_path = ?8
                         WHERE id = ?9",
                        params![importance, metadata_json, now.to_rfc3339(),
                                name, summary, details, source, tree_path, id],
                    )?;
                }
                ItemContent::ProceduralItem { skill_name, description, steps } => {
                    let steps_json =
                        serde_json::to_string(steps).unwrap_or_else(|_| "[]".to_string());
                    writer.execute(
                        "UPDATE procedural_items SET
                            importance_score = ?1, metadata = ?2,
                            last_modified_at = ?3, last_modified_op = 'updated',
                            skill_name = ?4, description = ?5, steps = ?6
                         WHERE id = ?7",
                        params![importance, metadata_json, now.to_rfc3339(),
                                skill_name, description, steps_json, id],
                    )?;
                }
                ItemContent::ResourceItem { resource_name, description, resource_type, location } => {
                    writer.execute(
                        "UPDATE resource_items SET
                            importance_score = ?1, metadata = ?2,
                            last_modified_at = ?3, last_modified_op = 'updated',
                            resource_name = ?4, description = ?5, resource_type = ?6, location = ?7
                         WHERE id = ?8",
                        params![importance, metadata_json, now.to_rfc3339(),
                                resource_name, description, resource_type, location, id],
                    )?;
                }
                ItemContent::VaultItem { title, content, vault_type } => {
                    writer.execute(
                        "UPDATE vault_items SET
                            importance_score = ?1, metadata = ?2,
                            last_modified_at = ?3, last_modified_op = 'updated',
                            title = ?4, content = ?5, vault_type = ?6
                         WHERE id = ?7",
                        params![importance, metadata_json, now.to_rfc3339(),
                                title, content, vault_type, id],
                    )?;
                }
            }
        }

        self.get_in_kind(tenant, kind, id)?
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }

    /// Hard-delete an item; idempotent
    ///
    /// Returns whether a row was actually removed.
    pub fn delete(&self, tenant: &TenantScope, id: &str) -> Result<bool> {
        let writer = self.writer()?;
        let mut removed = 0usize;
        for kind in MemoryKind::ALL {
            let sql = format!(
                "DELETE FROM {} WHERE id = ?1 AND organization_id = ?2
                 AND (?3 IS NULL OR user_id = ?3)",
                table(kind)
            );
            removed += writer.execute(&sql, params![id, tenant.organization_id, tenant.user_id])?;
        }
        Ok(removed > 0)
    }

    /// Attach an embedding vector to one of the item's embedding columns
    ///
    /// The vector is padded or truncated to the storage dimension. Attaching
    /// an embedding makes vector search available for the item; it never
    /// changes scoring.
    pub fn put_embedding(
        &self,
        tenant: &TenantScope,
        id: &str,
        column: &str,
        vector: Vec<f32>,
    ) -> Result<()> {
        let (kind, _) = self
            .find_with_kind(tenant, id)?
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

        if !embedding_columns(kind).contains(&column) {
            return Err(MemoryError::InvariantViolation(format!(
                "{} has no embedding column '{}'",
                kind, column
            )));
        }

        let blob = Embedding::new(vector).to_bytes();
        let sql = format!("UPDATE {} SET {} = ?1 WHERE id = ?2", table(kind), column);
        let writer = self.writer()?;
        writer.execute(&sql, params![blob, id])?;
        Ok(())
    }

    /// Locate an item by id across kinds, returning its kind alongside
    pub fn find_with_kind(
        &self,
        tenant: &TenantScope,
        id: &str,
    ) -> Result<Option<(MemoryKind, MemoryItem)>> {
        for kind in MemoryKind::ALL {
            if let Some(item) = self.get_in_kind(tenant, kind, id)? {
                return Ok(Some((kind, item)));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // CANDIDATE QUERIES
    // ========================================================================

    /// FTS5 lexical candidates: `(id, raw_bm25)` best-first
    pub fn lexical_candidates(
        &self,
        tenant: &TenantScope,
        kind: MemoryKind,
        text: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>> {
        let match_query = sanitize_match_query(text);
        if match_query.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            "SELECT n.id, rank FROM {} n
             JOIN {} fts ON n.id = fts.id
             WHERE {} MATCH ?1
             AND n.organization_id = ?2 AND (?3 IS NULL OR n.user_id = ?3)
             ORDER BY rank
             LIMIT ?4",
            table(kind),
            fts_table(kind),
            fts_table(kind),
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let results = stmt
            .query_map(
                params![match_query, tenant.organization_id, tenant.user_id, limit as i64],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )?
            .filter_map(|r| r.ok())
            // FTS5 rank is the negated BM25 relevance; flip it to a raw score
            .map(|(id, rank)| (id, (-rank).max(0.0)))
            .collect();

        Ok(results)
    }

    /// Vector candidates: `(id, cosine)` best-first, scanning the tenant's
    /// stored embeddings for the kind
    pub fn vector_candidates(
        &self,
        tenant: &TenantScope,
        kind: MemoryKind,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(String, f64)>> {
        let query = conform_dimensions(query_vector.to_vec());
        let columns = embedding_columns(kind);
        let column_list = columns.join(", ");
        let not_null = columns
            .iter()
            .map(|c| format!("{} IS NOT NULL", c))
            .collect::<Vec<_>>()
            .join(" OR ");

        let sql = format!(
            "SELECT id, {} FROM {}
             WHERE organization_id = ?1 AND (?2 IS NULL OR user_id = ?2)
             AND ({})",
            column_list,
            table(kind),
            not_null,
        );

        let mut scored: Vec<(String, f64)> = {
            let reader = self.reader()?;
            let mut stmt = reader.prepare(&sql)?;
            let rows = stmt.query_map(params![tenant.organization_id, tenant.user_id], |row| {
                let id: String = row.get(0)?;
                let mut best: Option<f64> = None;
                for (i, _) in columns.iter().enumerate() {
                    let blob: Option<Vec<u8>> = row.get(i + 1)?;
                    if let Some(embedding) = blob.as_deref().and_then(Embedding::from_bytes) {
                        let similarity = cosine_similarity(&query, &embedding.vector) as f64;
                        best = Some(best.map_or(similarity, |b: f64| b.max(similarity)));
                    }
                }
                Ok((id, best))
            })?;

            rows.filter_map(|r| r.ok())
                .filter_map(|(id, best)| best.map(|s| (id, s)))
                .collect()
        };

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Most recent item ids for a tenant and kind
    pub fn recent_candidates(
        &self,
        tenant: &TenantScope,
        kind: MemoryKind,
        limit: usize,
    ) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT id FROM {}
             WHERE organization_id = ?1 AND (?2 IS NULL OR user_id = ?2)
             ORDER BY created_at DESC, id ASC
             LIMIT ?3",
            table(kind)
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let ids = stmt
            .query_map(
                params![tenant.organization_id, tenant.user_id, limit as i64],
                |row| row.get(0),
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Fetch full items for a candidate id set within one kind
    pub fn fetch_by_ids(
        &self,
        tenant: &TenantScope,
        kind: MemoryKind,
        ids: &[String],
    ) -> Result<Vec<MemoryItem>> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.get_in_kind(tenant, kind, id)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    // ========================================================================
    // ACCESS TRACKING
    // ========================================================================

    /// Apply access bumps (and rehearsal where flagged) for returned items,
    /// in one transaction
    ///
    /// Updates are applied in ascending id order, the crate-wide lock order
    /// for counter updates. Each row uses a conditional write guarded by the
    /// observed access_count, retried once against the current value; a
    /// second miss falls back to an unconditional increment, accepting one
    /// extra access as the worst case.
    pub fn record_access(&self, updates: &[AccessUpdate], now: DateTime<Utc>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut ordered: Vec<&AccessUpdate> = updates.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));

        let now = now.to_rfc3339();
        let boost = self.config.rehearsal_boost;
        let max_importance = self.config.max_importance;

        let mut writer = self.writer()?;
        let tx = writer.transaction()?;

        for update in ordered {
            let applied = Self::apply_access_update(&tx, update, &now, boost, max_importance)?;
            if !applied {
                tracing::warn!(
                    "Access counter conflict persisted for {}; merged increment non-conditionally",
                    update.id
                );
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// One row's conditional access bump. Returns false when the merge
    /// fallback was used.
    fn apply_access_update(
        tx: &rusqlite::Transaction<'_>,
        update: &AccessUpdate,
        now: &str,
        boost: f64,
        max_importance: f64,
    ) -> Result<bool> {
        let t = table(update.kind);
        let (guarded_sql, merge_sql) = if update.rehearse {
            (
                format!(
                    "UPDATE {t} SET
                        access_count = access_count + 1,
                        last_accessed_at = ?1,
                        importance_score = MIN(?2, importance_score + ?3),
                        rehearsal_count = rehearsal_count + 1,
                        last_modified_at = ?1, last_modified_op = 'rehearsed'
                     WHERE id = ?4 AND access_count = ?5"
                ),
                format!(
                    "UPDATE {t} SET
                        access_count = access_count + 1,
                        last_accessed_at = ?1,
                        importance_score = MIN(?2, importance_score + ?3),
                        rehearsal_count = rehearsal_count + 1,
                        last_modified_at = ?1, last_modified_op = 'rehearsed'
                     WHERE id = ?4"
                ),
            )
        } else {
            (
                format!(
                    "UPDATE {t} SET
                        access_count = access_count + 1,
                        last_accessed_at = ?1,
                        last_modified_at = ?1, last_modified_op = 'accessed'
                     WHERE id = ?4 AND access_count = ?5"
                ),
                format!(
                    "UPDATE {t} SET
                        access_count = access_count + 1,
                        last_accessed_at = ?1,
                        last_modified_at = ?1, last_modified_op = 'accessed'
                     WHERE id = ?4"
                ),
            )
        };

        let rows = tx.execute(
            &guarded_sql,
            params![now, max_importance, boost, update.id, update.observed_access_count],
        )?;
        if rows > 0 {
            return Ok(true);
        }

        // Lost update: re-read the live counter and retry once
        let observed: Option<i64> = tx
            .query_row(
                &format!("SELECT access_count FROM {t} WHERE id = ?1"),
                params![update.id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(observed) = observed else {
            // Row deleted between read and update; nothing to bump
            return Ok(true);
        };

        let rows = tx.execute(
            &guarded_sql,
            params![now, max_importance, boost, update.id, observed],
        )?;
        if rows > 0 {
            return Ok(true);
        }

        // Second conflict: merge the increment non-conditionally
        tx.execute(&merge_sql, params![now, max_importance, boost, update.id])?;
        Ok(false)
    }

    // ========================================================================
    // SCANS (decay task and admin views)
    // ========================================================================

    /// Page temporal envelopes oldest-first for a tenant and kind
    pub fn attribute_page(
        &self,
        tenant: &TenantScope,
        kind: MemoryKind,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AttributeRow>> {
        let sql = format!(
            "SELECT id, created_at, importance_score, access_count, last_accessed_at, rehearsal_count
             FROM {}
             WHERE organization_id = ?1 AND (?2 IS NULL OR user_id = ?2)
             ORDER BY created_at ASC, id ASC
             LIMIT ?3 OFFSET ?4",
            table(kind)
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![tenant.organization_id, tenant.user_id, limit as i64, offset as i64],
                |row| {
                    let created_at: String = row.get(1)?;
                    let last_accessed_at: Option<String> = row.get(4)?;
                    Ok(AttributeRow {
                        id: row.get(0)?,
                        created_at: Self::parse_timestamp(&created_at, "created_at")?,
                        importance_score: row.get(2)?,
                        access_count: row.get(3)?,
                        last_accessed_at: last_accessed_at
                            .as_deref()
                            .map(|s| Self::parse_timestamp(s, "last_accessed_at"))
                            .transpose()?,
                        rehearsal_count: row.get(5)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete a batch of ids from one kind's table in a single transaction
    ///
    /// Returns the number of rows removed. Ids already gone are skipped, so
    /// repeated cycles stay idempotent.
    pub fn delete_batch(&self, kind: MemoryKind, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM {} WHERE id = ?1", table(kind));
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let mut removed = 0usize;
        for id in ids {
            removed += tx.execute(&sql, params![id])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Count items for a tenant, optionally restricted to one kind
    pub fn count_items(&self, tenant: &TenantScope, kind: Option<MemoryKind>) -> Result<i64> {
        let kinds: Vec<MemoryKind> = match kind {
            Some(k) => vec![k],
            None => MemoryKind::ALL.to_vec(),
        };

        let reader = self.reader()?;
        let mut total = 0i64;
        for kind in kinds {
            let sql = format!(
                "SELECT COUNT(*) FROM {}
                 WHERE organization_id = ?1 AND (?2 IS NULL OR user_id = ?2)",
                table(kind)
            );
            let count: i64 = reader.query_row(
                &sql,
                params![tenant.organization_id, tenant.user_id],
                |row| row.get(0),
            )?;
            total += count;
        }
        Ok(total)
    }

    /// Distinct organizations present anywhere in the store
    pub fn list_organizations(&self) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut organizations = BTreeSet::new();
        for kind in MemoryKind::ALL {
            let sql = format!("SELECT DISTINCT organization_id FROM {}", table(kind));
            let mut stmt = reader.prepare(&sql)?;
            let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for id in ids.flatten() {
                organizations.insert(id);
            }
        }
        Ok(organizations.into_iter().collect())
    }

    // ========================================================================
    // ROW MAPPING
    // ========================================================================

    /// Parse RFC3339 timestamp
    fn parse_timestamp(value: &str, field_name: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Invalid {} timestamp '{}': {}", field_name, value, e),
                    )),
                )
            })
    }

    /// Convert a row to a MemoryItem
    fn row_to_item(kind: MemoryKind, row: &rusqlite::Row) -> rusqlite::Result<MemoryItem> {
        let created_at: String = row.get("created_at")?;
        let last_accessed_at: Option<String> = row.get("last_accessed_at")?;
        let last_modified_at: String = row.get("last_modified_at")?;
        let last_modified_op: String = row.get("last_modified_op")?;
        let metadata_json: String = row.get("metadata")?;

        let created_at = Self::parse_timestamp(&created_at, "created_at")?;
        let last_accessed_at = last_accessed_at
            .as_deref()
            .map(|s| Self::parse_timestamp(s, "last_accessed_at"))
            .transpose()?;
        let last_modified_at = Self::parse_timestamp(&last_modified_at, "last_modified_at")?;
        let operation = last_modified_op
            .parse::<MutationOp>()
            .unwrap_or(MutationOp::Updated);
        let metadata: serde_json::Value =
            serde_json::from_str(&metadata_json).unwrap_or_else(|_| serde_json::json!({}));

        let content = Self::content_from_row(kind, row)?;

        let mut has_embedding = false;
        for column in embedding_columns(kind) {
            let blob: Option<Vec<u8>> = row.get(*column)?;
            if blob.is_some() {
                has_embedding = true;
                break;
            }
        }

        Ok(MemoryItem {
            id: row.get("id")?,
            organization_id: row.get("organization_id")?,
            user_id: row.get("user_id")?,
            created_at,
            importance_score: row.get("importance_score")?,
            access_count: row.get("access_count")?,
            last_accessed_at,
            rehearsal_count: row.get("rehearsal_count")?,
            metadata,
            last_modified: LastModified { timestamp: last_modified_at, operation },
            content,
            has_embedding,
        })
    }

    /// Build the kind-specific content from a row
    fn content_from_row(kind: MemoryKind, row: &rusqlite::Row) -> rusqlite::Result<ItemContent> {
        match kind {
            MemoryKind::ChatMessage => {
                let role: String = row.get("role")?;
                let role = role.parse::<ChatRole>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
                    )
                })?;
                Ok(ItemContent::ChatMessage {
                    session_id: row.get("session_id")?,
                    role,
                    content: row.get("content")?,
                })
            }
            MemoryKind::EpisodicEvent => Ok(ItemContent::EpisodicEvent {
                actor: row.get("actor")?,
                event_type: row.get("event_type")?,
                summary: row.get("summary")?,
                details: row.get("details")?,
                tree_path: row.get("tree_path")?,
            }),
            MemoryKind::SemanticItem => Ok(ItemContent::SemanticItem {
                name: row.get("name")?,
                summary: row.get("summary")?,
                details: row.get("details")?,
                source: row.get("source")?,
                tree_path: row.get("tree_path")?,
            }),
            MemoryKind::ProceduralItem => {
                let steps_json: String = row.get("steps")?;
                let steps: Vec<String> =
                    serde_json::from_str(&steps_json).unwrap_or_default();
                Ok(ItemContent::ProceduralItem {
                    skill_name: row.get("skill_name")?,
                    description: row.get("description")?,
                    steps,
                })
            }
            MemoryKind::ResourceItem => Ok(ItemContent::ResourceItem {
                resource_name: row.get("resource_name")?,
                description: row.get("description")?,
                resource_type: row.get("resource_type")?,
                location: row.get("location")?,
            }),
            MemoryKind::VaultItem => Ok(ItemContent::VaultItem {
                title: row.get("title")?,
                content: row.get("content")?,
                vault_type: row.get("vault_type")?,
            }),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
