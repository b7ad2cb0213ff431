//! Memory items - the persisted unit of the store
//!
//! Six concrete kinds share one temporal envelope (tenant scope, importance,
//! access counters, audit stamp) and differ in their content fields. The
//! scoring engine sees only the envelope, through [`TemporalAttributes`].
//!
//! [`TemporalAttributes`]: crate::scoring::TemporalAttributes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// KINDS
// ============================================================================

/// The six memory item kinds, one table each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A single chat turn inside a session
    ChatMessage,
    /// Something that happened at a point in time
    EpisodicEvent,
    /// A standing fact or concept
    SemanticItem,
    /// How-to knowledge with ordered steps
    ProceduralItem,
    /// A pointer to an external resource
    ResourceItem,
    /// Curated reference material
    VaultItem,
}

impl MemoryKind {
    /// All kinds, in retrieval order
    pub const ALL: [MemoryKind; 6] = [
        MemoryKind::ChatMessage,
        MemoryKind::EpisodicEvent,
        MemoryKind::SemanticItem,
        MemoryKind::ProceduralItem,
        MemoryKind::ResourceItem,
        MemoryKind::VaultItem,
    ];

    /// Stable string name, also used in persisted audit stamps
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::ChatMessage => "chat_message",
            MemoryKind::EpisodicEvent => "episodic_event",
            MemoryKind::SemanticItem => "semantic_item",
            MemoryKind::ProceduralItem => "procedural_item",
            MemoryKind::ResourceItem => "resource_item",
            MemoryKind::VaultItem => "vault_item",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat_message" => Ok(MemoryKind::ChatMessage),
            "episodic_event" => Ok(MemoryKind::EpisodicEvent),
            "semantic_item" => Ok(MemoryKind::SemanticItem),
            "procedural_item" => Ok(MemoryKind::ProceduralItem),
            "resource_item" => Ok(MemoryKind::ResourceItem),
            "vault_item" => Ok(MemoryKind::VaultItem),
            _ => Err(format!("Unknown memory kind: {}", s)),
        }
    }
}

/// Speaker role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            "system" => Ok(ChatRole::System),
            _ => Err(format!("Unknown chat role: {}", s)),
        }
    }
}

// ============================================================================
// CONTENT
// ============================================================================

/// Kind-specific content fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ItemContent {
    /// Chat turn: `created_at` is the message timestamp
    ChatMessage {
        session_id: String,
        role: ChatRole,
        content: String,
    },
    /// Episodic event: `created_at` is the occurrence time
    EpisodicEvent {
        actor: String,
        event_type: String,
        summary: String,
        details: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tree_path: Option<String>,
    },
    SemanticItem {
        name: String,
        summary: String,
        details: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tree_path: Option<String>,
    },
    ProceduralItem {
        skill_name: String,
        description: String,
        steps: Vec<String>,
    },
    ResourceItem {
        resource_name: String,
        description: String,
        resource_type: String,
        location: String,
    },
    VaultItem {
        title: String,
        content: String,
        vault_type: String,
    },
}

impl ItemContent {
    /// The kind this content belongs to
    pub fn kind(&self) -> MemoryKind {
        match self {
            ItemContent::ChatMessage { .. } => MemoryKind::ChatMessage,
            ItemContent::EpisodicEvent { .. } => MemoryKind::EpisodicEvent,
            ItemContent::SemanticItem { .. } => MemoryKind::SemanticItem,
            ItemContent::ProceduralItem { .. } => MemoryKind::ProceduralItem,
            ItemContent::ResourceItem { .. } => MemoryKind::ResourceItem,
            ItemContent::VaultItem { .. } => MemoryKind::VaultItem,
        }
    }

    /// The texts that feed each embedding column, as `(column, text)` pairs
    ///
    /// Column names match the persisted schema; kinds with two lexical fields
    /// carry two vectors.
    pub fn embedding_sources(&self) -> Vec<(&'static str, &str)> {
        match self {
            ItemContent::ChatMessage { content, .. } => {
                vec![("content_embedding", content.as_str())]
            }
            ItemContent::EpisodicEvent { summary, details, .. } => vec![
                ("summary_embedding", summary.as_str()),
                ("details_embedding", details.as_str()),
            ],
            ItemContent::SemanticItem { summary, details, .. } => vec![
                ("summary_embedding", summary.as_str()),
                ("details_embedding", details.as_str()),
            ],
            ItemContent::ProceduralItem { description, .. } => {
                vec![("description_embedding", description.as_str())]
            }
            ItemContent::ResourceItem { description, .. } => {
                vec![("description_embedding", description.as_str())]
            }
            ItemContent::VaultItem { content, .. } => {
                vec![("content_embedding", content.as_str())]
            }
        }
    }
}

// ============================================================================
// MEMORY ITEM
// ============================================================================

/// A persisted memory item: temporal envelope plus kind-specific content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    /// Unique identifier (UUID v4), never reused
    pub id: String,
    /// Owning organization, immutable
    pub organization_id: String,
    /// Optional narrowing user scope, immutable
    pub user_id: Option<String>,
    /// Logical birth: message/event time for chat and episodic kinds,
    /// insertion time otherwise
    pub created_at: DateTime<Utc>,
    /// Current importance in the configured clamp range
    pub importance_score: f64,
    /// Times this item was returned from retrieval; non-decreasing
    pub access_count: i64,
    /// Last retrieval time; `None` means never accessed
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Times this item was rehearsed; non-decreasing
    pub rehearsal_count: i64,
    /// Opaque caller metadata
    pub metadata: serde_json::Value,
    /// Audit stamp written on every mutation
    pub last_modified: LastModified,
    /// Kind-specific content
    pub content: ItemContent,
    /// Whether at least one embedding vector is stored for this item
    pub has_embedding: bool,
}

impl MemoryItem {
    /// The item's kind, derived from its content
    pub fn kind(&self) -> MemoryKind {
        self.content.kind()
    }
}

/// Audit stamp: when the item last changed, and how
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastModified {
    pub timestamp: DateTime<Utc>,
    pub operation: MutationOp,
}

/// The mutation that produced an audit stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Created,
    Updated,
    Accessed,
    Rehearsed,
    Deleted,
}

impl MutationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOp::Created => "created",
            MutationOp::Updated => "updated",
            MutationOp::Accessed => "accessed",
            MutationOp::Rehearsed => "rehearsed",
            MutationOp::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for MutationOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(MutationOp::Created),
            "updated" => Ok(MutationOp::Updated),
            "accessed" => Ok(MutationOp::Accessed),
            "rehearsed" => Ok(MutationOp::Rehearsed),
            "deleted" => Ok(MutationOp::Deleted),
            _ => Err(format!("Unknown mutation op: {}", s)),
        }
    }
}

impl std::fmt::Display for MutationOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// WRITE INPUTS
// ============================================================================

/// Input for creating a new memory item
///
/// Uses `deny_unknown_fields` to prevent field injection through the write
/// surface. Counter fields are deliberately absent: they are owned by the
/// retrieval pipeline and the decay task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateInput {
    /// Tenant scope the item belongs to
    pub tenant: crate::memory::TenantScope,
    /// Kind-specific content fields
    pub content: ItemContent,
    /// Initial importance; defaults to 0.5, clamped to the configured range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance_score: Option<f64>,
    /// Opaque caller metadata; defaults to `{}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Explicit logical birth time. Only meaningful for the chat and
    /// episodic kinds (message timestamp / occurrence time); rejected for
    /// other kinds, which are born at insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl CreateInput {
    /// Minimal input with default importance and empty metadata
    pub fn new(tenant: crate::memory::TenantScope, content: ItemContent) -> Self {
        Self {
            tenant,
            content,
            importance_score: None,
            metadata: None,
            occurred_at: None,
        }
    }
}

/// Partial update for an existing item
///
/// `None` fields are left untouched. An all-`None` patch only refreshes the
/// audit stamp. The patch cannot reach id, tenant, or counter fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdatePatch {
    /// Replacement content; must be of the item's kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ItemContent>,
    /// New importance, clamped to the configured range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance_score: Option<f64>,
    /// Replacement metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl UpdatePatch {
    /// Whether the patch changes anything beyond the audit stamp
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.importance_score.is_none() && self.metadata.is_none()
    }
}

// ============================================================================
// TESTS
// ============================================================================
