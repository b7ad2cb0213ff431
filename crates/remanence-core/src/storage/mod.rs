//! Storage Module
//!
//! SQLite persistence for the six memory kinds: tenant-scoped tables, FTS5
//! lexical indexes, embedding blobs, and versioned forward-only migrations.

pub mod migrations;
mod sqlite;

pub use sqlite::{sanitize_match_query, AccessUpdate, AttributeRow, MemoryStore};
