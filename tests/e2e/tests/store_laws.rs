//! Round-trip and idempotence laws of the write surface

use remanence_core::{
    CreateInput, ItemContent, MemoryError, MutationOp, Query, TenantScope, UpdatePatch,
};
use remanence_e2e_tests::harness::TestDb;

#[test]
fn create_then_delete_leaves_no_trace() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");

    let item = db.seed_note(&tenant, "ephemeral", "soon gone");
    assert_eq!(db.service.admin().count_items(&tenant, None).unwrap(), 1);

    assert!(db.service.delete(&tenant, &item.id).unwrap());
    assert_eq!(db.service.admin().count_items(&tenant, None).unwrap(), 0);
    assert!(db.service.get(&tenant, &item.id).unwrap().is_none());

    // No lexical ghost remains
    let result = db.service.retrieve(&Query::text(&tenant, "ephemeral")).unwrap();
    assert!(result.items.is_empty());

    // Repeated delete is an idempotent success
    assert!(!db.service.delete(&tenant, &item.id).unwrap());
    assert!(!db.service.delete(&tenant, &item.id).unwrap());
}

#[test]
fn empty_patch_touches_only_the_audit_stamp() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    let item = db.seed_note(&tenant, "stable", "unchanging content");

    db.advance_days(1);
    let updated = db
        .service
        .update(&tenant, &item.id, UpdatePatch::default())
        .unwrap();

    assert_eq!(updated.content, item.content);
    assert_eq!(updated.importance_score, item.importance_score);
    assert_eq!(updated.metadata, item.metadata);
    assert_eq!(updated.access_count, item.access_count);
    assert_eq!(updated.rehearsal_count, item.rehearsal_count);
    assert_eq!(updated.created_at, item.created_at);

    assert_eq!(updated.last_modified.operation, MutationOp::Updated);
    assert!(updated.last_modified.timestamp > item.last_modified.timestamp);
}

#[test]
fn update_cannot_reach_counters_or_tenant() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    let item = db.seed_note(&tenant, "n", "original");

    // The patch type has no counter or tenant fields at all; a serialized
    // attempt to smuggle them in is rejected outright
    let smuggled = r#"{"accessCount": 99}"#;
    assert!(serde_json::from_str::<UpdatePatch>(smuggled).is_err());
    let smuggled = r#"{"organizationId": "org-2"}"#;
    assert!(serde_json::from_str::<UpdatePatch>(smuggled).is_err());

    // A legitimate content update leaves tenant and counters intact
    let updated = db
        .service
        .update(
            &tenant,
            &item.id,
            UpdatePatch {
                content: Some(ItemContent::VaultItem {
                    title: "n".into(),
                    content: "revised".into(),
                    vault_type: "note".into(),
                }),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.organization_id, "org-1");
    assert_eq!(updated.access_count, 0);
    assert_eq!(updated.id, item.id);
}

#[test]
fn importance_is_clamped_on_every_write_path() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");

    let mut input = CreateInput::new(
        tenant.clone(),
        ItemContent::VaultItem {
            title: "t".into(),
            content: "c".into(),
            vault_type: "note".into(),
        },
    );
    input.importance_score = Some(42.0);
    let item = db.service.create(input).unwrap();
    assert_eq!(item.importance_score, 1.0);

    let updated = db
        .service
        .update(
            &tenant,
            &item.id,
            UpdatePatch { importance_score: Some(-3.0), ..Default::default() },
        )
        .unwrap();
    assert_eq!(updated.importance_score, 0.0);
}

#[test]
fn updates_outside_the_tenant_scope_are_not_found() {
    let db = TestDb::new();
    let owner = TenantScope::user("org-1", "alice");
    let item = db.seed_note(&owner, "t", "c");

    let stranger = TenantScope::user("org-1", "bob");
    assert!(matches!(
        db.service.update(&stranger, &item.id, UpdatePatch::default()),
        Err(MemoryError::NotFound(_))
    ));

    let other_org = TenantScope::org("org-2");
    assert!(matches!(
        db.service.update(&other_org, &item.id, UpdatePatch::default()),
        Err(MemoryError::NotFound(_))
    ));

    // Delete outside the scope is an idempotent no-op, and the item survives
    assert!(!db.service.delete(&other_org, &item.id).unwrap());
    assert!(db.service.get(&owner, &item.id).unwrap().is_some());
}

#[test]
fn metadata_round_trips_as_json() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");

    let mut input = CreateInput::new(
        tenant.clone(),
        ItemContent::VaultItem {
            title: "t".into(),
            content: "c".into(),
            vault_type: "note".into(),
        },
    );
    input.metadata = Some(serde_json::json!({
        "source": "ingest-pipeline",
        "tags": ["infra", "deploys"],
        "confidence": 0.85,
    }));
    let item = db.service.create(input).unwrap();

    let fetched = db.service.get(&tenant, &item.id).unwrap().unwrap();
    assert_eq!(fetched.metadata["source"], "ingest-pipeline");
    assert_eq!(fetched.metadata["tags"][1], "deploys");
    assert_eq!(fetched.metadata["confidence"], 0.85);
}

#[test]
fn ids_are_unique_and_not_reused() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");

    let first = db.seed_note(&tenant, "a", "x");
    db.service.delete(&tenant, &first.id).unwrap();
    let second = db.seed_note(&tenant, "a", "x");

    assert_ne!(first.id, second.id);
}
