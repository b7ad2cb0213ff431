//! Retrieval pipeline journeys
//!
//! Full query-to-result flows: ranking, rehearsal side effects, tenant
//! isolation, and ordering determinism.

use std::collections::HashSet;

use remanence_core::{MemoryKind, Query, TenantScope, WeightOverrides};
use remanence_e2e_tests::harness::TestDb;

#[test]
fn rehearsal_strengthens_top_items_only() {
    // Three returned items with relevances 0.9, 0.72, 0.4 against the 0.7
    // threshold: exactly the first two are rehearsed. A scanned candidate
    // outside the top three is untouched.
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");

    let high = db.seed_note(&tenant, "high", "x");
    let mid = db.seed_note(&tenant, "mid", "x");
    let low = db.seed_note(&tenant, "low", "x");
    let scanned_only = db.seed_note(&tenant, "bystander", "x");

    db.embed_at(&tenant, &high, "content_embedding", 0.9);
    db.embed_at(&tenant, &mid, "content_embedding", 0.72);
    db.embed_at(&tenant, &low, "content_embedding", 0.4);
    db.embed_at(&tenant, &scanned_only, "content_embedding", 0.05);

    let mut query = Query::recent(&tenant);
    query.vector = Some(vec![1.0, 0.0]);
    query.limit = 3;
    let result = db.service.retrieve(&query).unwrap();

    assert_eq!(result.items.len(), 3);
    assert_eq!(result.scanned_candidates, 4);

    let ids: Vec<&str> = result.items.iter().map(|r| r.item.id.as_str()).collect();
    assert_eq!(ids, vec![high.id.as_str(), mid.id.as_str(), low.id.as_str()]);

    assert!(result.items[0].was_rehearsed);
    assert!(result.items[1].was_rehearsed);
    assert!(!result.items[2].was_rehearsed);

    // Rehearsed: importance bumped by 0.05, rehearsal_count incremented
    for retrieved in &result.items[..2] {
        assert!((retrieved.item.importance_score - 0.55).abs() < 1e-9);
        assert_eq!(retrieved.item.rehearsal_count, 1);
    }
    // Returned but not rehearsed: counters bumped, importance untouched
    assert_eq!(result.items[2].item.access_count, 1);
    assert_eq!(result.items[2].item.rehearsal_count, 0);
    assert!((result.items[2].item.importance_score - 0.5).abs() < 1e-9);

    // Scanned but not returned: fully untouched
    let bystander = db.service.get(&tenant, &scanned_only.id).unwrap().unwrap();
    assert_eq!(bystander.access_count, 0);
    assert_eq!(bystander.rehearsal_count, 0);
    assert!(bystander.last_accessed_at.is_none());
}

#[test]
fn repeated_rehearsal_clamps_at_max_importance() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    let item = db.seed_note(&tenant, "n", "x");
    db.embed_at(&tenant, &item, "content_embedding", 0.95);

    let mut query = Query::recent(&tenant);
    query.vector = Some(vec![1.0, 0.0]);
    query.limit = 1;

    for _ in 0..15 {
        db.service.retrieve(&query).unwrap();
    }

    let stored = db.service.get(&tenant, &item.id).unwrap().unwrap();
    assert_eq!(stored.access_count, 15);
    assert_eq!(stored.rehearsal_count, 15);
    // 0.5 + 15 * 0.05 would be 1.25; the clamp holds it at 1.0
    assert!((stored.importance_score - 1.0).abs() < 1e-9);
}

#[test]
fn counters_are_monotone_across_retrievals() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    let item = db.seed_note(&tenant, "n", "persistent fact");

    let mut previous_access = 0;
    let mut previous_accessed_at = None;
    for _ in 0..5 {
        db.advance_days(1);
        let result = db
            .service
            .retrieve(&Query::text(&tenant, "persistent"))
            .unwrap();
        assert_eq!(result.items.len(), 1);

        let stored = db.service.get(&tenant, &item.id).unwrap().unwrap();
        assert!(stored.access_count > previous_access);
        assert!(stored.last_accessed_at >= previous_accessed_at);
        previous_access = stored.access_count;
        previous_accessed_at = stored.last_accessed_at;
    }
    assert_eq!(previous_access, 5);
}

#[test]
fn tenant_isolation_across_all_modes() {
    let db = TestDb::new();
    let org_a = TenantScope::org("org-a");
    let org_b = TenantScope::org("org-b");

    for i in 0..4 {
        db.seed_note(&org_a, &format!("a{}", i), "common phrasing everywhere");
        db.seed_note(&org_b, &format!("b{}", i), "common phrasing everywhere");
    }

    // Lexical
    let result = db
        .service
        .retrieve(&Query::text(&org_a, "common phrasing"))
        .unwrap();
    assert_eq!(result.items.len(), 4);
    assert!(result.items.iter().all(|r| r.item.organization_id == "org-a"));

    // Recent
    let result = db.service.retrieve(&Query::recent(&org_b)).unwrap();
    assert!(result.items.iter().all(|r| r.item.organization_id == "org-b"));

    // Vector
    let a_ids: HashSet<String> = (0..4)
        .map(|_| {
            let item = db.seed_note(&org_a, "v", "x");
            db.embed_at(&org_a, &item, "content_embedding", 0.8);
            item.id
        })
        .collect();
    let mut query = Query::recent(&org_b);
    query.vector = Some(vec![1.0, 0.0]);
    let result = db.service.retrieve(&query).unwrap();
    assert!(result.items.iter().all(|r| !a_ids.contains(&r.item.id)));
}

#[test]
fn user_scope_narrows_visibility() {
    let db = TestDb::new();
    let alice = TenantScope::user("org-1", "alice");
    let bob = TenantScope::user("org-1", "bob");

    db.seed_note(&alice, "alice-note", "private context");
    db.seed_note(&bob, "bob-note", "private context");

    let result = db
        .service
        .retrieve(&Query::text(&alice, "private context"))
        .unwrap();
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].item.user_id.as_deref(), Some("alice"));

    // Org-wide queries see both
    let org = TenantScope::org("org-1");
    let result = db
        .service
        .retrieve(&Query::text(&org, "private context"))
        .unwrap();
    assert_eq!(result.items.len(), 2);
}

#[test]
fn identical_retrievals_return_identical_orders() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    for i in 0..8 {
        db.seed_note(&tenant, &format!("n{}", i), "the same text in every note");
    }

    let query = Query::text(&tenant, "same text");
    let orders: Vec<Vec<String>> = (0..3)
        .map(|_| {
            db.service
                .retrieve(&query)
                .unwrap()
                .items
                .iter()
                .map(|r| r.item.id.clone())
                .collect()
        })
        .collect();

    assert_eq!(orders[0], orders[1]);
    assert_eq!(orders[1], orders[2]);
    // Full tie on scores: ascending id is the final tie-break
    let mut sorted = orders[0].clone();
    sorted.sort();
    assert_eq!(orders[0], sorted);
}

#[test]
fn weight_overrides_flip_relevance_against_freshness() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");

    let exact = db.seed_note(&tenant, "old-exact", "kubernetes rollback kubernetes rollback");
    db.advance_days(200);
    let fresh = db.seed_note(
        &tenant,
        "fresh-mention",
        "kubernetes mentioned once among many other words here",
    );

    let mut relevance_only = Query::text(&tenant, "kubernetes rollback");
    relevance_only.weight_overrides =
        Some(WeightOverrides { w_rel: Some(1.0), w_tmp: Some(0.0) });
    let result = db.service.retrieve(&relevance_only).unwrap();
    assert_eq!(result.items[0].item.id, exact.id);

    let mut temporal_only = Query::text(&tenant, "kubernetes");
    temporal_only.weight_overrides =
        Some(WeightOverrides { w_rel: Some(0.0), w_tmp: Some(1.0) });
    let result = db.service.retrieve(&temporal_only).unwrap();
    assert_eq!(result.items[0].item.id, fresh.id);
}

#[test]
fn empty_tenant_yields_empty_result_with_zero_scanned() {
    let db = TestDb::new();
    let result = db
        .service
        .retrieve(&Query::recent(&TenantScope::org("nobody")))
        .unwrap();
    assert!(result.items.is_empty());
    assert_eq!(result.scanned_candidates, 0);
    assert!(!result.vector_unavailable);
}

#[test]
fn kind_filter_restricts_results() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    db.seed_note(&tenant, "note", "shared token");
    db.seed_event(&tenant, 0, 0.5, "shared token");

    let mut query = Query::text(&tenant, "shared token");
    query.kinds = vec![MemoryKind::EpisodicEvent];
    let result = db.service.retrieve(&query).unwrap();
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].item.kind(), MemoryKind::EpisodicEvent);
}
