//! Scoring arithmetic scenarios against a live store
//!
//! Seeds items with exact ages and counters under a pinned clock, then checks
//! the temporal scores and eviction decisions the running system produces.

use remanence_core::{
    temporal_score, AccessUpdate, Clock, DecayOptions, DeletionReason, MemoryKind, TenantScope,
};
use remanence_e2e_tests::harness::TestDb;

fn approx(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() < eps
}

#[test]
fn low_importance_item_fades_below_threshold() {
    // importance 0.2, age 30 days, never accessed:
    // decay ~ 0.8*e^-1.5 + 0.2*31^-1.5 ~ 0.1901, temporal ~ 0.0380
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    let item = db.seed_message(&tenant, 30, 0.2, "a passing remark");

    let stored = db.service.get(&tenant, &item.id).unwrap().unwrap();
    let temporal = temporal_score(&stored, db.clock.now(), db.service.config());
    assert!(approx(temporal, 0.0380, 1e-3), "temporal was {}", temporal);

    let report = db
        .service
        .run_decay_cycle(&DecayOptions::dry_run("org-1"))
        .unwrap();
    let chat = report
        .kinds
        .iter()
        .find(|k| k.kind == MemoryKind::ChatMessage)
        .unwrap();
    assert_eq!(chat.to_delete, 1);
    assert_eq!(chat.samples[0].reason, DeletionReason::ScoreBelowThreshold);
    assert_eq!(chat.samples[0].reason.as_str(), "temporal score below threshold");
}

#[test]
fn high_importance_alone_cannot_save_an_unaccessed_item() {
    // importance 0.9, age 30 days: decay ~ 0.0744, temporal ~ 0.0670,
    // still below the 0.1 threshold
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    let item = db.seed_message(&tenant, 30, 0.9, "important but never revisited");

    let stored = db.service.get(&tenant, &item.id).unwrap().unwrap();
    let temporal = temporal_score(&stored, db.clock.now(), db.service.config());
    assert!(approx(temporal, 0.0670, 1e-3), "temporal was {}", temporal);

    let report = db
        .service
        .run_decay_cycle(&DecayOptions::for_org("org-1"))
        .unwrap();
    assert_eq!(report.total_deleted(), 1);
}

#[test]
fn recent_access_saves_an_old_item() {
    // importance 0.5, age 200 days, 10 accesses, last access 2 days ago:
    // recency e^-0.2 ~ 0.8187, frequency log2(11)/10 ~ 0.3459,
    // temporal ~ 0.3148 and the item survives
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    let item = db.seed_message(&tenant, 0, 0.5, "old but beloved");

    // Ten accesses 198 days into the item's life, then two more quiet days
    db.advance_days(198);
    for observed in 0..10 {
        db.service
            .store()
            .record_access(
                &[AccessUpdate {
                    kind: MemoryKind::ChatMessage,
                    id: item.id.clone(),
                    observed_access_count: observed,
                    rehearse: false,
                }],
                db.clock.now(),
            )
            .unwrap();
    }
    db.advance_days(2);

    let stored = db.service.get(&tenant, &item.id).unwrap().unwrap();
    assert_eq!(stored.access_count, 10);
    let temporal = temporal_score(&stored, db.clock.now(), db.service.config());
    assert!(approx(temporal, 0.3148, 1e-3), "temporal was {}", temporal);

    let report = db
        .service
        .run_decay_cycle(&DecayOptions::for_org("org-1"))
        .unwrap();
    assert_eq!(report.total_to_delete(), 0);
    assert!(db.service.get(&tenant, &item.id).unwrap().is_some());
}

#[test]
fn age_limit_overrides_any_score() {
    // importance 0.95, age 400 days, heavily accessed: the temporal score is
    // healthy, but 400 > 365 evicts regardless
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    let item = db.seed_message(&tenant, 400, 0.95, "venerable");

    for observed in 0..50 {
        db.service
            .store()
            .record_access(
                &[AccessUpdate {
                    kind: MemoryKind::ChatMessage,
                    id: item.id.clone(),
                    observed_access_count: observed,
                    rehearse: false,
                }],
                db.clock.now(),
            )
            .unwrap();
    }

    let stored = db.service.get(&tenant, &item.id).unwrap().unwrap();
    let temporal = temporal_score(&stored, db.clock.now(), db.service.config());
    assert!(temporal > db.service.config().deletion_threshold);

    let report = db
        .service
        .run_decay_cycle(&DecayOptions::for_org("org-1"))
        .unwrap();
    let chat = report
        .kinds
        .iter()
        .find(|k| k.kind == MemoryKind::ChatMessage)
        .unwrap();
    assert_eq!(chat.deleted, 1);
    assert_eq!(chat.samples[0].reason, DeletionReason::ExceededMaxAge);
    assert_eq!(chat.samples[0].reason.as_str(), "exceeded max age");
}

#[test]
fn exact_age_boundary_is_retained() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    // Exactly at max_age_days, kept alive by recent access so only the age
    // rule is in play
    let item = db.seed_message(&tenant, 365, 0.9, "boundary case");
    db.service
        .store()
        .record_access(
            &[AccessUpdate {
                kind: MemoryKind::ChatMessage,
                id: item.id.clone(),
                observed_access_count: 0,
                rehearse: false,
            }],
            db.clock.now(),
        )
        .unwrap();

    let report = db
        .service
        .run_decay_cycle(&DecayOptions::for_org("org-1"))
        .unwrap();
    assert_eq!(report.total_to_delete(), 0);
    assert!(db.service.get(&tenant, &item.id).unwrap().is_some());
}
