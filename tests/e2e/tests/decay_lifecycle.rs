//! Decay task lifecycle
//!
//! Dry-run planning, live eviction, repeat-cycle idempotence, batching, and
//! tenant independence of the maintenance path.

use remanence_core::{Clock, DecayOptions, DistributionField, MemoryKind, Query, TenantScope};
use remanence_e2e_tests::harness::TestDb;

#[test]
fn dry_run_plans_without_touching_the_store() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");

    let doomed = db.seed_message(&tenant, 40, 0.2, "fading");
    let safe = db.seed_message(&tenant, 1, 0.8, "fresh");

    let before: Vec<_> = [&doomed, &safe]
        .iter()
        .map(|i| db.service.get(&tenant, &i.id).unwrap().unwrap())
        .collect();

    let report = db
        .service
        .run_decay_cycle(&DecayOptions::dry_run("org-1"))
        .unwrap();
    assert!(report.dry_run);
    assert_eq!(report.total_scanned(), 2);
    assert_eq!(report.total_to_delete(), 1);
    assert_eq!(report.total_deleted(), 0);

    // Byte-for-byte identical afterwards: counters, stamps, everything
    for (item, snapshot) in [&doomed, &safe].iter().zip(&before) {
        let after = db.service.get(&tenant, &item.id).unwrap().unwrap();
        assert_eq!(
            serde_json::to_string(&after).unwrap(),
            serde_json::to_string(snapshot).unwrap()
        );
    }
}

#[test]
fn live_cycle_deletes_plan_and_second_cycle_is_quiet() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");

    db.seed_message(&tenant, 40, 0.2, "fading");
    db.seed_message(&tenant, 500, 0.9, "ancient");
    let safe = db.seed_message(&tenant, 1, 0.8, "fresh");

    let first = db
        .service
        .run_decay_cycle(&DecayOptions::for_org("org-1"))
        .unwrap();
    assert_eq!(first.total_deleted(), 2);
    assert!(!first.partial);

    // Under an unchanged clock the second cycle finds nothing new
    let second = db
        .service
        .run_decay_cycle(&DecayOptions::for_org("org-1"))
        .unwrap();
    assert_eq!(second.total_scanned(), 1);
    assert_eq!(second.total_to_delete(), 0);
    assert_eq!(second.total_deleted(), 0);

    assert!(db.service.get(&tenant, &safe.id).unwrap().is_some());
}

#[test]
fn items_crossing_a_threshold_between_cycles_get_collected_later() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    // Retained now, but within reach of the age limit
    let item = db.seed_message(&tenant, 360, 0.9, "on borrowed time");
    db.service
        .store()
        .record_access(
            &[remanence_core::AccessUpdate {
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
    assert_eq!(report.total_deleted(), 0);

    // Ten days later the age limit is crossed
    db.advance_days(10);
    let report = db
        .service
        .run_decay_cycle(&DecayOptions::for_org("org-1"))
        .unwrap();
    assert_eq!(report.total_deleted(), 1);
}

#[test]
fn decay_on_one_org_leaves_the_other_untouched() {
    let db = TestDb::new();
    let org_a = TenantScope::org("org-a");
    let org_b = TenantScope::org("org-b");

    for i in 0..20 {
        db.seed_message(&org_a, 40, 0.2, &format!("a{}", i));
        db.seed_message(&org_b, 40, 0.2, &format!("b{}", i));
    }
    let admin = db.service.admin();
    assert_eq!(admin.count_items(&org_a, None).unwrap(), 20);
    assert_eq!(admin.count_items(&org_b, None).unwrap(), 20);

    let report = db
        .service
        .run_decay_cycle(&DecayOptions::for_org("org-a"))
        .unwrap();
    assert_eq!(report.total_deleted(), 20);

    assert_eq!(admin.count_items(&org_a, None).unwrap(), 0);
    assert_eq!(admin.count_items(&org_b, None).unwrap(), 20);

    // And retrieval for B still sees its items
    let result = db.service.retrieve(&Query::recent(&org_b)).unwrap();
    assert_eq!(result.items.len(), 10);
}

#[test]
fn small_batches_cover_the_whole_tenant() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    for i in 0..37 {
        db.seed_message(&tenant, 40, 0.2, &format!("m{}", i));
    }

    let options = DecayOptions {
        batch_size: 5,
        ..DecayOptions::for_org("org-1")
    };
    let report = db.service.run_decay_cycle(&options).unwrap();
    assert_eq!(report.total_scanned(), 37);
    assert_eq!(report.total_deleted(), 37);
    assert_eq!(db.service.admin().count_items(&tenant, None).unwrap(), 0);
}

#[test]
fn admin_views_track_the_decay_cycle() {
    let db = TestDb::new();
    let tenant = TenantScope::org("org-1");
    db.seed_message(&tenant, 40, 0.2, "forgettable");
    db.seed_message(&tenant, 1, 0.8, "memorable");

    let admin = db.service.admin();
    assert_eq!(admin.count_items(&tenant, None).unwrap(), 2);
    assert_eq!(admin.forgettable_count(&tenant, None).unwrap(), 1);

    let histogram = admin
        .distribution(&tenant, MemoryKind::ChatMessage, DistributionField::AgeDays)
        .unwrap();
    assert_eq!(histogram.total, 2);

    db.service
        .run_decay_cycle(&DecayOptions::for_org("org-1"))
        .unwrap();

    assert_eq!(admin.count_items(&tenant, None).unwrap(), 1);
    assert_eq!(admin.forgettable_count(&tenant, None).unwrap(), 0);
}
