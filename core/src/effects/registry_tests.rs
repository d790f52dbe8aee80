//! Tests for EffectRegistry reconciliation
//!
//! Verifies that:
//! - Queued requests only become visible after reconciliation
//! - Category caps hold after every reconciliation
//! - Refresh, cancellation, toggles and expiry follow queue order
//! - Published snapshots are never torn or mutated

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use proptest::prelude::*;

use super::{
    ApplyOutcome, ChannelSink, EffectBuilder, EffectRegistry, EffectState, RemovalTarget, SimTime,
};
use crate::catalog::{CatalogRows, EffectCatalog, EffectCategory};
use crate::ids::{EffectToken, EffectType, UnitId};
use crate::modifier::{FieldId, PropertyModifier};

// ═══════════════════════════════════════════════════════════════════════════
// Test Helpers
// ═══════════════════════════════════════════════════════════════════════════

const TICK: Duration = Duration::from_millis(100);

const HASTE: EffectType = EffectType(1);
const MIGHT: EffectType = EffectType(2);
const POISON: EffectType = EffectType(3);
const BLESSING: EffectType = EffectType(4);
const BEACON: EffectType = EffectType(5);
const BEACON_CHILD: EffectType = EffectType(6);

const SPEED: FieldId = FieldId(0);
const ARMOR: FieldId = FieldId(1);

/// Catalog with an exclusive "stance" category (cap 1), a "poison" category
/// (cap 3) and uncapped effects.
fn make_catalog() -> Arc<EffectCatalog> {
    let rows: CatalogRows = toml::from_str(
        r#"
        [[field]]
        name = "speed"
        [[field]]
        name = "armor"

        [[category]]
        name = "stance"
        bit = 0
        max_level = 1
        [[category]]
        name = "poison"
        bit = 1
        max_level = 3

        [[effect]]
        id = 1
        name = "haste"
        categories = ["stance"]
        duration_ms = 1000
        modifiers = [{ field = "speed", formula = "multiply", value = 1.5 }]

        [[effect]]
        id = 2
        name = "might"
        categories = ["stance"]
        modifiers = [{ field = "armor", formula = "add", value = 5.0 }]

        [[effect]]
        id = 3
        name = "poison"
        categories = ["poison"]
        duration_ms = 300

        [[effect]]
        id = 4
        name = "blessing"
        modifiers = [
            { field = "speed", formula = "add", value = 1.0 },
            { field = "armor", formula = "add", value = 2.0 },
        ]

        [[effect]]
        id = 5
        name = "beacon"
        aura_radius = 30.0
        propagated_type = "beacon_child"

        [[effect]]
        id = 6
        name = "beacon_child"
        display = false
        "#,
    )
    .unwrap();
    Arc::new(EffectCatalog::from_rows(rows).unwrap())
}

fn make_registry() -> EffectRegistry {
    EffectRegistry::new(UnitId(1), make_catalog())
}

fn apply(registry: &EffectRegistry, effect_type: EffectType) -> EffectToken {
    let handle = registry.handle();
    handle.apply(handle.builder(effect_type)).unwrap()
}

fn count_in(registry: &EffectRegistry, category: EffectCategory) -> usize {
    registry.effects().with_category(category).count()
}

// ═══════════════════════════════════════════════════════════════════════════
// Admission
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_apply_is_invisible_until_reconcile() {
    let mut registry = make_registry();
    let token = apply(&registry, BLESSING);

    assert!(registry.effects().is_empty());
    assert!(registry.handle().has_pending());

    let report = registry.reconcile(TICK);
    assert_eq!(report.admitted, 1);
    assert!(report.published);
    assert_eq!(report.touched_fields.iter().copied().collect::<Vec<_>>(), vec![SPEED, ARMOR]);

    let snapshot = registry.effects();
    let effect = snapshot.by_token(token).unwrap();
    assert_eq!(effect.state, EffectState::Active);
    assert_eq!(effect.owner, UnitId(1));
    assert!(!registry.handle().has_pending());
}

#[test]
fn test_apply_overrides_builder_owner() {
    let mut registry = make_registry();
    let handle = registry.handle();
    let builder = EffectBuilder::new(handle.catalog().clone())
        .set_type(BLESSING)
        .set_owner(UnitId(99));
    let token = handle.apply(builder).unwrap();

    registry.reconcile(TICK);
    assert_eq!(registry.effects().by_token(token).unwrap().owner, UnitId(1));
}

#[test]
fn test_unknown_type_fails_at_build() {
    let registry = make_registry();
    let handle = registry.handle();
    assert!(handle.apply(handle.builder(EffectType(404))).is_err());
    assert!(!handle.has_pending());
}

#[test]
fn test_nothing_published_when_nothing_changes() {
    let mut registry = make_registry();
    apply(&registry, MIGHT);
    registry.reconcile(TICK);
    let version = registry.effects().version();

    let report = registry.reconcile(TICK);
    assert!(!report.published);
    assert_eq!(registry.effects().version(), version);
}

// ═══════════════════════════════════════════════════════════════════════════
// Category caps
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_exclusive_category_keeps_first_in_queue_order() {
    for (first, second) in [(HASTE, MIGHT), (MIGHT, HASTE)] {
        let mut registry = make_registry();
        let kept = apply(&registry, first);
        let dropped = apply(&registry, second);

        let report = registry.reconcile(TICK);
        assert_eq!(report.admitted, 1);
        assert_eq!(report.rejected, 1);

        let snapshot = registry.effects();
        assert!(snapshot.contains_token(kept));
        assert!(!snapshot.contains_token(dropped));
        assert_eq!(count_in(&registry, EffectCategory::bit(0)), 1);
    }
}

#[test]
fn test_rejection_outcome_names_the_bit() {
    let mut registry = make_registry();
    let handle = registry.handle();
    apply(&registry, MIGHT);
    let outcome = handle.apply_with_outcome(handle.builder(HASTE)).unwrap();

    registry.reconcile(TICK);
    assert_eq!(outcome.try_recv(), Ok(ApplyOutcome::RejectedCapacity { bit: 0 }));
}

#[test]
fn test_removal_frees_slot_in_same_batch() {
    let mut registry = make_registry();
    let might = apply(&registry, MIGHT);
    registry.reconcile(TICK);

    registry.remove(might);
    let haste = apply(&registry, HASTE);
    let report = registry.reconcile(TICK);

    assert_eq!(report.removed, 1);
    assert_eq!(report.admitted, 1);
    assert!(registry.effects().contains_token(haste));
}

#[test]
fn test_expired_effect_frees_slot_next_tick() {
    let mut registry = make_registry();
    let haste = apply(&registry, HASTE);

    // Admitted at t=0, expires at t=1000
    for _ in 0..10 {
        registry.reconcile(TICK);
    }
    assert!(registry.effects().contains_token(haste));
    assert!(registry.effects().by_token(haste).unwrap().has_expired(registry.now()));

    let might = apply(&registry, MIGHT);
    let report = registry.reconcile(TICK);
    assert_eq!(report.removed, 1);
    assert_eq!(report.admitted, 1);

    let snapshot = registry.effects();
    assert!(!snapshot.contains_token(haste));
    assert!(snapshot.contains_token(might));
}

#[test]
fn test_stacking_category_caps_at_max_level() {
    let mut registry = make_registry();
    for _ in 0..5 {
        apply(&registry, POISON);
    }
    let report = registry.reconcile(TICK);

    assert_eq!(report.admitted, 3);
    assert_eq!(report.rejected, 2);
    assert_eq!(count_in(&registry, EffectCategory::bit(1)), 3);
}

#[test]
fn test_concurrent_applications_respect_cap() {
    let mut registry = make_registry();
    let handle = registry.handle();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let handle = handle.clone();
            scope.spawn(move || {
                for _ in 0..25 {
                    handle.apply(handle.builder(POISON)).unwrap();
                    handle.apply(handle.builder(HASTE)).unwrap();
                }
            });
        }
    });

    let report = registry.reconcile(TICK);
    assert_eq!(report.admitted, 4);
    assert_eq!(report.rejected, 396);
    assert_eq!(count_in(&registry, EffectCategory::bit(0)), 1);
    assert_eq!(count_in(&registry, EffectCategory::bit(1)), 3);
}

#[derive(Debug, Clone)]
enum Op {
    Apply(EffectType),
    RemoveNth(usize),
    Reconcile,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => prop_oneof![Just(HASTE), Just(MIGHT), Just(POISON), Just(BLESSING)].prop_map(Op::Apply),
        1 => (0usize..8).prop_map(Op::RemoveNth),
        2 => Just(Op::Reconcile),
    ]
}

proptest! {
    #[test]
    fn test_caps_hold_after_every_reconcile(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut registry = make_registry();
        let mut tokens = Vec::new();

        for op in ops {
            match op {
                Op::Apply(effect_type) => tokens.push(apply(&registry, effect_type)),
                Op::RemoveNth(n) => {
                    if !tokens.is_empty() {
                        registry.remove(tokens[n % tokens.len()]);
                    }
                }
                Op::Reconcile => {
                    registry.reconcile(TICK);
                    prop_assert!(count_in(&registry, EffectCategory::bit(0)) <= 1);
                    prop_assert!(count_in(&registry, EffectCategory::bit(1)) <= 3);
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Refresh, removal and toggles
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_same_token_refreshes_timer() {
    let mut registry = make_registry();
    let handle = registry.handle();
    let token = apply(&registry, HASTE);
    registry.reconcile(TICK);
    registry.reconcile(TICK);
    let original = registry.effects().by_token(token).unwrap().id;

    // Reapplied at t=200 with a different duration
    let outcome = handle
        .apply_with_outcome(
            handle
                .builder(HASTE)
                .with_token(token)
                .with_duration(Duration::from_millis(2500)),
        )
        .unwrap();
    registry.reconcile(TICK);

    assert_eq!(outcome.try_recv(), Ok(ApplyOutcome::Refreshed(original)));
    let snapshot = registry.effects();
    assert_eq!(snapshot.len(), 1);
    let effect = snapshot.by_token(token).unwrap();
    assert_eq!(effect.id, original);
    assert_eq!(effect.duration, Some(Duration::from_millis(2500)));
    assert_eq!(effect.expires_at, Some(SimTime(2700)));
}

#[test]
fn test_refresh_does_not_count_against_cap() {
    let mut registry = make_registry();
    let handle = registry.handle();
    let token = apply(&registry, HASTE);
    registry.reconcile(TICK);

    handle.apply(handle.builder(HASTE).with_token(token)).unwrap();
    let report = registry.reconcile(TICK);
    assert_eq!(report.refreshed, 1);
    assert_eq!(report.rejected, 0);
}

#[test]
fn test_unbounded_duration_is_admitted_and_never_expires() {
    let mut registry = make_registry();
    let handle = registry.handle();
    let token = handle
        .apply(
            handle
                .builder(MIGHT)
                .with_duration(Duration::MAX)
                .with_duration_modifier(1e300)
                .with_duration_modifier(1e300),
        )
        .unwrap();

    let report = registry.reconcile(TICK);
    assert_eq!(report.admitted, 1);
    let effect = registry.effects().by_token(token).cloned().unwrap();
    assert_eq!(effect.duration, Some(Duration::MAX));
    assert_eq!(effect.expires_at, Some(SimTime(u64::MAX)));

    for _ in 0..5 {
        registry.reconcile(TICK);
    }
    assert!(registry.effects().contains_token(token));
}

#[test]
fn test_remove_before_reconcile_cancels_application() {
    let mut registry = make_registry();
    let handle = registry.handle();
    let builder = handle.builder(MIGHT);
    let token = EffectToken::mint();
    let outcome = handle.apply_with_outcome(builder.with_token(token)).unwrap();
    handle.remove(token);

    let report = registry.reconcile(TICK);
    assert_eq!(outcome.try_recv(), Ok(ApplyOutcome::Cancelled));
    assert_eq!(report.admitted, 0);
    assert!(!report.published);
    assert!(registry.effects().is_empty());
}

#[test]
fn test_apply_after_remove_in_same_batch_survives() {
    let mut registry = make_registry();
    let handle = registry.handle();
    let token = EffectToken::mint();
    handle.remove(token);
    handle.apply(handle.builder(MIGHT).with_token(token)).unwrap();

    registry.reconcile(TICK);
    assert!(registry.effects().contains_token(token));
}

#[test]
fn test_remove_by_instance_and_stale_removal() {
    let mut registry = make_registry();
    let token = apply(&registry, BLESSING);
    registry.reconcile(TICK);
    let id = registry.effects().by_token(token).unwrap().id;

    registry.remove(RemovalTarget::Instance(id));
    let report = registry.reconcile(TICK);
    assert_eq!(report.removed, 1);
    assert!(registry.effects().is_empty());

    // Same target again: nothing left to remove
    registry.remove(id);
    let report = registry.reconcile(TICK);
    assert_eq!(report.removed, 0);
    assert!(!report.published);
}

#[test]
fn test_set_enabled_suspends_modifiers() {
    let mut registry = make_registry();
    let handle = registry.handle();
    let token = apply(&registry, BLESSING);
    registry.reconcile(TICK);

    handle.set_enabled(token, false);
    let report = registry.reconcile(TICK);
    assert!(report.published);
    assert_eq!(report.touched_fields.len(), 2);
    let effect = registry.effects().by_token(token).unwrap().clone();
    assert!(!effect.modifiers_enabled);
    assert_eq!(effect.active_fields().count(), 0);

    // Toggling to the current state is a no-op
    handle.set_enabled(token, false);
    assert!(!registry.reconcile(TICK).published);

    handle.set_enabled(token, true);
    registry.reconcile(TICK);
    assert!(registry.effects().by_token(token).unwrap().modifiers_enabled);
}

#[test]
fn test_propagated_child_is_never_refreshed() {
    let catalog = make_catalog();
    let mut registry = EffectRegistry::new(UnitId(2), catalog.clone());
    let handle = registry.handle();

    let mut master = EffectBuilder::new(catalog.clone())
        .set_type(BEACON)
        .set_owner(UnitId(1))
        .build()
        .unwrap();
    master.activate(SimTime::ZERO);
    let spec = *master.aura().unwrap();
    assert_eq!(spec.propagated_type, BEACON_CHILD);

    let first = handle
        .apply_with_outcome(EffectBuilder::propagated(catalog.clone(), &master, &spec, UnitId(2)))
        .unwrap();
    let second = handle
        .apply_with_outcome(EffectBuilder::propagated(catalog, &master, &spec, UnitId(2)))
        .unwrap();
    registry.reconcile(TICK);

    let Ok(ApplyOutcome::Admitted(child)) = first.try_recv() else {
        panic!("first child should be admitted");
    };
    assert_eq!(second.try_recv(), Ok(ApplyOutcome::DuplicateAura(child)));

    let snapshot = registry.effects();
    assert_eq!(snapshot.len(), 1);
    let child = snapshot.get(child).unwrap();
    assert!(child.is_propagated());
    assert!(child.is_permanent());
    assert_eq!(child.source, Some(UnitId(1)));
    assert_eq!(child.token, master.token);
}

// ═══════════════════════════════════════════════════════════════════════════
// Notifications and snapshots
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_notifications_follow_processing_order() {
    let mut registry = make_registry();
    let (sink, changes) = ChannelSink::bounded(16);
    registry.add_sink(Arc::new(sink));

    let might = apply(&registry, MIGHT);
    registry.reconcile(TICK);
    registry.remove(might);
    apply(&registry, HASTE);
    registry.reconcile(TICK);

    let received: Vec<_> = changes.try_iter().collect();
    assert_eq!(received.len(), 3);
    assert!(received[0].applied);
    assert_eq!(received[0].effect_type, MIGHT);
    assert_eq!(received[0].remaining_ms, None);
    assert!(!received[1].applied);
    assert_eq!(received[1].effect_type, MIGHT);
    assert!(received[2].applied);
    assert_eq!(received[2].effect_type, HASTE);
    assert_eq!(received[2].remaining_ms, Some(1000));
    assert_eq!(received[2].modifiers.len(), 1);
}

#[test]
fn test_old_snapshot_is_untouched_by_later_changes() {
    let mut registry = make_registry();
    let token = apply(&registry, BLESSING);
    registry.reconcile(TICK);
    let before = registry.effects();

    registry.handle().set_enabled(token, false);
    registry.remove(token);
    apply(&registry, MIGHT);
    registry.reconcile(TICK);

    assert_eq!(before.len(), 1);
    assert!(before.by_token(token).unwrap().modifiers_enabled);
    assert_eq!(registry.effects().version(), before.version() + 1);
}

#[test]
fn test_readers_never_observe_partial_reconcile() {
    let mut registry = make_registry();
    let handle = registry.handle();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let handle = handle.clone();
            let done = &done;
            scope.spawn(move || {
                let mut last_version = 0;
                while !done.load(Ordering::Acquire) {
                    let snapshot = handle.effects();
                    assert!(snapshot.version() >= last_version);
                    last_version = snapshot.version();

                    // Blessings are applied and removed in pairs per batch
                    let blessings = snapshot.iter().filter(|e| e.effect_type == BLESSING).count();
                    assert_eq!(blessings % 2, 0);
                    for effect in snapshot.iter() {
                        assert_eq!(effect.state, EffectState::Active);
                        if effect.effect_type == BLESSING {
                            assert_eq!(effect.modifiers.len(), 2);
                        }
                    }
                }
            });
        }

        let mut live: Vec<EffectToken> = Vec::new();
        for round in 0..300 {
            if round % 3 == 2 {
                for token in live.drain(..) {
                    handle.remove(token);
                }
            } else {
                live.push(handle.apply(handle.builder(BLESSING)).unwrap());
                live.push(handle.apply(handle.builder(BLESSING)).unwrap());
            }
            registry.reconcile(TICK);
        }
        done.store(true, Ordering::Release);
    });
}

#[test]
fn test_dropped_registry_discards_requests() {
    let registry = make_registry();
    let handle = registry.handle();
    drop(registry);

    assert!(handle.apply(handle.builder(MIGHT)).is_ok());
    handle.remove(EffectToken::mint());
    assert!(handle.effects().is_empty());
}

#[test]
fn test_equipment_style_override_merges_into_catalog_modifiers() {
    let mut registry = make_registry();
    let handle = registry.handle();
    let token = handle
        .apply(handle.builder(BLESSING).with_property_modifier(PropertyModifier::add(SPEED, 4.0)))
        .unwrap();
    registry.reconcile(TICK);

    let snapshot = registry.effects();
    let effect = snapshot.by_token(token).unwrap();
    assert_eq!(effect.modifiers.get(SPEED).map(|m| m.value), Some(5.0));
    assert_eq!(effect.modifiers.get(ARMOR).map(|m| m.value), Some(2.0));
}
