//! End-to-end tests for the record graph: resolution, links, removal and
//! notifications.
//!
//! Each test builds a small building model (zones, schedules, equipment)
//! and drives it through the public `Store` API only.

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use refgraph::{
    Catalog, ChangeEvent, ErrorKind, ExtensibleGroup, FieldDescriptor, Notification, RecordId,
    SourceLink, Store, StoreConfig, Strictness, TypeDescriptor, Value,
};

const ZONE_FIELD: usize = 1;

// ============================================================================
// Helpers
// ============================================================================

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::new()
            .with_type(TypeDescriptor::named("Zone").publishes("ZoneNames"))
            .unwrap()
            .with_type(TypeDescriptor::named("Schedule").publishes("ScheduleNames"))
            .unwrap()
            .with_type(
                TypeDescriptor::named("Equipment")
                    .field(FieldDescriptor::pointer("Zone", ["ZoneNames"]).required())
                    .field(FieldDescriptor::pointer("Availability", ["ScheduleNames"]))
                    .extensible(ExtensibleGroup::new(vec![FieldDescriptor::pointer(
                        "Served Zone",
                        ["ZoneNames"],
                    )])),
            )
            .unwrap(),
    )
}

fn store(level: Strictness) -> Store {
    Store::with_config(catalog(), StoreConfig::default().with_strictness(level))
}

fn record_notifications(store: &Store) -> Arc<Mutex<Vec<Notification>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe(move |n| sink.lock().unwrap().push(n.clone()));
    seen
}

// ============================================================================
// 1. Draft scenario: resolve, query sources, remove target
// ============================================================================

#[test]
fn test_draft_resolve_then_remove_target() {
    let mut store = store(Strictness::Draft);
    let a = store.add_record("Zone", ["Z1"]).unwrap();
    let b = store.add_record("Equipment", ["E1"]).unwrap();
    assert_eq!(store.get_target(b, ZONE_FIELD).unwrap(), None);

    store.set_named_field(b, ZONE_FIELD, "Z1").unwrap();
    assert_eq!(store.get_target(b, ZONE_FIELD).unwrap(), Some(a));
    assert_eq!(store.get_sources(a, None).unwrap(), vec![b]);

    let seen = record_notifications(&store);
    store.remove_record(a).unwrap();

    assert_eq!(store.get_target(b, ZONE_FIELD).unwrap(), None);
    let notes = seen.lock().unwrap();
    let for_b: Vec<_> = notes.iter().filter(|n| n.record == b).collect();
    assert_eq!(for_b.len(), 1);
    assert!(for_b[0].has(|e| matches!(
        e,
        ChangeEvent::RelationshipChanged { field: ZONE_FIELD, old_target: Some(t), new_target: None } if *t == a
    )));
}

// ============================================================================
// 2. Final scenario: required pointer missing on creation
// ============================================================================

#[test]
fn test_final_rejects_missing_required_pointer() {
    let mut store = store(Strictness::Final);
    store.add_record("Zone", ["Z1"]).unwrap();
    let before = store.len();

    let err = store.add_record("Equipment", ["E1", ""]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    assert_eq!(err.field(), Some(ZONE_FIELD));
    assert_eq!(store.len(), before);
}

// ============================================================================
// 3. Removal cleanup in both directions
// ============================================================================

#[test]
fn test_removal_cleans_both_directions() {
    let mut store = store(Strictness::Draft);
    let z1 = store.add_record("Zone", ["Z1"]).unwrap();
    let z2 = store.add_record("Zone", ["Z2"]).unwrap();
    let s = store.add_record("Schedule", ["Always"]).unwrap();
    let e = store.add_record("Equipment", ["E1", "Z1", "Always"]).unwrap();
    store.push_extensible_group(e, ["Z2"]).unwrap();

    store.remove_record(e).unwrap();
    for target in [z1, z2, s] {
        assert!(store.get_sources(target, None).unwrap().is_empty());
    }
    assert_eq!(store.forward_link_count(), 0);
    assert_eq!(store.reverse_link_count(), 0);
    assert!(store.links_consistent());
}

#[test]
fn test_self_reference_is_removed_cleanly() {
    let catalog = Catalog::new()
        .with_type(
            TypeDescriptor::named("Node")
                .publishes("Nodes")
                .field(FieldDescriptor::pointer("Next", ["Nodes"])),
        )
        .unwrap();
    let mut store = Store::new(Arc::new(catalog));
    let n = store.add_record("Node", ["N"]).unwrap();
    store.set_named_field(n, 1, "N").unwrap();
    assert_eq!(store.source_links(n).unwrap(), vec![SourceLink { source: n, field: 1 }]);

    store.remove_record(n).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.forward_link_count(), 0);
    assert_eq!(store.reverse_link_count(), 0);
}

// ============================================================================
// 4. Relinking moves the reverse entry
// ============================================================================

#[test]
fn test_relink_moves_source() {
    let mut store = store(Strictness::Draft);
    let z1 = store.add_record("Zone", ["Z1"]).unwrap();
    let z2 = store.add_record("Zone", ["Z2"]).unwrap();
    let e = store.add_record("Equipment", ["E1", "Z1"]).unwrap();
    let seen = record_notifications(&store);

    store.set_pointer_field(e, ZONE_FIELD, Some(z2)).unwrap();
    assert!(store.get_sources(z1, None).unwrap().is_empty());
    assert_eq!(store.get_sources(z2, None).unwrap(), vec![e]);

    let notes = seen.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].record, e);
    assert_eq!(
        notes[0].events,
        vec![
            ChangeEvent::RelationshipChanged { field: ZONE_FIELD, old_target: Some(z1), new_target: Some(z2) },
            ChangeEvent::Changed,
        ]
    );
}

// ============================================================================
// 5. Failed operations emit nothing and change nothing
// ============================================================================

#[test]
fn test_failed_operations_are_silent() {
    let mut store = store(Strictness::Draft);
    let z = store.add_record("Zone", ["Z1"]).unwrap();
    let s = store.add_record("Schedule", ["Always"]).unwrap();
    let e = store.add_record("Equipment", ["E1", "Z1"]).unwrap();
    let policy = store.order().clone();
    let before = store.export(&policy);
    let seen = record_notifications(&store);

    assert!(store.set_pointer_field(e, ZONE_FIELD, Some(s)).is_err());
    assert!(store.set_pointer_field(e, ZONE_FIELD, None).is_err());
    assert!(store.set_pointer_field(e, 0, Some(z)).is_err());
    assert!(store.set_named_field(e, ZONE_FIELD, "Always").is_err());
    assert!(store.set_name(s, "").is_err());
    assert!(store.remove_record(RecordId::new()).is_err());

    assert_eq!(store.export(&policy), before);
    assert!(seen.lock().unwrap().is_empty());
    assert!(store.links_consistent());
}

// ============================================================================
// 6. Handlers may unsubscribe themselves during dispatch
// ============================================================================

#[test]
fn test_handler_unsubscribes_itself() {
    let mut store = store(Strictness::Draft);
    let calls = Arc::new(Mutex::new(0));
    let id_slot = Arc::new(Mutex::new(None));

    let notifier = store.notifier().clone();
    let (calls_in, slot_in) = (calls.clone(), id_slot.clone());
    let id = store.subscribe(move |_| {
        *calls_in.lock().unwrap() += 1;
        if let Some(id) = *slot_in.lock().unwrap() {
            notifier.unsubscribe(id);
        }
    });
    *id_slot.lock().unwrap() = Some(id);

    store.add_record("Zone", ["Z1"]).unwrap();
    store.add_record("Zone", ["Z2"]).unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);
}

// ============================================================================
// 7. Data changes carry the touched fields
// ============================================================================

#[test]
fn test_data_change_lists_fields() {
    let catalog = Catalog::new()
        .with_type(
            TypeDescriptor::named("Material")
                .field(FieldDescriptor::real("Thickness"))
                .field(FieldDescriptor::real("Conductivity")),
        )
        .unwrap();
    let mut store = Store::new(Arc::new(catalog));
    let m = store.add_record("Material", ["Brick", "0.1", "0.9"]).unwrap();
    let seen = record_notifications(&store);

    store.set_field(m, 2, Some(Value::Real(0.7))).unwrap();
    store.set_field(m, 2, Some(Value::Real(0.7))).unwrap();

    let notes = seen.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].has(|e| matches!(e, ChangeEvent::DataChanged { fields } if fields.as_slice() == [2])));
}
