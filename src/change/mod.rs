//! # Change Log
//!
//! Diff entries accumulate per record while a store operation runs. When the
//! operation succeeds the log is drained into one [`Notification`] per
//! touched record; when it fails the log is discarded.

pub mod notifier;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::Serialize;
use smallvec::SmallVec;

use crate::model::{RecordId, Value};

pub use notifier::{Notifier, SubscriptionId};

/// What kind of field a diff touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiffKind {
    Name,
    Pointer,
    Data,
}

/// A single field-level change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub field: usize,
    pub kind: DiffKind,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub old_target: Option<RecordId>,
    pub new_target: Option<RecordId>,
}

impl DiffEntry {
    pub fn data(field: usize, old: Option<Value>, new: Option<Value>) -> Self {
        Self { field, kind: DiffKind::Data, old, new, old_target: None, new_target: None }
    }

    pub fn name(old: Option<Value>, new: Option<Value>) -> Self {
        Self { field: 0, kind: DiffKind::Name, old, new, old_target: None, new_target: None }
    }

    pub fn pointer(field: usize, old_target: Option<RecordId>, new_target: Option<RecordId>) -> Self {
        Self {
            field,
            kind: DiffKind::Pointer,
            old: old_target.map(Value::Ref),
            new: new_target.map(Value::Ref),
            old_target,
            new_target,
        }
    }
}

/// Classified event carried by a [`Notification`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChangeEvent {
    Added,
    NameChanged { old: Option<String>, new: Option<String> },
    RelationshipChanged {
        field: usize,
        old_target: Option<RecordId>,
        new_target: Option<RecordId>,
    },
    DataChanged { fields: SmallVec<[usize; 4]> },
    Removed,
    /// Always last, exactly once per notification.
    Changed,
}

/// Batched notification for one record and one store operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub record: RecordId,
    pub type_name: String,
    pub events: Vec<ChangeEvent>,
    pub diffs: Vec<DiffEntry>,
    pub emitted_at: DateTime<Utc>,
}

impl Notification {
    pub fn has(&self, pred: impl Fn(&ChangeEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }

    pub fn is_name_change(&self) -> bool {
        self.has(|e| matches!(e, ChangeEvent::NameChanged { .. }))
    }

    pub fn is_relationship_change(&self) -> bool {
        self.has(|e| matches!(e, ChangeEvent::RelationshipChanged { .. }))
    }

    pub fn is_data_change(&self) -> bool {
        self.has(|e| matches!(e, ChangeEvent::DataChanged { .. }))
    }
}

// ============================================================================
// Pending buffers
// ============================================================================

/// Everything that happened to one record during the current operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordChanges {
    pub type_name: String,
    pub added: bool,
    pub removed: bool,
    pub diffs: Vec<DiffEntry>,
}

impl RecordChanges {
    pub fn is_empty(&self) -> bool {
        !self.added && !self.removed && self.diffs.is_empty()
    }

    /// Classify into events: `Added`, `NameChanged`, one
    /// `RelationshipChanged` per pointer diff, `DataChanged`, `Removed`,
    /// then `Changed`.
    pub fn classify(&self) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        if self.added {
            events.push(ChangeEvent::Added);
        }

        let names: Vec<&DiffEntry> = self.diffs.iter().filter(|d| d.kind == DiffKind::Name).collect();
        if let (Some(first), Some(last)) = (names.first(), names.last()) {
            events.push(ChangeEvent::NameChanged {
                old: first.old.as_ref().map(ToString::to_string),
                new: last.new.as_ref().map(ToString::to_string),
            });
        }

        for diff in self.diffs.iter().filter(|d| d.kind == DiffKind::Pointer) {
            events.push(ChangeEvent::RelationshipChanged {
                field: diff.field,
                old_target: diff.old_target,
                new_target: diff.new_target,
            });
        }

        let mut fields: SmallVec<[usize; 4]> = self
            .diffs
            .iter()
            .filter(|d| d.kind == DiffKind::Data)
            .map(|d| d.field)
            .collect();
        fields.sort_unstable();
        fields.dedup();
        if !fields.is_empty() {
            events.push(ChangeEvent::DataChanged { fields });
        }

        if self.removed {
            events.push(ChangeEvent::Removed);
        }
        events.push(ChangeEvent::Changed);
        events
    }
}

/// Per-record diff buffers, kept in first-touch order.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    slots: HashMap<RecordId, usize>,
    pending: Vec<(RecordId, RecordChanges)>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, record: RecordId, type_name: &str) -> &mut RecordChanges {
        let slot = match self.slots.get(&record) {
            Some(&slot) => slot,
            None => {
                self.pending.push((record, RecordChanges {
                    type_name: type_name.to_owned(),
                    ..RecordChanges::default()
                }));
                self.slots.insert(record, self.pending.len() - 1);
                self.pending.len() - 1
            }
        };
        &mut self.pending[slot].1
    }

    pub fn record_diff(&mut self, record: RecordId, type_name: &str, diff: DiffEntry) {
        self.entry(record, type_name).diffs.push(diff);
    }

    pub fn record_added(&mut self, record: RecordId, type_name: &str) {
        self.entry(record, type_name).added = true;
    }

    pub fn record_removed(&mut self, record: RecordId, type_name: &str) {
        self.entry(record, type_name).removed = true;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.iter().all(|(_, c)| c.is_empty())
    }

    /// Discard everything (failure path).
    pub fn clear(&mut self) {
        self.slots.clear();
        self.pending.clear();
    }

    /// Take the buffers and turn each non-empty one into a notification.
    pub fn drain(&mut self) -> Vec<Notification> {
        self.slots.clear();
        let now = Utc::now();
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter(|(_, changes)| !changes.is_empty())
            .map(|(record, changes)| Notification {
                record,
                events: changes.classify(),
                type_name: changes.type_name,
                diffs: changes.diffs,
                emitted_at: now,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_orders_events() {
        let target = RecordId::new();
        let changes = RecordChanges {
            type_name: "Equipment".into(),
            added: false,
            removed: false,
            diffs: vec![
                DiffEntry::data(3, None, Some(Value::Real(1.0))),
                DiffEntry::pointer(1, None, Some(target)),
                DiffEntry::name(Some("E1".into()), Some("E2".into())),
                DiffEntry::data(3, Some(Value::Real(1.0)), Some(Value::Real(2.0))),
            ],
        };
        let events = changes.classify();
        assert_eq!(events, vec![
            ChangeEvent::NameChanged { old: Some("E1".into()), new: Some("E2".into()) },
            ChangeEvent::RelationshipChanged { field: 1, old_target: None, new_target: Some(target) },
            ChangeEvent::DataChanged { fields: smallvec::smallvec![3] },
            ChangeEvent::Changed,
        ]);
    }

    #[test]
    fn test_drain_groups_by_record_in_touch_order() {
        let a = RecordId::new();
        let b = RecordId::new();
        let mut log = ChangeLog::new();
        log.record_diff(b, "Zone", DiffEntry::data(1, None, Some(Value::Int(1))));
        log.record_diff(a, "Zone", DiffEntry::data(1, None, Some(Value::Int(1))));
        log.record_diff(b, "Zone", DiffEntry::data(2, None, Some(Value::Int(2))));

        let notes = log.drain();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].record, b);
        assert_eq!(notes[0].diffs.len(), 2);
        assert_eq!(notes[1].record, a);
        assert!(log.is_empty());
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_clear_discards_pending() {
        let mut log = ChangeLog::new();
        log.record_added(RecordId::new(), "Zone");
        log.clear();
        assert!(log.drain().is_empty());
    }
}
