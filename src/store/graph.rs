//! Record arena plus the incrementally maintained lookup tables.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};

use super::links::LinkIndex;
use super::names::NameIndex;
use crate::model::{Record, RecordId};

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    record: Record,
    /// Creation sequence number, used for storage order and tie-breaks.
    seq: u64,
}

/// Everything that must roll back together on a failed batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Graph {
    records: HashMap<RecordId, Slot>,
    storage_order: BTreeMap<u64, RecordId>,
    next_seq: u64,
    /// lowercased type name → record IDs (type index)
    by_type: HashMap<String, HashSet<RecordId>>,
    pub names: NameIndex,
    pub links: LinkIndex,
}

impl Graph {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id).map(|s| &s.record)
    }

    /// Mutable access to a record. Callers changing the name field must
    /// go through [`Graph::rename`] as well.
    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.records.get_mut(&id).map(|s| &mut s.record)
    }

    pub fn seq(&self, id: RecordId) -> Option<u64> {
        self.records.get(&id).map(|s| s.seq)
    }

    pub fn insert(&mut self, record: Record) {
        let id = record.id();
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(name) = record.name() {
            self.names.insert(name, id);
        }
        self.by_type
            .entry(record.type_name().to_lowercase())
            .or_default()
            .insert(id);
        self.storage_order.insert(seq, id);
        self.records.insert(id, Slot { record, seq });
    }

    /// Unregister a record from every table except the link index, which
    /// the caller must have emptied for it already.
    pub fn remove(&mut self, id: RecordId) -> Option<Record> {
        let slot = self.records.remove(&id)?;
        self.storage_order.remove(&slot.seq);
        if let Some(name) = slot.record.name() {
            self.names.remove(name, id);
        }
        let type_key = slot.record.type_name().to_lowercase();
        if let Some(ids) = self.by_type.get_mut(&type_key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_type.remove(&type_key);
            }
        }
        Some(slot.record)
    }

    pub fn rename(&mut self, id: RecordId, old: Option<&str>, new: Option<&str>) {
        if let Some(old) = old {
            self.names.remove(old, id);
        }
        if let Some(new) = new {
            self.names.insert(new, id);
        }
    }

    /// Records in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.storage_order.values().filter_map(|id| self.get(*id))
    }

    pub fn sort_by_seq(&self, ids: &mut [RecordId]) {
        ids.sort_by_key(|id| self.seq(*id).unwrap_or(u64::MAX));
    }

    pub fn ids_of_type(&self, type_name: &str) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self
            .by_type
            .get(&type_name.to_lowercase())
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        self.sort_by_seq(&mut ids);
        ids
    }

    /// Records currently named `name` (case-insensitive), in creation order.
    pub fn named(&self, name: &str) -> Vec<RecordId> {
        let mut ids = self.names.get(name).to_vec();
        self.sort_by_seq(&mut ids);
        ids
    }
}
