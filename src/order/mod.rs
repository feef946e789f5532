//! # Order Policy
//!
//! Deterministic ordering over record types or record identities, used for
//! export and any other place that needs a reproducible sequence. Sorting
//! never touches the store's own storage order.
//!
//! | Mode | Order |
//! |------|-------|
//! | `TypeRank` | Catalog rank of each record's type |
//! | `TypeList` | Position of the type in an explicit list |
//! | `IdentityList` | Position of the identity in an explicit list |
//!
//! In the explicit modes, anything not listed sorts after every listed
//! entry, in catalog order among themselves. All sorts are stable.

use std::cmp::Ordering;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::{Record, RecordId};
use crate::schema::SchemaCatalog;

// ============================================================================
// Traits
// ============================================================================

/// Anything that can be placed by an [`OrderPolicy`].
pub trait Orderable {
    fn record_id(&self) -> RecordId;
    fn type_name(&self) -> &str;
}

impl Orderable for Record {
    fn record_id(&self) -> RecordId { self.id() }
    fn type_name(&self) -> &str { Record::type_name(self) }
}

impl<T: Orderable + ?Sized> Orderable for &T {
    fn record_id(&self) -> RecordId { (**self).record_id() }
    fn type_name(&self) -> &str { (**self).type_name() }
}

/// Maps an identity to its record type, for sorting bare identities.
pub trait TypeLookup {
    fn type_of(&self, id: &RecordId) -> Option<&str>;
}

impl TypeLookup for HashMap<RecordId, String> {
    fn type_of(&self, id: &RecordId) -> Option<&str> {
        self.get(id).map(String::as_str)
    }
}

impl TypeLookup for std::collections::HashMap<RecordId, String> {
    fn type_of(&self, id: &RecordId) -> Option<&str> {
        self.get(id).map(String::as_str)
    }
}

// ============================================================================
// Modes and entries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderMode {
    TypeRank,
    TypeList,
    IdentityList,
}

/// An entry of an explicit order list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEntry {
    Type(String),
    Record(RecordId),
}

impl From<RecordId> for OrderEntry {
    fn from(id: RecordId) -> Self { OrderEntry::Record(id) }
}

impl From<&str> for OrderEntry {
    fn from(t: &str) -> Self { OrderEntry::Type(t.to_owned()) }
}

impl From<String> for OrderEntry {
    fn from(t: String) -> Self { OrderEntry::Type(t) }
}

#[derive(Debug, Clone, Default, PartialEq)]
enum Explicit {
    #[default]
    None,
    Types(Vec<String>),
    Records(Vec<RecordId>),
}

/// (tier, position): tier 0 is listed (or rank mode), tier 1 unlisted.
type SortKey = (u8, u64);

// ============================================================================
// OrderPolicy
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPolicy {
    /// lowercased type name → catalog rank
    ranks: HashMap<String, u32>,
    explicit: Explicit,
    type_pos: HashMap<String, usize>,
    record_pos: HashMap<RecordId, usize>,
}

impl OrderPolicy {
    /// Policy in `TypeRank` mode with the given catalog ranks.
    pub fn with_ranks<S: AsRef<str>>(ranks: impl IntoIterator<Item = (S, u32)>) -> Self {
        Self {
            ranks: ranks
                .into_iter()
                .map(|(t, r)| (t.as_ref().to_lowercase(), r))
                .collect(),
            ..Self::default()
        }
    }

    pub fn for_catalog(catalog: &dyn SchemaCatalog) -> Self {
        Self::with_ranks(
            catalog
                .type_names()
                .into_iter()
                .enumerate()
                .map(|(i, t)| (t, i as u32)),
        )
    }

    pub fn mode(&self) -> OrderMode {
        match self.explicit {
            Explicit::None => OrderMode::TypeRank,
            Explicit::Types(_) => OrderMode::TypeList,
            Explicit::Records(_) => OrderMode::IdentityList,
        }
    }

    pub fn use_type_rank(&mut self) {
        self.explicit = Explicit::None;
        self.reindex();
    }

    /// Switch to an explicit type list. Later duplicates are dropped.
    pub fn use_type_list<S: Into<String>>(&mut self, types: impl IntoIterator<Item = S>) {
        let mut list: Vec<String> = Vec::new();
        for t in types {
            let t = t.into();
            if !list.iter().any(|x| x.eq_ignore_ascii_case(&t)) {
                list.push(t);
            }
        }
        self.explicit = Explicit::Types(list);
        self.reindex();
    }

    /// Switch to an explicit identity list. Later duplicates are dropped.
    pub fn use_identity_list(&mut self, ids: impl IntoIterator<Item = RecordId>) {
        let mut list: Vec<RecordId> = Vec::new();
        for id in ids {
            if !list.contains(&id) {
                list.push(id);
            }
        }
        self.explicit = Explicit::Records(list);
        self.reindex();
    }

    pub fn type_list(&self) -> Option<&[String]> {
        match &self.explicit {
            Explicit::Types(list) => Some(list),
            _ => None,
        }
    }

    pub fn identity_list(&self) -> Option<&[RecordId]> {
        match &self.explicit {
            Explicit::Records(list) => Some(list),
            _ => None,
        }
    }

    fn reindex(&mut self) {
        self.type_pos.clear();
        self.record_pos.clear();
        match &self.explicit {
            Explicit::None => {}
            Explicit::Types(list) => {
                self.type_pos = list.iter().enumerate().map(|(i, t)| (t.to_lowercase(), i)).collect();
            }
            Explicit::Records(list) => {
                self.record_pos = list.iter().enumerate().map(|(i, id)| (*id, i)).collect();
            }
        }
    }

    // ========================================================================
    // Comparator
    // ========================================================================

    fn rank_of(&self, type_name: Option<&str>) -> u64 {
        type_name
            .and_then(|t| self.ranks.get(&t.to_lowercase()))
            .map_or(u64::MAX, |r| *r as u64)
    }

    fn key(&self, id: Option<RecordId>, type_name: Option<&str>) -> SortKey {
        match &self.explicit {
            Explicit::None => (0, self.rank_of(type_name)),
            Explicit::Types(_) => match type_name.and_then(|t| self.type_pos.get(&t.to_lowercase())) {
                Some(pos) => (0, *pos as u64),
                None => (1, self.rank_of(type_name)),
            },
            Explicit::Records(_) => match id.and_then(|id| self.record_pos.get(&id)) {
                Some(pos) => (0, *pos as u64),
                None => (1, self.rank_of(type_name)),
            },
        }
    }

    fn key_of<T: Orderable + ?Sized>(&self, item: &T) -> SortKey {
        self.key(Some(item.record_id()), Some(item.type_name()))
    }

    pub fn compare<T: Orderable + ?Sized>(&self, a: &T, b: &T) -> Ordering {
        self.key_of(a).cmp(&self.key_of(b))
    }

    pub fn less_than<T: Orderable + ?Sized>(&self, a: &T, b: &T) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Compare two types. In identity mode this is plain catalog order.
    pub fn type_less_than(&self, a: &str, b: &str) -> bool {
        self.key(None, Some(a)) < self.key(None, Some(b))
    }

    pub fn identity_less_than(&self, a: &RecordId, b: &RecordId, lookup: &impl TypeLookup) -> bool {
        self.key(Some(*a), lookup.type_of(a)) < self.key(Some(*b), lookup.type_of(b))
    }

    // ========================================================================
    // Sorting
    // ========================================================================

    pub fn sort_records<T: Orderable>(&self, mut items: Vec<T>) -> Vec<T> {
        items.sort_by_key(|item| self.key_of(item));
        items
    }

    pub fn sort_identities(&self, ids: &[RecordId], lookup: &impl TypeLookup) -> Vec<RecordId> {
        let mut out = ids.to_vec();
        out.sort_by_key(|id| self.key(Some(*id), lookup.type_of(id)));
        out
    }

    pub fn sort_types<S: AsRef<str>>(&self, mut types: Vec<S>) -> Vec<S> {
        types.sort_by_key(|t| self.key(None, Some(t.as_ref())));
        types
    }

    // ========================================================================
    // Explicit list mutators
    // ========================================================================

    fn edit<R>(
        &mut self,
        on_types: impl FnOnce(&mut Vec<String>) -> Option<R>,
        on_records: impl FnOnce(&mut Vec<RecordId>) -> Option<R>,
    ) -> Option<R> {
        let out = match &mut self.explicit {
            Explicit::None => None,
            Explicit::Types(list) => on_types(list),
            Explicit::Records(list) => on_records(list),
        };
        if out.is_some() {
            self.reindex();
        }
        out
    }

    /// Append an unlisted entry.
    pub fn push_back(&mut self, entry: impl Into<OrderEntry>) -> bool {
        let entry = entry.into();
        self.edit(
            |list| match &entry {
                OrderEntry::Type(t) => list_push(list, t.clone(), type_eq),
                _ => None,
            },
            |list| match &entry {
                OrderEntry::Record(id) => list_push(list, *id, id_eq),
                _ => None,
            },
        )
        .is_some()
    }

    /// Place `entry` immediately before the listed entry `before`. A listed
    /// `entry` is moved; an unlisted one is inserted.
    pub fn insert_before(&mut self, entry: impl Into<OrderEntry>, before: impl Into<OrderEntry>) -> bool {
        let (entry, before) = (entry.into(), before.into());
        self.edit(
            |list| match (&entry, &before) {
                (OrderEntry::Type(t), OrderEntry::Type(b)) => list_insert_before(list, t.clone(), b, type_eq),
                _ => None,
            },
            |list| match (&entry, &before) {
                (OrderEntry::Record(id), OrderEntry::Record(b)) => {
                    list_insert_before(list, *id, b, id_eq)
                }
                _ => None,
            },
        )
        .is_some()
    }

    /// Move a listed entry to `index` (which must be a valid position).
    pub fn move_to(&mut self, entry: impl Into<OrderEntry>, index: usize) -> bool {
        let entry = entry.into();
        self.edit(
            |list| match &entry {
                OrderEntry::Type(t) => list_move(list, t, index, type_eq),
                _ => None,
            },
            |list| match &entry {
                OrderEntry::Record(id) => list_move(list, id, index, id_eq),
                _ => None,
            },
        )
        .is_some()
    }

    /// Swap two listed entries.
    pub fn swap(&mut self, a: impl Into<OrderEntry>, b: impl Into<OrderEntry>) -> bool {
        let (a, b) = (a.into(), b.into());
        self.edit(
            |list| match (&a, &b) {
                (OrderEntry::Type(x), OrderEntry::Type(y)) => list_swap(list, x, y, type_eq),
                _ => None,
            },
            |list| match (&a, &b) {
                (OrderEntry::Record(x), OrderEntry::Record(y)) => list_swap(list, x, y, id_eq),
                _ => None,
            },
        )
        .is_some()
    }

    /// Remove a listed entry.
    pub fn erase(&mut self, entry: impl Into<OrderEntry>) -> bool {
        let entry = entry.into();
        self.edit(
            |list| match &entry {
                OrderEntry::Type(t) => list_erase(list, t, type_eq),
                _ => None,
            },
            |list| match &entry {
                OrderEntry::Record(id) => list_erase(list, id, id_eq),
                _ => None,
            },
        )
        .is_some()
    }
}

fn type_eq(a: &String, b: &String) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn id_eq(a: &RecordId, b: &RecordId) -> bool {
    a == b
}

fn list_push<T>(list: &mut Vec<T>, item: T, eq: impl Fn(&T, &T) -> bool) -> Option<()> {
    if list.iter().any(|x| eq(x, &item)) {
        return None;
    }
    list.push(item);
    Some(())
}

fn list_insert_before<T>(list: &mut Vec<T>, item: T, before: &T, eq: impl Fn(&T, &T) -> bool) -> Option<()> {
    if eq(&item, before) || !list.iter().any(|x| eq(x, before)) {
        return None;
    }
    if let Some(pos) = list.iter().position(|x| eq(x, &item)) {
        list.remove(pos);
    }
    let pos = list.iter().position(|x| eq(x, before))?;
    list.insert(pos, item);
    Some(())
}

fn list_move<T>(list: &mut Vec<T>, item: &T, index: usize, eq: impl Fn(&T, &T) -> bool) -> Option<()> {
    if index >= list.len() {
        return None;
    }
    let pos = list.iter().position(|x| eq(x, item))?;
    let moved = list.remove(pos);
    list.insert(index, moved);
    Some(())
}

fn list_swap<T>(list: &mut [T], a: &T, b: &T, eq: impl Fn(&T, &T) -> bool) -> Option<()> {
    let i = list.iter().position(|x| eq(x, a))?;
    let j = list.iter().position(|x| eq(x, b))?;
    list.swap(i, j);
    Some(())
}

fn list_erase<T>(list: &mut Vec<T>, item: &T, eq: impl Fn(&T, &T) -> bool) -> Option<()> {
    let pos = list.iter().position(|x| eq(x, item))?;
    list.remove(pos);
    Some(())
}
