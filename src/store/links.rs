//! Forward/reverse pointer index.
//!
//! Every live pointer `(source, field) -> target` has exactly one forward
//! entry under `source` and one reverse entry under `target`. All mutation
//! goes through [`LinkIndex::link`] and [`LinkIndex::unlink`], which update
//! both sides together.

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::RecordId;

/// Incoming half of a pointer: which record, through which field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLink {
    pub source: RecordId,
    pub field: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LinkIndex {
    /// source → (field, target), one entry per pointer field set.
    forward: HashMap<RecordId, SmallVec<[(usize, RecordId); 4]>>,
    /// target → incoming (source, field) pairs.
    reverse: HashMap<RecordId, HashSet<SourceLink>>,
}

impl LinkIndex {
    /// Point `source.field` at `target`, replacing any previous link on that
    /// field. Returns the previous target.
    pub fn link(&mut self, source: RecordId, field: usize, target: RecordId) -> Option<RecordId> {
        let old = self.unlink(source, field);
        self.forward.entry(source).or_default().push((field, target));
        self.reverse.entry(target).or_default().insert(SourceLink { source, field });
        old
    }

    /// Drop the link on `source.field`, if any. Returns the old target.
    pub fn unlink(&mut self, source: RecordId, field: usize) -> Option<RecordId> {
        let links = self.forward.get_mut(&source)?;
        let pos = links.iter().position(|(f, _)| *f == field)?;
        let (_, target) = links.swap_remove(pos);
        if links.is_empty() {
            self.forward.remove(&source);
        }
        if let Some(sources) = self.reverse.get_mut(&target) {
            sources.remove(&SourceLink { source, field });
            if sources.is_empty() {
                self.reverse.remove(&target);
            }
        }
        Some(target)
    }

    pub fn target(&self, source: RecordId, field: usize) -> Option<RecordId> {
        self.forward
            .get(&source)?
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, t)| *t)
    }

    /// Outgoing links of `source`, sorted by field.
    pub fn targets(&self, source: RecordId) -> Vec<(usize, RecordId)> {
        let mut out: Vec<_> = self.forward.get(&source).map(|l| l.to_vec()).unwrap_or_default();
        out.sort_unstable_by_key(|(f, _)| *f);
        out
    }

    pub fn sources(&self, target: RecordId) -> impl Iterator<Item = SourceLink> + '_ {
        self.reverse.get(&target).into_iter().flat_map(|s| s.iter().copied())
    }

    pub fn has_sources(&self, target: RecordId) -> bool {
        self.reverse.contains_key(&target)
    }

    pub fn forward_count(&self) -> usize {
        self.forward.values().map(SmallVec::len).sum()
    }

    pub fn reverse_count(&self) -> usize {
        self.reverse.values().map(HashSet::len).sum()
    }

    /// Check that both halves mirror each other exactly.
    pub fn is_consistent(&self) -> bool {
        let forward_ok = self.forward.iter().all(|(source, links)| {
            links.iter().all(|(field, target)| {
                self.reverse
                    .get(target)
                    .is_some_and(|s| s.contains(&SourceLink { source: *source, field: *field }))
            })
        });
        let reverse_ok = self.reverse.iter().all(|(target, sources)| {
            sources.iter().all(|s| self.target(s.source, s.field) == Some(*target))
        });
        forward_ok && reverse_ok && self.forward_count() == self.reverse_count()
    }
}
