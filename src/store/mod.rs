//! # Store
//!
//! The authoritative record graph. Every pointer-aware mutation goes
//! through here so that forward and reverse links, the name index and the
//! change log stay in step.
//!
//! Each mutating method follows the same shape: validate against the
//! current state without touching it, then apply, then emit the batched
//! notifications. A method that returns `Err` has changed nothing.
//!
//! ## Strictness
//!
//! | Check | None | Draft | Final |
//! |-------|------|-------|-------|
//! | Required pointer set to null | allowed | rejected | rejected |
//! | Target outside reference lists | warning | rejected | rejected |
//! | Scalar fails to parse | stored as text | rejected | rejected |
//! | Rename onto a competing name | auto-suffixed | rejected | rejected |
//! | Duplicate name on creation | warning | warning | rejected |
//! | Required fields on creation | - | - | enforced |
//! | Pop below minimum field count | - | - | rejected |

pub mod config;
mod graph;
mod links;
mod names;
mod report;
mod validate;

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::change::{ChangeLog, DiffEntry, Notification, Notifier, SubscriptionId};
use crate::model::{Record, RecordId, Value};
use crate::order::{OrderPolicy, TypeLookup};
use crate::schema::{FieldDescriptor, SchemaCatalog, TypeDescriptor};
use crate::{Error, Result};

pub use config::{StoreConfig, Strictness};
pub use links::SourceLink;
pub use report::{Issue, IssueKind, ValidityReport, Warning, WarningKind};

pub(crate) use graph::Graph;

/// Outcome of resolving a pointer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Target { id: RecordId, compatible: bool },
    Unresolved { candidates: usize },
}

/// A freshly built, not yet registered record.
pub(crate) struct Built {
    pub record: Record,
    /// Pointer fields still holding a name: (field, name).
    pub pending: Vec<(usize, String)>,
    pub warnings: Vec<Warning>,
}

/// In-memory record graph.
pub struct Store {
    catalog: Arc<dyn SchemaCatalog>,
    config: StoreConfig,
    pub(crate) graph: Graph,
    pub(crate) order: OrderPolicy,
    pub(crate) changes: ChangeLog,
    notifier: Notifier,
    warnings: Vec<Warning>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("records", &self.graph.len())
            .field("strictness", &self.config.strictness)
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl TypeLookup for Store {
    fn type_of(&self, id: &RecordId) -> Option<&str> {
        self.graph.get(*id).map(Record::type_name)
    }
}

impl Store {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self::with_config(catalog, StoreConfig::default())
    }

    pub fn with_config(catalog: Arc<dyn SchemaCatalog>, config: StoreConfig) -> Self {
        let order = OrderPolicy::for_catalog(catalog.as_ref());
        Self {
            catalog,
            config,
            graph: Graph::default(),
            order,
            changes: ChangeLog::new(),
            notifier: Notifier::new(),
            warnings: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn strictness(&self) -> Strictness {
        self.config.strictness
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.notifier.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Soft conditions accumulated since the last [`Store::take_warnings`].
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// The store's own order policy. In identity mode, new records are
    /// appended to its list and removed records erased from it.
    pub fn order(&self) -> &OrderPolicy {
        &self.order
    }

    pub fn order_mut(&mut self) -> &mut OrderPolicy {
        &mut self.order
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.len() == 0
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.graph.contains(id)
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.graph.get(id)
    }

    /// Records in creation order.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.graph.iter()
    }

    /// Identities in creation order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.graph.iter().map(Record::id).collect()
    }

    /// Identities sorted by the store's own order policy.
    pub fn sorted_ids(&self) -> Vec<RecordId> {
        self.order.sort_identities(&self.ids(), self)
    }

    pub fn records_of_type(&self, type_name: &str) -> Vec<RecordId> {
        self.graph.ids_of_type(type_name)
    }

    /// Every record named `name` (case-insensitive), in creation order.
    pub fn find_by_name(&self, name: &str) -> Vec<RecordId> {
        self.graph.named(name)
    }

    pub fn find_by_type_and_name(&self, type_name: &str, name: &str) -> Option<RecordId> {
        self.graph
            .named(name)
            .into_iter()
            .find(|id| self.type_of(id).is_some_and(|t| t.eq_ignore_ascii_case(type_name)))
    }

    pub(crate) fn record(&self, id: RecordId) -> Result<&Record> {
        self.graph.get(id).ok_or(Error::NotFound(id))
    }

    fn pointer_descriptor<'a>(&self, record: &'a Record, field: usize) -> Result<&'a FieldDescriptor> {
        let desc = record.schema().field_at(field).ok_or_else(|| Error::OutOfRange {
            type_name: record.type_name().to_owned(),
            index: field,
            len: record.len(),
        })?;
        if !desc.is_pointer() {
            return Err(Error::NotAPointerField { record: record.id(), field });
        }
        Ok(desc)
    }

    /// Current target of a pointer field.
    pub fn get_target(&self, id: RecordId, field: usize) -> Result<Option<RecordId>> {
        let record = self.record(id)?;
        self.pointer_descriptor(record, field)?;
        Ok(self.graph.links.target(id, field))
    }

    /// Outgoing links of a record as (field, target), sorted by field.
    pub fn targets(&self, id: RecordId) -> Result<Vec<(usize, RecordId)>> {
        self.record(id)?;
        Ok(self.graph.links.targets(id))
    }

    /// Distinct records pointing at `id`, optionally only those of one type,
    /// in creation order.
    pub fn get_sources(&self, id: RecordId, type_filter: Option<&str>) -> Result<Vec<RecordId>> {
        self.record(id)?;
        if !self.graph.links.has_sources(id) {
            return Ok(Vec::new());
        }
        let mut sources: Vec<RecordId> = self
            .graph
            .links
            .sources(id)
            .map(|link| link.source)
            .filter(|src| match type_filter {
                Some(t) => self.type_of(src).is_some_and(|st| st.eq_ignore_ascii_case(t)),
                None => true,
            })
            .collect();
        self.graph.sort_by_seq(&mut sources);
        sources.dedup();
        Ok(sources)
    }

    /// Every incoming (source, field) pair, in creation order of the source.
    pub fn source_links(&self, id: RecordId) -> Result<Vec<SourceLink>> {
        self.record(id)?;
        let mut links: Vec<SourceLink> = self.graph.links.sources(id).collect();
        links.sort_by_key(|l| (self.graph.seq(l.source).unwrap_or(u64::MAX), l.field));
        Ok(links)
    }

    pub fn forward_link_count(&self) -> usize {
        self.graph.links.forward_count()
    }

    pub fn reverse_link_count(&self) -> usize {
        self.graph.links.reverse_count()
    }

    /// Whether forward links, reverse links and stored `Ref` values all agree.
    pub fn links_consistent(&self) -> bool {
        if !self.graph.links.is_consistent() {
            return false;
        }
        let mut stored = 0;
        for record in self.graph.iter() {
            for (i, field) in record.fields().iter().enumerate() {
                if let Some(Value::Ref(target)) = &field.value {
                    stored += 1;
                    if self.graph.links.target(record.id(), i) != Some(*target) || !self.graph.contains(*target) {
                        return false;
                    }
                }
            }
        }
        stored == self.graph.links.forward_count()
    }

    /// Display text of a field: pointer fields render as the target's name.
    pub fn field_text(&self, id: RecordId, field: usize) -> Result<Option<String>> {
        let record = self.record(id)?;
        Ok(record.get(field)?.map(|v| self.render(v)))
    }

    pub(crate) fn render(&self, value: &Value) -> String {
        match value {
            Value::Ref(target) => match self.graph.get(*target) {
                Some(rec) => rec.name().map_or_else(|| target.to_string(), str::to_owned),
                None => target.to_string(),
            },
            other => other.to_string(),
        }
    }

    // ========================================================================
    // Resolution helpers
    // ========================================================================

    /// Resolve a pointer name for `desc`.
    ///
    /// Candidates are taken in creation order. The first one whose type
    /// publishes an accepted reference list wins; below Draft the first
    /// candidate of any type is accepted as a fallback. Text naming no
    /// record is tried as the identity of a stored record, which is how
    /// unnamed targets are exported.
    pub(crate) fn resolve(&self, desc: &FieldDescriptor, name: &str) -> Resolution {
        let mut candidates = self.graph.named(name);
        if candidates.is_empty() {
            candidates.extend(name.parse::<RecordId>().ok().filter(|id| self.graph.contains(*id)));
        }
        let qualifying = candidates.iter().find(|id| {
            self.graph
                .get(**id)
                .is_some_and(|r| desc.accepts(&r.schema().references))
        });
        match (qualifying, candidates.first()) {
            (Some(id), _) => Resolution::Target { id: *id, compatible: true },
            (None, Some(id)) if self.strictness() < Strictness::Draft => {
                Resolution::Target { id: *id, compatible: false }
            }
            _ => Resolution::Unresolved { candidates: candidates.len() },
        }
    }

    /// Soft resolution used on creation paths: unresolved names become null
    /// with a warning, unless the field is required under Final.
    pub(crate) fn resolve_soft(
        &self,
        record: &Record,
        field: usize,
        name: &str,
    ) -> Result<(Option<RecordId>, Option<Warning>)> {
        let desc = self.pointer_descriptor(record, field)?;
        match self.resolve(desc, name) {
            Resolution::Target { id, compatible: true } => Ok((Some(id), None)),
            Resolution::Target { id, compatible: false } => Ok((
                Some(id),
                Some(Warning::new(record.id(), Some(field), WarningKind::IncompatibleTarget { target: id })),
            )),
            Resolution::Unresolved { candidates } => {
                if desc.required && self.strictness() == Strictness::Final {
                    return Err(Error::UnresolvedReference {
                        record: None,
                        field,
                        name: name.to_owned(),
                        candidates,
                    });
                }
                Ok((
                    None,
                    Some(Warning::new(
                        record.id(),
                        Some(field),
                        WarningKind::UnresolvedReference { name: name.to_owned(), candidates },
                    )),
                ))
            }
        }
    }

    /// Check that `target` may be stored in `record.field`.
    fn check_target(&self, record: &Record, desc: &FieldDescriptor, field: usize, target: RecordId) -> Result<Option<Warning>> {
        let target_rec = self.graph.get(target).ok_or(Error::UnknownTarget {
            record: record.id(),
            field,
            target,
        })?;
        if desc.accepts(&target_rec.schema().references) {
            return Ok(None);
        }
        if self.strictness() >= Strictness::Draft {
            return Err(Error::TypeMismatch {
                record: record.id(),
                field,
                target,
                target_type: target_rec.type_name().to_owned(),
            });
        }
        Ok(Some(Warning::new(record.id(), Some(field), WarningKind::IncompatibleTarget { target })))
    }

    /// First other record, in creation order, that competes with `schema`
    /// for `name`.
    pub(crate) fn name_clash(&self, schema: &TypeDescriptor, name: &str, except: Option<RecordId>) -> Option<RecordId> {
        self.graph.named(name).into_iter().find(|id| {
            Some(*id) != except
                && self.graph.get(*id).is_some_and(|r| r.schema().shares_names_with(schema))
        })
    }

    fn unique_name(&self, schema: &TypeDescriptor, base: &str, except: RecordId) -> Option<String> {
        (1..=self.config.max_name_suffix)
            .map(|n| format!("{base}{}{n}", self.config.name_suffix_separator))
            .find(|candidate| self.name_clash(schema, candidate, Some(except)).is_none())
    }

    /// Parse scalar fields and collect pointer names, without touching the
    /// store.
    pub(crate) fn build_record(&self, id: RecordId, type_name: &str, raw: &[String]) -> Result<Built> {
        let schema = self
            .catalog
            .describe(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_owned()))?;
        schema.validate()?;
        let mut record = Record::new(id, schema.clone());
        if !raw.is_empty() {
            record.grow_to(raw.len() - 1)?;
        }

        let mut pending = Vec::new();
        let mut warnings = Vec::new();
        for (i, text) in raw.iter().enumerate() {
            let Some(desc) = schema.field_at(i) else { continue };
            if desc.is_pointer() {
                let name = text.trim();
                if !name.is_empty() {
                    pending.push((i, name.to_owned()));
                }
                continue;
            }
            match Value::parse(desc.kind, text) {
                None => {}
                Some(Ok(value)) => {
                    record.set(i, Some(value))?;
                }
                Some(Err(bad)) => {
                    if self.strictness() >= Strictness::Draft {
                        return Err(Error::SchemaViolation {
                            record: None,
                            field: Some(i),
                            message: format!("'{bad}' is not a valid {:?} value for {}", desc.kind, desc.name),
                        });
                    }
                    warnings.push(Warning::new(id, Some(i), WarningKind::InvalidValue { raw: bad.clone() }));
                    record.set(i, Some(Value::Text(bad)))?;
                }
            }
        }
        Ok(Built { record, pending, warnings })
    }

    /// Under Final, refuse records whose required fields are unset.
    pub(crate) fn check_required(&self, record: &Record, registered: bool) -> Result<()> {
        if self.strictness() < Strictness::Final {
            return Ok(());
        }
        match record.missing_required().first() {
            Some(&field) => Err(Error::SchemaViolation {
                record: registered.then(|| record.id()),
                field: Some(field),
                message: format!(
                    "required field '{}' of {} is empty",
                    record.schema().field_at(field).map_or("?", |d| d.name.as_str()),
                    record.type_name(),
                ),
            }),
            None => Ok(()),
        }
    }

    /// Under Final, a write past the end of `record` grows it by whole
    /// groups; every field the growth adds must still be satisfiable.
    fn check_growth(&self, record: &Record, field: usize, value: Option<Value>) -> Result<()> {
        if self.strictness() < Strictness::Final || field < record.len() {
            return Ok(());
        }
        let mut scratch = record.clone();
        scratch.grow_to(field)?;
        scratch.set(field, value)?;
        self.check_required(&scratch, true)
    }

    // ========================================================================
    // Commit plumbing
    // ========================================================================

    pub(crate) fn warn(&mut self, warning: Warning) {
        warn!(record = ?warning.record, field = ?warning.field, "{warning}");
        self.warnings.push(warning);
    }

    /// Drain the change log into notifications and deliver them.
    pub(crate) fn commit(&mut self) {
        for note in self.changes.drain() {
            trace!(record = %note.record, events = note.events.len(), "notify");
            self.notifier.emit(&note);
        }
    }

    fn apply_pointer(&mut self, id: RecordId, field: usize, target: Option<RecordId>) -> Result<()> {
        let type_name = {
            let record = self.graph.get_mut(id).ok_or(Error::NotFound(id))?;
            if target.is_some() || field < record.len() {
                record.grow_to(field)?;
                record.set(field, target.map(Value::Ref))?;
            }
            record.type_name().to_owned()
        };
        let old = match target {
            Some(t) => self.graph.links.link(id, field, t),
            None => self.graph.links.unlink(id, field),
        };
        if old != target {
            self.changes.record_diff(id, &type_name, DiffEntry::pointer(field, old, target));
        }
        Ok(())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a record from positional field text.
    ///
    /// Blank entries are absent fields. Pointer fields are resolved by name
    /// against existing records; see [`Store::set_named_field`] for the
    /// candidate rules.
    pub fn add_record<I, S>(&mut self, type_name: &str, fields: I) -> Result<RecordId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let raw: Vec<String> = fields.into_iter().map(|s| s.as_ref().to_owned()).collect();
        let id = RecordId::new();
        let Built { mut record, pending, mut warnings } = self.build_record(id, type_name, &raw)?;

        let mut resolved = Vec::new();
        for (field, name) in pending {
            let (target, warning) = self.resolve_soft(&record, field, &name)?;
            warnings.extend(warning);
            if let Some(target) = target {
                record.set(field, Some(Value::Ref(target)))?;
                resolved.push((field, target));
            }
        }
        self.check_required(&record, false)?;

        if let Some(name) = record.name() {
            if let Some(existing) = self.name_clash(record.schema(), name, None) {
                if self.strictness() == Strictness::Final {
                    return Err(Error::NameConflict { record: None, name: name.to_owned(), existing });
                }
                warnings.push(Warning::new(id, Some(0), WarningKind::DuplicateName { name: name.to_owned(), existing }));
            }
        }

        // Nothing below can fail.
        self.changes.clear();
        let type_name = record.type_name().to_owned();
        self.graph.insert(record);
        for (field, target) in resolved {
            self.graph.links.link(id, field, target);
        }
        if self.order.identity_list().is_some() {
            self.order.push_back(id);
        }
        self.changes.record_added(id, &type_name);
        for warning in warnings {
            self.warn(warning);
        }
        debug!(%id, type_name = %type_name, "record added");
        self.commit();
        Ok(id)
    }

    /// Point `field` of `id` at `target`, or clear it with `None`.
    pub fn set_pointer_field(&mut self, id: RecordId, field: usize, target: Option<RecordId>) -> Result<()> {
        let warning = {
            let record = self.record(id)?;
            let desc = self.pointer_descriptor(record, field)?;
            match target {
                Some(t) => {
                    let warning = self.check_target(record, desc, field, t)?;
                    self.check_growth(record, field, Some(Value::Ref(t)))?;
                    warning
                }
                None if desc.required && self.strictness() >= Strictness::Draft => {
                    return Err(Error::SchemaViolation {
                        record: Some(id),
                        field: Some(field),
                        message: format!("required pointer '{}' cannot be null", desc.name),
                    });
                }
                None => None,
            }
        };

        self.changes.clear();
        self.apply_pointer(id, field, target)?;
        if let Some(warning) = warning {
            self.warn(warning);
        }
        debug!(%id, field, target = ?target, "pointer set");
        self.commit();
        Ok(())
    }

    /// Point `field` of `id` at the record named `name`.
    ///
    /// Candidates are all records holding the name, in creation order. The
    /// first whose type publishes a reference list the field accepts is
    /// used. Below Draft, when none qualifies, the first candidate is used
    /// anyway. Otherwise the call fails with
    /// [`Error::UnresolvedReference`]. A blank name clears the pointer.
    pub fn set_named_field(&mut self, id: RecordId, field: usize, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return self.set_pointer_field(id, field, None);
        }
        let record = self.record(id)?;
        let desc = self.pointer_descriptor(record, field)?;
        match self.resolve(desc, name) {
            Resolution::Target { id: target, .. } => self.set_pointer_field(id, field, Some(target)),
            Resolution::Unresolved { candidates } => Err(Error::UnresolvedReference {
                record: Some(id),
                field,
                name: name.to_owned(),
                candidates,
            }),
        }
    }

    /// Remove a record.
    ///
    /// Its outgoing links are dropped and every incoming pointer is nulled
    /// on the source record, which stays in the store and receives a
    /// `RelationshipChanged` notification.
    pub fn remove_record(&mut self, id: RecordId) -> Result<()> {
        let type_name = self.record(id)?.type_name().to_owned();
        let incoming = self.source_links(id)?;

        self.changes.clear();
        for (field, _) in self.graph.links.targets(id) {
            self.graph.links.unlink(id, field);
        }
        for link in incoming {
            if link.source == id {
                continue;
            }
            self.graph.links.unlink(link.source, link.field);
            let (source_type, required) = {
                let source = self.graph.get_mut(link.source).ok_or(Error::NotFound(link.source))?;
                source.set(link.field, None)?;
                let required = source.schema().field_at(link.field).is_some_and(|d| d.required);
                (source.type_name().to_owned(), required)
            };
            self.changes.record_diff(link.source, &source_type, DiffEntry::pointer(link.field, Some(id), None));
            if required && self.strictness() >= Strictness::Draft {
                self.warn(Warning::new(
                    link.source,
                    Some(link.field),
                    WarningKind::DanglingRequiredPointer { removed: id },
                ));
            }
        }
        self.graph.remove(id);
        self.order.erase(id);
        self.changes.record_removed(id, &type_name);
        debug!(%id, type_name = %type_name, "record removed");
        self.commit();
        Ok(())
    }

    /// Rename a record.
    ///
    /// The name is compared case-insensitively against records whose types
    /// share a reference list with this one. A clash fails at Draft and
    /// above; at None a numeric suffix is appended until the name is free.
    pub fn set_name(&mut self, id: RecordId, name: &str) -> Result<()> {
        let record = self.record(id)?;
        let schema = record.schema().clone();
        if !schema.has_name {
            return Err(Error::NoNameField { type_name: schema.name.clone() });
        }
        let old = record.name().map(str::to_owned);
        let requested = name.trim();

        let mut renamed = None;
        let new = if requested.is_empty() {
            let required = schema.field_at(0).is_some_and(|d| d.required);
            if required && self.strictness() >= Strictness::Draft {
                return Err(Error::SchemaViolation {
                    record: Some(id),
                    field: Some(0),
                    message: format!("{} requires a name", schema.name),
                });
            }
            None
        } else {
            match self.name_clash(&schema, requested, Some(id)) {
                None => Some(requested.to_owned()),
                Some(existing) if self.strictness() >= Strictness::Draft => {
                    return Err(Error::NameConflict { record: Some(id), name: requested.to_owned(), existing });
                }
                Some(existing) => {
                    let assigned = self.unique_name(&schema, requested, id).ok_or(Error::NameConflict {
                        record: Some(id),
                        name: requested.to_owned(),
                        existing,
                    })?;
                    renamed = Some(assigned.clone());
                    Some(assigned)
                }
            }
        };
        if old == new {
            return Ok(());
        }

        self.changes.clear();
        {
            let record = self.graph.get_mut(id).ok_or(Error::NotFound(id))?;
            record.grow_to(0)?;
            record.set(0, new.clone().map(Value::Text))?;
        }
        self.graph.rename(id, old.as_deref(), new.as_deref());
        self.changes.record_diff(
            id,
            &schema.name,
            DiffEntry::name(old.clone().map(Value::Text), new.clone().map(Value::Text)),
        );
        if let Some(assigned) = renamed {
            self.warn(Warning::new(id, Some(0), WarningKind::Renamed { requested: requested.to_owned(), assigned }));
        }
        debug!(%id, old = ?old, new = ?new, "record renamed");
        self.commit();
        Ok(())
    }

    /// Set any field from a typed value.
    ///
    /// Pointer fields accept `Ref` (by identity) or `Text` (by name); the
    /// name field is routed through [`Store::set_name`].
    pub fn set_field(&mut self, id: RecordId, field: usize, value: Option<Value>) -> Result<()> {
        let record = self.record(id)?;
        let schema = record.schema().clone();
        let desc = schema.field_at(field).ok_or_else(|| Error::OutOfRange {
            type_name: schema.name.clone(),
            index: field,
            len: record.len(),
        })?;
        let mismatch = |value: &Value| Error::SchemaViolation {
            record: Some(id),
            field: Some(field),
            message: format!("{} value does not fit field '{}'", value.type_name(), desc.name),
        };

        if desc.is_pointer() {
            return match value {
                None => self.set_pointer_field(id, field, None),
                Some(Value::Ref(target)) => self.set_pointer_field(id, field, Some(target)),
                Some(Value::Text(name)) => self.set_named_field(id, field, &name),
                Some(other) => Err(mismatch(&other)),
            };
        }
        if schema.is_name_field(field) {
            return match value {
                None => self.set_name(id, ""),
                Some(Value::Text(name)) => self.set_name(id, &name),
                Some(other) => Err(mismatch(&other)),
            };
        }

        let mut warning = None;
        match &value {
            Some(v) if v.is_ref() => return Err(mismatch(v)),
            Some(v) if !v.fits(desc.kind) => {
                if self.strictness() >= Strictness::Draft {
                    return Err(mismatch(v));
                }
                warning = Some(Warning::new(id, Some(field), WarningKind::InvalidValue { raw: v.to_string() }));
            }
            None if desc.required && self.strictness() >= Strictness::Draft => {
                return Err(Error::SchemaViolation {
                    record: Some(id),
                    field: Some(field),
                    message: format!("required field '{}' cannot be cleared", desc.name),
                });
            }
            _ => {}
        }
        self.check_growth(record, field, value.clone())?;

        self.changes.clear();
        let old = {
            let record = self.graph.get_mut(id).ok_or(Error::NotFound(id))?;
            record.grow_to(field)?;
            record.set(field, value.clone())?
        };
        if old != value {
            self.changes.record_diff(id, &schema.name, DiffEntry::data(field, old, value));
        }
        if let Some(warning) = warning {
            self.warn(warning);
        }
        debug!(%id, field, "field set");
        self.commit();
        Ok(())
    }

    /// Set a field from text, parsing it for the field's kind.
    pub fn set_field_str(&mut self, id: RecordId, field: usize, raw: &str) -> Result<()> {
        let record = self.record(id)?;
        let schema = record.schema().clone();
        let desc = schema.field_at(field).ok_or_else(|| Error::OutOfRange {
            type_name: schema.name.clone(),
            index: field,
            len: record.len(),
        })?;
        if desc.is_pointer() {
            return self.set_named_field(id, field, raw);
        }
        if schema.is_name_field(field) {
            return self.set_name(id, raw);
        }
        match Value::parse(desc.kind, raw) {
            None => self.set_field(id, field, None),
            Some(Ok(value)) => self.set_field(id, field, Some(value)),
            Some(Err(bad)) if self.strictness() < Strictness::Draft => {
                self.set_field(id, field, Some(Value::Text(bad)))
            }
            Some(Err(bad)) => Err(Error::SchemaViolation {
                record: Some(id),
                field: Some(field),
                message: format!("'{bad}' is not a valid {:?} value for {}", desc.kind, desc.name),
            }),
        }
    }

    /// Append one extensible group from field text. Returns the index of
    /// the group's first field.
    pub fn push_extensible_group<I, S>(&mut self, id: RecordId, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let raw: Vec<String> = values.into_iter().map(|s| s.as_ref().to_owned()).collect();
        let record = self.record(id)?;
        let schema = record.schema().clone();
        let Some(group) = schema.extensible.as_ref() else {
            return Err(Error::SchemaViolation {
                record: Some(id),
                field: None,
                message: format!("{} has no extensible group", schema.name),
            });
        };
        if !record.can_push_group() || raw.len() > group.size() {
            return Err(Error::SchemaViolation {
                record: Some(id),
                field: None,
                message: format!("cannot push a group of {} onto {}", raw.len(), schema.name),
            });
        }

        // Build the group on a scratch copy so resolution sees the final
        // field indices.
        let start = record.len().max(schema.base_len());
        let mut scratch = record.clone();
        scratch.push_group(Vec::new())?;
        let mut warnings = Vec::new();
        let mut links = Vec::new();
        for (k, text) in raw.iter().enumerate() {
            let index = start + k;
            let desc = &group.fields[k];
            if desc.is_pointer() {
                let name = text.trim();
                if name.is_empty() {
                    continue;
                }
                let (target, warning) = self.resolve_soft(&scratch, index, name)?;
                warnings.extend(warning);
                if let Some(target) = target {
                    scratch.set(index, Some(Value::Ref(target)))?;
                    links.push((index, target));
                }
                continue;
            }
            match Value::parse(desc.kind, text) {
                None => {}
                Some(Ok(value)) => {
                    scratch.set(index, Some(value))?;
                }
                Some(Err(bad)) if self.strictness() < Strictness::Draft => {
                    warnings.push(Warning::new(id, Some(index), WarningKind::InvalidValue { raw: bad.clone() }));
                    scratch.set(index, Some(Value::Text(bad)))?;
                }
                Some(Err(bad)) => {
                    return Err(Error::SchemaViolation {
                        record: Some(id),
                        field: Some(index),
                        message: format!("'{bad}' is not a valid {:?} value for {}", desc.kind, desc.name),
                    });
                }
            }
        }
        self.check_required(&scratch, true)?;

        self.changes.clear();
        let values: Vec<Option<Value>> = scratch.fields()[start..].iter().map(|f| f.value.clone()).collect();
        self.graph.get_mut(id).ok_or(Error::NotFound(id))?.push_group(values.clone())?;
        for (index, target) in &links {
            self.graph.links.link(id, *index, *target);
        }
        for (k, value) in values.into_iter().enumerate() {
            let diff = match value {
                Some(Value::Ref(target)) => DiffEntry::pointer(start + k, None, Some(target)),
                other => DiffEntry::data(start + k, None, other),
            };
            self.changes.record_diff(id, &schema.name, diff);
        }
        for warning in warnings {
            self.warn(warning);
        }
        debug!(%id, start, "extensible group pushed");
        self.commit();
        Ok(start)
    }

    /// Remove the last extensible group and return its values.
    ///
    /// Returns an empty vector, changing nothing, when the record is already
    /// at its group minimum. Under Final, popping below the type's minimum
    /// field count is a schema violation.
    pub fn pop_extensible_group(&mut self, id: RecordId) -> Result<Vec<Option<Value>>> {
        let record = self.record(id)?;
        let schema = record.schema().clone();
        if !record.can_pop_group() {
            return Ok(Vec::new());
        }
        let start = record.len() - schema.group_size();
        if self.strictness() == Strictness::Final && start < schema.min_fields {
            return Err(Error::SchemaViolation {
                record: Some(id),
                field: Some(start),
                message: format!("{} cannot drop below {} fields", schema.name, schema.min_fields),
            });
        }

        self.changes.clear();
        let values = self.graph.get_mut(id).ok_or(Error::NotFound(id))?.pop_group();
        for (k, value) in values.iter().enumerate() {
            let index = start + k;
            let diff = match value {
                Some(Value::Ref(_)) => {
                    let old = self.graph.links.unlink(id, index);
                    DiffEntry::pointer(index, old, None)
                }
                other => DiffEntry::data(index, other.clone(), None),
            };
            self.changes.record_diff(id, &schema.name, diff);
        }
        debug!(%id, start, "extensible group popped");
        self.commit();
        Ok(values)
    }

    /// Set the free-text comment of a record. Comments are not fields and
    /// produce no notification.
    pub fn set_comment(&mut self, id: RecordId, comment: Option<String>) -> Result<()> {
        self.graph.get_mut(id).ok_or(Error::NotFound(id))?.set_comment(comment);
        Ok(())
    }

    pub fn set_field_comment(&mut self, id: RecordId, field: usize, comment: Option<String>) -> Result<()> {
        self.graph
            .get_mut(id)
            .ok_or(Error::NotFound(id))?
            .set_field_comment(field, comment)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::change::ChangeEvent;
    use crate::schema::{Catalog, ExtensibleGroup};
    use crate::ErrorKind;

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new()
                .with_type(TypeDescriptor::named("Zone").publishes("ZoneNames"))
                .unwrap()
                .with_type(TypeDescriptor::named("Schedule").publishes("ScheduleNames"))
                .unwrap()
                .with_type(
                    TypeDescriptor::named("Equipment")
                        .publishes("EquipmentNames")
                        .field(FieldDescriptor::pointer("Zone", ["ZoneNames"]).required())
                        .field(FieldDescriptor::pointer("Schedule", ["ScheduleNames"]))
                        .field(FieldDescriptor::integer("Count"))
                        .extensible(ExtensibleGroup::new(vec![
                            FieldDescriptor::pointer("Served Zone", ["ZoneNames"]),
                            FieldDescriptor::real("Fraction"),
                        ])),
                )
                .unwrap(),
        )
    }

    fn store_at(level: Strictness) -> Store {
        Store::with_config(catalog(), StoreConfig::default().with_strictness(level))
    }

    fn recorded(store: &Store) -> Arc<Mutex<Vec<Notification>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |n| sink.lock().unwrap().push(n.clone()));
        seen
    }

    #[test]
    fn test_add_resolves_pointer_by_name() {
        let mut store = store_at(Strictness::Draft);
        let z = store.add_record("Zone", ["Z1"]).unwrap();
        let e = store.add_record("Equipment", ["E1", "z1"]).unwrap();

        assert_eq!(store.get_target(e, 1).unwrap(), Some(z));
        assert_eq!(store.field_text(e, 1).unwrap().as_deref(), Some("Z1"));
        assert_eq!(store.get(e).unwrap().get(1).unwrap(), Some(&Value::Ref(z)));
        assert!(store.links_consistent());
    }

    #[test]
    fn test_add_unknown_type() {
        let mut store = store_at(Strictness::Draft);
        let err = store.add_record("Boiler", ["B1"]).unwrap_err();
        assert_eq!(err, Error::UnknownType("Boiler".into()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_unresolved_pointer_warns_below_final() {
        let mut store = store_at(Strictness::Draft);
        let e = store.add_record("Equipment", ["E1", "Nowhere"]).unwrap();
        assert_eq!(store.get_target(e, 1).unwrap(), None);
        assert!(matches!(
            store.warnings()[0].kind,
            WarningKind::UnresolvedReference { candidates: 0, .. }
        ));

        let mut strict = store_at(Strictness::Final);
        let err = strict.add_record("Equipment", ["E1", "Nowhere"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousOrUnresolvedReference);
        assert!(strict.is_empty());
    }

    #[test]
    fn test_add_invalid_scalar() {
        let mut store = store_at(Strictness::Draft);
        let err = store.add_record("Equipment", ["E1", "", "", "many"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);

        let mut loose = store_at(Strictness::None);
        let e = loose.add_record("Equipment", ["E1", "", "", "many"]).unwrap();
        assert_eq!(loose.get(e).unwrap().get(3).unwrap(), Some(&Value::Text("many".into())));
        assert!(matches!(loose.take_warnings()[0].kind, WarningKind::InvalidValue { .. }));
        assert!(loose.warnings().is_empty());
    }

    #[test]
    fn test_set_pointer_checks_target() {
        let mut store = store_at(Strictness::Draft);
        let z = store.add_record("Zone", ["Z1"]).unwrap();
        let s = store.add_record("Schedule", ["Always"]).unwrap();
        let e = store.add_record("Equipment", ["E1", "Z1"]).unwrap();

        let err = store.set_pointer_field(e, 1, Some(s)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { field: 1, .. }));
        assert_eq!(store.get_target(e, 1).unwrap(), Some(z));

        let ghost = RecordId::new();
        let err = store.set_pointer_field(e, 1, Some(ghost)).unwrap_err();
        assert!(matches!(err, Error::UnknownTarget { .. }));
        assert_eq!(err.kind(), ErrorKind::Structural);

        let err = store.set_pointer_field(e, 3, Some(z)).unwrap_err();
        assert!(matches!(err, Error::NotAPointerField { field: 3, .. }));

        let err = store.set_pointer_field(ghost, 1, Some(z)).unwrap_err();
        assert_eq!(err, Error::NotFound(ghost));
    }

    #[test]
    fn test_incompatible_target_allowed_at_none() {
        let mut store = store_at(Strictness::None);
        let s = store.add_record("Schedule", ["Always"]).unwrap();
        let e = store.add_record("Equipment", ["E1"]).unwrap();

        store.set_pointer_field(e, 1, Some(s)).unwrap();
        assert_eq!(store.get_sources(s, None).unwrap(), vec![e]);
        assert!(matches!(store.warnings()[0].kind, WarningKind::IncompatibleTarget { target } if target == s));
    }

    #[test]
    fn test_required_pointer_cannot_be_nulled_at_draft() {
        let mut store = store_at(Strictness::Draft);
        let z = store.add_record("Zone", ["Z1"]).unwrap();
        let e = store.add_record("Equipment", ["E1", "Z1"]).unwrap();
        let seen = recorded(&store);

        let err = store.set_pointer_field(e, 1, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert_eq!(store.get_target(e, 1).unwrap(), Some(z));
        assert!(seen.lock().unwrap().is_empty());

        store.set_pointer_field(e, 2, None).unwrap();
    }

    #[test]
    fn test_set_named_field_prefers_qualifying_candidate() {
        let mut store = store_at(Strictness::Draft);
        let s = store.add_record("Schedule", ["Shared"]).unwrap();
        let z = store.add_record("Zone", ["Shared"]).unwrap();
        let e = store.add_record("Equipment", ["E1", "Shared", "Shared"]).unwrap();

        assert_eq!(store.get_target(e, 1).unwrap(), Some(z));
        assert_eq!(store.get_target(e, 2).unwrap(), Some(s));

        let err = store.set_named_field(e, 2, "E1").unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { candidates: 1, .. }));
    }

    #[test]
    fn test_set_named_field_falls_back_at_none() {
        let mut store = store_at(Strictness::None);
        let s = store.add_record("Schedule", ["S1"]).unwrap();
        let e = store.add_record("Equipment", ["E1"]).unwrap();

        store.set_named_field(e, 1, "S1").unwrap();
        assert_eq!(store.get_target(e, 1).unwrap(), Some(s));
    }

    #[test]
    fn test_set_name_conflicts() {
        let mut store = store_at(Strictness::Draft);
        let a = store.add_record("Zone", ["A"]).unwrap();
        let b = store.add_record("Zone", ["B"]).unwrap();

        let err = store.set_name(b, "a").unwrap_err();
        assert_eq!(err, Error::NameConflict { record: Some(b), name: "a".into(), existing: a });
        assert_eq!(store.get(b).unwrap().name(), Some("B"));

        // Different reference lists do not compete.
        store.add_record("Schedule", ["S"]).unwrap();
        store.set_name(b, "S").unwrap();
        assert_eq!(store.find_by_type_and_name("zone", "s"), Some(b));
    }

    #[test]
    fn test_set_name_suffixes_at_none() {
        let mut store = store_at(Strictness::None);
        store.add_record("Zone", ["A"]).unwrap();
        store.add_record("Zone", ["A 1"]).unwrap();
        let c = store.add_record("Zone", ["C"]).unwrap();

        store.set_name(c, "A").unwrap();
        assert_eq!(store.get(c).unwrap().name(), Some("A 2"));
        assert!(matches!(
            &store.warnings()[0].kind,
            WarningKind::Renamed { assigned, .. } if assigned == "A 2"
        ));
    }

    #[test]
    fn test_set_name_on_unnamed_type() {
        let catalog = Catalog::new().with_type(TypeDescriptor::new("Version")).unwrap();
        let mut store = Store::new(Arc::new(catalog));
        let v = store.add_record("Version", Vec::<String>::new()).unwrap();
        assert!(matches!(store.set_name(v, "x"), Err(Error::NoNameField { .. })));
    }

    #[test]
    fn test_rename_keeps_links() {
        let mut store = store_at(Strictness::Draft);
        let z = store.add_record("Zone", ["Z1"]).unwrap();
        let e = store.add_record("Equipment", ["E1", "Z1"]).unwrap();

        store.set_name(z, "Lobby").unwrap();
        assert_eq!(store.get_target(e, 1).unwrap(), Some(z));
        assert_eq!(store.field_text(e, 1).unwrap().as_deref(), Some("Lobby"));
        assert!(store.find_by_name("Z1").is_empty());
    }

    #[test]
    fn test_remove_nulls_incoming_pointers() {
        let mut store = store_at(Strictness::Draft);
        let z = store.add_record("Zone", ["Z1"]).unwrap();
        let e = store.add_record("Equipment", ["E1", "Z1"]).unwrap();
        let seen = recorded(&store);

        store.remove_record(z).unwrap();
        assert!(!store.contains(z));
        assert_eq!(store.get(e).unwrap().get(1).unwrap(), None);
        assert_eq!(store.forward_link_count(), 0);
        assert_eq!(store.reverse_link_count(), 0);
        assert!(matches!(store.warnings()[0].kind, WarningKind::DanglingRequiredPointer { removed } if removed == z));

        let notes = seen.lock().unwrap();
        assert_eq!(notes.len(), 2);
        let source = notes.iter().find(|n| n.record == e).unwrap();
        assert!(source.is_relationship_change());
        let removed = notes.iter().find(|n| n.record == z).unwrap();
        assert!(removed.has(|ev| matches!(ev, ChangeEvent::Removed)));
    }

    #[test]
    fn test_remove_unknown() {
        let mut store = store_at(Strictness::Draft);
        let ghost = RecordId::new();
        assert_eq!(store.remove_record(ghost), Err(Error::NotFound(ghost)));
    }

    #[test]
    fn test_sources_are_distinct_and_filtered() {
        let mut store = store_at(Strictness::Draft);
        let z = store.add_record("Zone", ["Z1"]).unwrap();
        let e = store.add_record("Equipment", ["E1", "Z1"]).unwrap();
        store.push_extensible_group(e, ["Z1", "0.5"]).unwrap();

        assert_eq!(store.get_sources(z, None).unwrap(), vec![e]);
        assert_eq!(store.get_sources(z, Some("equipment")).unwrap(), vec![e]);
        assert!(store.get_sources(z, Some("Schedule")).unwrap().is_empty());
        assert_eq!(store.source_links(z).unwrap().len(), 2);
    }

    #[test]
    fn test_extensible_groups() {
        let mut store = store_at(Strictness::Draft);
        let z = store.add_record("Zone", ["Z1"]).unwrap();
        let e = store.add_record("Equipment", ["E1", "Z1"]).unwrap();

        let start = store.push_extensible_group(e, ["Z1", "0.25"]).unwrap();
        assert_eq!(start, 4);
        assert_eq!(store.get_target(e, 4).unwrap(), Some(z));
        assert_eq!(store.get(e).unwrap().get(5).unwrap(), Some(&Value::Real(0.25)));

        let err = store.push_extensible_group(e, ["Z1", "half"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert_eq!(store.get(e).unwrap().len(), 6);

        let popped = store.pop_extensible_group(e).unwrap();
        assert_eq!(popped, vec![Some(Value::Ref(z)), Some(Value::Real(0.25))]);
        assert_eq!(store.get_sources(z, None).unwrap(), vec![e]);
        assert_eq!(store.source_links(z).unwrap().len(), 1);
        assert!(store.pop_extensible_group(e).unwrap().is_empty());
        assert!(store.links_consistent());
    }

    #[test]
    fn test_set_field_routes_by_kind() {
        let mut store = store_at(Strictness::Draft);
        let z = store.add_record("Zone", ["Z1"]).unwrap();
        let e = store.add_record("Equipment", ["E1", "Z1"]).unwrap();

        store.set_field(e, 3, Some(Value::Int(4))).unwrap();
        store.set_field_str(e, 3, "5").unwrap();
        assert_eq!(store.get(e).unwrap().get(3).unwrap(), Some(&Value::Int(5)));

        assert!(store.set_field(e, 3, Some(Value::Real(1.5))).is_err());
        assert!(store.set_field(e, 3, Some(Value::Ref(z))).is_err());

        store.set_field(e, 0, Some("Fan".into())).unwrap();
        assert_eq!(store.find_by_name("fan"), vec![e]);

        store.set_field_str(e, 1, "").unwrap_err();
        store.set_field(e, 1, Some(Value::Ref(z))).unwrap();
    }

    #[test]
    fn test_one_notification_per_record() {
        let mut store = store_at(Strictness::Draft);
        let seen = recorded(&store);
        let z = store.add_record("Zone", ["Z1"]).unwrap();
        store.set_name(z, "Z2").unwrap();
        store.set_comment(z, Some("note".into())).unwrap();

        let notes = seen.lock().unwrap();
        assert_eq!(notes.len(), 2);
        assert!(notes[0].has(|ev| matches!(ev, ChangeEvent::Added)));
        assert!(notes[1].is_name_change());
        assert!(notes.iter().all(|n| n.has(|ev| matches!(ev, ChangeEvent::Changed))));
    }

    #[test]
    fn test_identity_order_tracks_membership() {
        let mut store = store_at(Strictness::Draft);
        let a = store.add_record("Zone", ["A"]).unwrap();
        store.order_mut().use_identity_list([a]);
        let b = store.add_record("Zone", ["B"]).unwrap();
        assert_eq!(store.order().identity_list(), Some(&[a, b][..]));

        store.remove_record(a).unwrap();
        assert_eq!(store.order().identity_list(), Some(&[b][..]));
        assert_eq!(store.sorted_ids(), vec![b]);
    }
}
