//! Batch import of flat text records.
//!
//! A batch is loaded in two passes so pointers may name records that
//! appear later in the same batch:
//!
//! ```text
//! RawRecord* → create all (scalars, names) → resolve all pointers
//!            → check required fields → notify
//! ```
//!
//! The batch is all-or-nothing. On any error the store is restored to its
//! state before the call and no notification is sent.
//!
//! A record may carry the identity it had when exported. Pointer text that
//! names no record is then tried as an identity, so pointers to unnamed
//! targets survive a round trip.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::export::ExportedRecord;
use crate::model::{RecordId, Value};
use crate::store::{Built, Store, Strictness, Warning, WarningKind};
use crate::{Error, Result};

/// One record as positional field text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Identity to keep; a fresh one is drawn when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub type_name: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub field_comments: Vec<Option<String>>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl RawRecord {
    pub fn new<I, S>(type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }
}

impl From<&ExportedRecord> for RawRecord {
    fn from(rec: &ExportedRecord) -> Self {
        Self {
            id: Some(rec.id),
            type_name: rec.type_name.clone(),
            fields: rec.fields.iter().map(|f| f.clone().unwrap_or_default()).collect(),
            field_comments: rec.field_comments.clone(),
            comment: rec.comment.clone(),
        }
    }
}

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    /// New identities, in batch order.
    pub ids: Vec<RecordId>,
    /// Soft conditions raised by this batch alone.
    pub warnings: Vec<Warning>,
}

impl Store {
    /// Import a batch of records.
    pub fn import(&mut self, batch: Vec<RawRecord>) -> Result<ImportReport> {
        let graph_backup = self.graph.clone();
        let order_backup = self.order.clone();
        self.changes.clear();

        match self.import_inner(batch) {
            Ok((ids, warnings)) => {
                for id in &ids {
                    if let Some(record) = self.graph.get(*id) {
                        let type_name = record.type_name().to_owned();
                        self.changes.record_added(*id, &type_name);
                    }
                }
                for warning in &warnings {
                    self.warn(warning.clone());
                }
                info!(records = ids.len(), warnings = warnings.len(), "batch imported");
                self.commit();
                Ok(ImportReport { ids, warnings })
            }
            Err(err) => {
                self.graph = graph_backup;
                self.order = order_backup;
                self.changes.clear();
                debug!(error = %err, "batch import rolled back");
                Err(err)
            }
        }
    }

    /// Import a batch given as a JSON array of [`RawRecord`].
    pub fn import_json(&mut self, json: &str) -> Result<ImportReport> {
        let batch: Vec<RawRecord> = serde_json::from_str(json)?;
        self.import(batch)
    }

    fn import_inner(&mut self, batch: Vec<RawRecord>) -> Result<(Vec<RecordId>, Vec<Warning>)> {
        let mut ids = Vec::with_capacity(batch.len());
        let mut warnings = Vec::new();
        let mut pending = Vec::new();

        // Pass 1: create every record with scalars and names only.
        for raw in batch {
            let id = raw.id.unwrap_or_default();
            if self.graph.contains(id) {
                return Err(Error::DuplicateId(id));
            }
            let Built { mut record, pending: names, warnings: built } =
                self.build_record(id, &raw.type_name, &raw.fields)?;
            warnings.extend(built);

            for (i, comment) in raw.field_comments.into_iter().enumerate() {
                if comment.is_some() && i < record.len() {
                    record.set_field_comment(i, comment)?;
                }
            }
            record.set_comment(raw.comment);

            if let Some(name) = record.name() {
                if let Some(existing) = self.name_clash(record.schema(), name, None) {
                    if self.strictness() == Strictness::Final {
                        return Err(Error::NameConflict { record: Some(id), name: name.to_owned(), existing });
                    }
                    warnings.push(Warning::new(
                        id,
                        Some(0),
                        WarningKind::DuplicateName { name: name.to_owned(), existing },
                    ));
                }
            }

            self.graph.insert(record);
            if self.order.identity_list().is_some() {
                self.order.push_back(id);
            }
            pending.push((id, names));
            ids.push(id);
        }

        // Pass 2: resolve pointer names against the whole store.
        for (id, names) in pending {
            for (field, name) in names {
                let record = self.record(id)?;
                let (target, warning) = self
                    .resolve_soft(record, field, &name)
                    .map_err(|err| with_record(err, id))?;
                warnings.extend(warning);
                if let Some(target) = target {
                    self.graph
                        .get_mut(id)
                        .ok_or(Error::NotFound(id))?
                        .set(field, Some(Value::Ref(target)))?;
                    self.graph.links.link(id, field, target);
                }
            }
        }

        // Pass 3: required fields, now that pointers are settled.
        for id in &ids {
            self.check_required(self.record(*id)?, true)?;
        }

        Ok((ids, warnings))
    }
}

fn with_record(err: Error, id: RecordId) -> Error {
    match err {
        Error::UnresolvedReference { record: None, field, name, candidates } => {
            Error::UnresolvedReference { record: Some(id), field, name, candidates }
        }
        other => other,
    }
}
