//! Export: render the store as ordered, flat records.
//!
//! Pointer fields are rendered as the target's name, or as its identity
//! when the target has none. Each exported record converts into a
//! [`RawRecord`](crate::RawRecord) that keeps its identity, so an export can
//! be fed straight back through [`Store::import`](crate::Store::import).
//!
//! ```text
//! Store → export(&policy) → Vec<ExportedRecord>
//!       → export_json()   → JSON array
//!       → write_text()    → one block per record, fields comma separated
//! ```

use std::io::Write;

use serde::Serialize;
use tracing::warn;

use crate::model::{Record, RecordId};
use crate::order::OrderPolicy;
use crate::store::Store;
use crate::{Error, Result};

/// One record as text, ready for serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedRecord {
    pub id: RecordId,
    pub type_name: String,
    /// Display text per field; `None` for absent fields.
    pub fields: Vec<Option<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_comments: Vec<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Store {
    fn export_record(&self, record: &Record) -> ExportedRecord {
        let fields = record
            .fields()
            .iter()
            .map(|f| f.value.as_ref().map(|v| self.render(v)))
            .collect();
        let field_comments = if record.fields().iter().any(|f| f.comment.is_some()) {
            record.fields().iter().map(|f| f.comment.clone()).collect()
        } else {
            Vec::new()
        };
        ExportedRecord {
            id: record.id(),
            type_name: record.type_name().to_owned(),
            fields,
            field_comments,
            comment: record.comment().map(str::to_owned),
        }
    }

    /// Every record, sorted by `policy`.
    pub fn export(&self, policy: &OrderPolicy) -> Vec<ExportedRecord> {
        let records: Vec<&Record> = self.records().collect();
        policy
            .sort_records(records)
            .into_iter()
            .map(|r| self.export_record(r))
            .collect()
    }

    /// The given records, sorted by `policy`. Unknown identities are
    /// an error.
    pub fn export_ids(&self, ids: &[RecordId], policy: &OrderPolicy) -> Result<Vec<ExportedRecord>> {
        let records = ids
            .iter()
            .map(|id| self.get(*id).ok_or(Error::NotFound(*id)))
            .collect::<Result<Vec<_>>>()?;
        Ok(policy
            .sort_records(records)
            .into_iter()
            .map(|r| self.export_record(r))
            .collect())
    }

    /// Every record as a JSON array, sorted by `policy`.
    pub fn export_json(&self, policy: &OrderPolicy) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export(policy))?)
    }

    /// Write every record as a text block, sorted by `policy`.
    ///
    /// Each block is the type name followed by one line per field; the last
    /// field ends with `;`. Field names from the schema trail as `!-`
    /// comments, free-text comments as `!` lines.
    ///
    /// The text form is lossy: `,`, `;` and `!` inside a value are written
    /// as `_`, and each such value is logged at warn level. Use
    /// [`Store::export`] or [`Store::export_json`] to keep values intact.
    pub fn write_text(&self, policy: &OrderPolicy, writer: &mut dyn Write) -> Result<()> {
        let exported = self.export(policy);
        writeln!(writer, "! refgraph export")?;
        writeln!(writer, "! Records: {}", exported.len())?;
        writeln!(writer, "! Strictness: {}", self.strictness())?;

        for rec in &exported {
            writeln!(writer)?;
            if let Some(comment) = &rec.comment {
                for line in comment.lines() {
                    writeln!(writer, "! {line}")?;
                }
            }
            let schema = self.get(rec.id).map(|r| r.schema().clone());
            if rec.fields.is_empty() {
                writeln!(writer, "{};", rec.type_name)?;
                continue;
            }
            writeln!(writer, "{},", rec.type_name)?;
            let last = rec.fields.len() - 1;
            for (i, value) in rec.fields.iter().enumerate() {
                let sep = if i == last { ';' } else { ',' };
                let label = schema
                    .as_ref()
                    .and_then(|s| s.field_at(i))
                    .map_or(String::new(), |d| d.name.clone());
                let comment = rec.field_comments.get(i).cloned().flatten();
                let raw = value.as_deref().unwrap_or("");
                let escaped = escape(raw);
                if escaped != raw {
                    warn!(record = %rec.id, field = i, "separators replaced in text export");
                }
                let text = format!("{escaped}{sep}");
                match comment {
                    Some(c) => writeln!(writer, "  {text:<30}!- {label} ! {c}")?,
                    None => writeln!(writer, "  {text:<30}!- {label}")?,
                }
            }
        }
        Ok(())
    }
}

/// Field separators inside a value would break the text layout.
fn escape(text: &str) -> String {
    text.replace([',', ';', '!'], "_")
}
