//! Warning side channel and validity reports.

use std::fmt;

use serde::Serialize;

use super::Strictness;
use crate::model::RecordId;

/// A tolerated, soft condition recorded during an otherwise successful
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub record: Option<RecordId>,
    pub field: Option<usize>,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WarningKind {
    /// A pointer name matched no acceptable record and was left null.
    UnresolvedReference { name: String, candidates: usize },
    /// A pointer was set to a record outside the field's reference lists.
    IncompatibleTarget { target: RecordId },
    /// A record was created with a name already held by a competing record.
    DuplicateName { name: String, existing: RecordId },
    /// A scalar did not parse for its field kind and was stored as text.
    InvalidValue { raw: String },
    /// A required pointer was nulled because its target was removed.
    DanglingRequiredPointer { removed: RecordId },
    /// A rename clashed and a suffixed name was assigned instead.
    Renamed { requested: String, assigned: String },
}

impl Warning {
    pub fn new(record: RecordId, field: Option<usize>, kind: WarningKind) -> Self {
        Self { record: Some(record), field, kind }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(record) = self.record {
            write!(f, "record {record}")?;
            if let Some(field) = self.field {
                write!(f, " field {field}")?;
            }
            write!(f, ": ")?;
        }
        match &self.kind {
            WarningKind::UnresolvedReference { name, candidates } => {
                write!(f, "unresolved reference '{name}' ({candidates} candidate(s))")
            }
            WarningKind::IncompatibleTarget { target } => {
                write!(f, "target {target} is outside the accepted reference lists")
            }
            WarningKind::DuplicateName { name, existing } => {
                write!(f, "name '{name}' is also used by {existing}")
            }
            WarningKind::InvalidValue { raw } => write!(f, "'{raw}' stored as text"),
            WarningKind::DanglingRequiredPointer { removed } => {
                write!(f, "required pointer nulled by removal of {removed}")
            }
            WarningKind::Renamed { requested, assigned } => {
                write!(f, "renamed to '{assigned}' instead of '{requested}'")
            }
        }
    }
}

/// One problem found by [`Store::validate`](super::Store::validate).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub record: RecordId,
    pub field: Option<usize>,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IssueKind {
    NullRequiredPointer,
    IncompatibleTarget { target: RecordId },
    InvalidValue,
    MissingRequiredField,
    BelowMinimumFields { len: usize, min: usize },
    DuplicateName { name: String, existing: RecordId },
}

/// Result of checking the whole store against a strictness level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidityReport {
    pub level: Strictness,
    pub issues: Vec<Issue>,
}

impl ValidityReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_for(&self, record: RecordId) -> impl Iterator<Item = &Issue> + '_ {
        self.issues.iter().filter(move |i| i.record == record)
    }
}
