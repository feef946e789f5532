//! # refgraph: Schema-Constrained Record Graph
//!
//! An in-memory store for typed records whose shape comes from an external
//! schema catalog, and whose pointer fields reference other records by
//! identity.
//!
//! ## Design Principles
//!
//! 1. **Arena + indices**: records live in a map keyed by [`RecordId`];
//!    forward and reverse links are identity-keyed index entries, never
//!    owning references
//! 2. **Data-driven types**: record shapes come from [`SchemaCatalog`]
//!    descriptors, not per-type code
//! 3. **All-or-nothing mutation**: every store operation validates first and
//!    mutates second; a failed call leaves no trace and emits nothing
//! 4. **One notification per touched record per operation**
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use refgraph::{Catalog, FieldDescriptor, Store, Strictness, TypeDescriptor};
//!
//! # fn example() -> refgraph::Result<()> {
//! let catalog = Catalog::new()
//!     .with_type(TypeDescriptor::named("Zone").publishes("ZoneNames"))?
//!     .with_type(
//!         TypeDescriptor::named("Equipment")
//!             .field(FieldDescriptor::pointer("Zone", ["ZoneNames"])),
//!     )?;
//!
//! let mut store = Store::new(Arc::new(catalog));
//! let zone = store.add_record("Zone", ["Z1"])?;
//! let equip = store.add_record("Equipment", ["E1", "Z1"])?;
//!
//! assert_eq!(store.get_target(equip, 1)?, Some(zone));
//! assert_eq!(store.get_sources(zone, None)?, vec![equip]);
//! assert_eq!(store.strictness(), Strictness::Draft);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod schema;
pub mod store;
pub mod order;
pub mod change;
pub mod export;
pub mod import;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{Field, Record, RecordId, Value};

pub use schema::{
    Catalog, ExtensibleGroup, FieldDescriptor, FieldKind, SchemaCatalog, TypeDescriptor,
};

pub use store::{
    Issue, IssueKind, SourceLink, Store, StoreConfig, Strictness, ValidityReport, Warning,
    WarningKind,
};

pub use order::{OrderEntry, OrderMode, OrderPolicy, Orderable, TypeLookup};

pub use change::{ChangeEvent, DiffEntry, DiffKind, Notification, Notifier, SubscriptionId};

pub use export::ExportedRecord;
pub use import::{ImportReport, RawRecord};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown record type: {0}")]
    UnknownType(String),

    #[error("Field index {index} out of range for {type_name} ({len} fields)")]
    OutOfRange { type_name: String, index: usize, len: usize },

    #[error("Field {field} of record {record} is not a pointer field")]
    NotAPointerField { record: RecordId, field: usize },

    #[error("Type {type_name} has no name field")]
    NoNameField { type_name: String },

    #[error("Field {field} of record {record} does not accept {target} of type {target_type}")]
    TypeMismatch {
        record: RecordId,
        field: usize,
        target: RecordId,
        target_type: String,
    },

    #[error("Field {field} of record {record} points at unknown record {target}")]
    UnknownTarget { record: RecordId, field: usize, target: RecordId },

    #[error("Schema violation: {message}")]
    SchemaViolation {
        record: Option<RecordId>,
        field: Option<usize>,
        message: String,
    },

    #[error("Name '{name}' is already used by record {existing}")]
    NameConflict {
        record: Option<RecordId>,
        name: String,
        existing: RecordId,
    },

    #[error("Cannot resolve '{name}' for field {field} ({candidates} candidate(s))")]
    UnresolvedReference {
        record: Option<RecordId>,
        field: usize,
        name: String,
        candidates: usize,
    },

    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Record identity already in use: {0}")]
    DuplicateId(RecordId),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad index, unknown identity, wrong record type for the operation.
    Structural,
    /// Required field left empty, bounds violated, value of the wrong kind.
    SchemaViolation,
    NameConflict,
    AmbiguousOrUnresolvedReference,
    NotFound,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownType(_)
            | Error::OutOfRange { .. }
            | Error::NotAPointerField { .. }
            | Error::NoNameField { .. }
            | Error::TypeMismatch { .. }
            | Error::UnknownTarget { .. }
            | Error::DuplicateId(_)
            | Error::InvalidCatalog(_)
            | Error::Json(_)
            | Error::Io(_) => ErrorKind::Structural,
            Error::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            Error::NameConflict { .. } => ErrorKind::NameConflict,
            Error::UnresolvedReference { .. } => ErrorKind::AmbiguousOrUnresolvedReference,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// The record implicated by the failure, when known.
    pub fn record(&self) -> Option<RecordId> {
        match self {
            Error::NotAPointerField { record, .. }
            | Error::TypeMismatch { record, .. }
            | Error::UnknownTarget { record, .. } => Some(*record),
            Error::SchemaViolation { record, .. }
            | Error::NameConflict { record, .. }
            | Error::UnresolvedReference { record, .. } => *record,
            Error::NotFound(id) | Error::DuplicateId(id) => Some(*id),
            _ => None,
        }
    }

    /// The field implicated by the failure, when known.
    pub fn field(&self) -> Option<usize> {
        match self {
            Error::OutOfRange { index, .. } => Some(*index),
            Error::NotAPointerField { field, .. }
            | Error::TypeMismatch { field, .. }
            | Error::UnknownTarget { field, .. }
            | Error::UnresolvedReference { field, .. } => Some(*field),
            Error::SchemaViolation { field, .. } => *field,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
