//! # Schema Catalog
//!
//! Data-driven descriptors for record types. The store never hard-codes a
//! record shape: everything it knows about a type (field kinds, required
//! flags, defaults, accepted reference lists, extensible groups, ordering
//! rank) comes through the [`SchemaCatalog`] trait.
//!
//! | Type | Role |
//! |------|------|
//! | [`FieldDescriptor`] | One positional field |
//! | [`ExtensibleGroup`] | Repeating block appended after the fixed fields |
//! | [`TypeDescriptor`] | Complete shape of a record type |
//! | [`Catalog`] | In-memory catalog, built in code or loaded from JSON |

pub mod catalog;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::Value;
use crate::{Error, Result};

pub use catalog::Catalog;

// ============================================================================
// SchemaCatalog Trait
// ============================================================================

/// The contract between the store and whatever owns the schema.
///
/// Type lookups are case-insensitive.
pub trait SchemaCatalog: Send + Sync {
    /// Descriptor for a record type, if the catalog knows it.
    fn describe(&self, type_name: &str) -> Option<Arc<TypeDescriptor>>;

    /// All type names, in catalog order.
    fn type_names(&self) -> Vec<String>;

    /// Position of a type in catalog order.
    fn rank(&self, type_name: &str) -> Option<u32> {
        self.type_names()
            .iter()
            .position(|t| t.eq_ignore_ascii_case(type_name))
            .map(|p| p as u32)
    }
}

// ============================================================================
// Field descriptors
// ============================================================================

/// Storage kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Real,
    /// Pointer field, resolved against one or more reference lists.
    Reference,
}

/// One positional field of a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// Reference lists a pointer field accepts. Empty for scalar fields.
    #[serde(default)]
    pub reference_lists: Vec<String>,
}

impl FieldDescriptor {
    fn of_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            reference_lists: Vec::new(),
        }
    }

    pub fn text(name: impl Into<String>) -> Self { Self::of_kind(name, FieldKind::Text) }
    pub fn integer(name: impl Into<String>) -> Self { Self::of_kind(name, FieldKind::Integer) }
    pub fn real(name: impl Into<String>) -> Self { Self::of_kind(name, FieldKind::Real) }

    pub fn pointer(
        name: impl Into<String>,
        lists: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut field = Self::of_kind(name, FieldKind::Reference);
        field.reference_lists = lists.into_iter().map(Into::into).collect();
        field
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_pointer(&self) -> bool {
        self.kind == FieldKind::Reference
    }

    /// Whether a target type publishing `published` lists may be stored here.
    pub fn accepts<S: AsRef<str>>(&self, published: &[S]) -> bool {
        self.reference_lists
            .iter()
            .any(|l| published.iter().any(|p| p.as_ref().eq_ignore_ascii_case(l)))
    }
}

/// Repeating block of fields appended after the fixed fields.
///
/// Groups are always pushed and popped whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensibleGroup {
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub min_groups: usize,
    #[serde(default)]
    pub max_groups: Option<usize>,
}

impl ExtensibleGroup {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields, min_groups: 0, max_groups: None }
    }

    pub fn with_bounds(mut self, min_groups: usize, max_groups: Option<usize>) -> Self {
        self.min_groups = min_groups;
        self.max_groups = max_groups;
        self
    }

    pub fn size(&self) -> usize {
        self.fields.len()
    }
}

// ============================================================================
// Type descriptor
// ============================================================================

/// Complete shape of a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    /// Ordering hint; ties are broken by insertion order in the catalog.
    #[serde(default)]
    pub rank: u32,
    /// Field 0 is the record's name.
    #[serde(default)]
    pub has_name: bool,
    /// Reference lists this type's names are published into.
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub extensible: Option<ExtensibleGroup>,
    #[serde(default)]
    pub min_fields: usize,
}

impl TypeDescriptor {
    /// A type without a name field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rank: 0,
            has_name: false,
            references: Vec::new(),
            fields: Vec::new(),
            extensible: None,
            min_fields: 0,
        }
    }

    /// A type whose field 0 is a required `Name`.
    pub fn named(name: impl Into<String>) -> Self {
        let mut desc = Self::new(name);
        desc.has_name = true;
        desc.fields.push(FieldDescriptor::text("Name").required());
        desc.min_fields = 1;
        desc
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn publishes(mut self, list: impl Into<String>) -> Self {
        self.references.push(list.into());
        self
    }

    pub fn rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    pub fn extensible(mut self, group: ExtensibleGroup) -> Self {
        self.extensible = Some(group);
        self
    }

    pub fn min_fields(mut self, min_fields: usize) -> Self {
        self.min_fields = min_fields;
        self
    }

    /// Number of fixed (non-extensible) fields.
    pub fn base_len(&self) -> usize {
        self.fields.len()
    }

    pub fn group_size(&self) -> usize {
        self.extensible.as_ref().map_or(0, ExtensibleGroup::size)
    }

    /// Descriptor for a field position, or `None` if the schema has no such
    /// position (past the fixed fields with no group, or past max groups).
    pub fn field_at(&self, index: usize) -> Option<&FieldDescriptor> {
        if index < self.fields.len() {
            return self.fields.get(index);
        }
        let group = self.extensible.as_ref()?;
        let offset = index - self.fields.len();
        let nth = offset / group.size();
        if group.max_groups.is_some_and(|max| nth >= max) {
            return None;
        }
        group.fields.get(offset % group.size())
    }

    pub fn is_pointer(&self, index: usize) -> bool {
        self.field_at(index).is_some_and(FieldDescriptor::is_pointer)
    }

    pub fn is_name_field(&self, index: usize) -> bool {
        self.has_name && index == 0
    }

    /// Field count a freshly created record starts with.
    pub fn initial_len(&self) -> usize {
        let base = self.fields.len();
        match &self.extensible {
            Some(group) => {
                let for_min = self.min_fields.saturating_sub(base).div_ceil(group.size());
                let groups = for_min.max(group.min_groups);
                if groups == 0 {
                    self.min_fields.min(base)
                } else {
                    base + groups * group.size()
                }
            }
            None => self.min_fields.min(base),
        }
    }

    /// Two types compete for names when they are the same type or publish
    /// into at least one common reference list.
    pub fn shares_names_with(&self, other: &TypeDescriptor) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            || self
                .references
                .iter()
                .any(|r| other.references.iter().any(|o| o.eq_ignore_ascii_case(r)))
    }

    /// Check internal consistency of the descriptor.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidCatalog(format!("{}: {msg}", self.name)));

        if self.name.trim().is_empty() {
            return Err(Error::InvalidCatalog("type with empty name".into()));
        }
        if self.has_name && self.fields.first().map(|f| f.kind) != Some(FieldKind::Text) {
            return invalid("name field must be a text field at index 0".into());
        }
        let all_fields = self
            .fields
            .iter()
            .chain(self.extensible.iter().flat_map(|g| g.fields.iter()));
        for field in all_fields {
            if field.is_pointer() && field.reference_lists.is_empty() {
                return invalid(format!("pointer field '{}' accepts no reference list", field.name));
            }
            if let Some(default) = &field.default {
                if field.is_pointer() || !default.fits(field.kind) {
                    return invalid(format!("default of '{}' does not fit its kind", field.name));
                }
            }
        }
        match &self.extensible {
            Some(group) => {
                if group.fields.is_empty() {
                    return invalid("extensible group has no fields".into());
                }
                if group.max_groups.is_some_and(|max| max < group.min_groups) {
                    return invalid("extensible group max is below min".into());
                }
                if let Some(max) = group.max_groups {
                    if self.min_fields > self.fields.len() + max * group.size() {
                        return invalid("min_fields exceeds the largest record".into());
                    }
                }
            }
            None if self.min_fields > self.fields.len() => {
                return invalid("min_fields exceeds field count".into());
            }
            None => {}
        }
        Ok(())
    }
}
