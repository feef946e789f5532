//! The record type: the base unit of the store.
//!
//! A record owns an ordered list of field slots and knows its own schema,
//! but nothing about other records. Pointer fields hold `Value::Ref` like
//! any other value here; keeping links bidirectionally consistent is the
//! store's job.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Value;
use crate::schema::TypeDescriptor;
use crate::{Error, Result};

/// Opaque, immutable record identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// A fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// One field slot: an optional value and an optional comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub value: Option<Value>,
    pub comment: Option<String>,
}

/// A typed record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    schema: Arc<TypeDescriptor>,
    fields: Vec<Field>,
    comment: Option<String>,
}

impl Record {
    /// New record padded to the schema's initial length.
    pub fn new(id: RecordId, schema: Arc<TypeDescriptor>) -> Self {
        let fields = vec![Field::default(); schema.initial_len()];
        Self { id, schema, fields, comment: None }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Arc<TypeDescriptor> {
        &self.schema
    }

    /// Number of stored fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub fn field_comment(&self, index: usize) -> Option<&str> {
        self.fields.get(index).and_then(|f| f.comment.as_deref())
    }

    pub fn set_field_comment(&mut self, index: usize, comment: Option<String>) -> Result<()> {
        let len = self.fields.len();
        let field = self.fields.get_mut(index).ok_or_else(|| Error::OutOfRange {
            type_name: self.schema.name.clone(),
            index,
            len,
        })?;
        field.comment = comment;
        Ok(())
    }

    /// The record's name, if its type has a name field and it is set.
    pub fn name(&self) -> Option<&str> {
        if !self.schema.has_name {
            return None;
        }
        self.fields.first()?.value.as_ref()?.as_str()
    }

    fn out_of_range(&self, index: usize) -> Error {
        Error::OutOfRange {
            type_name: self.schema.name.clone(),
            index,
            len: self.fields.len(),
        }
    }

    /// Stored value at `index`.
    ///
    /// Positions the schema allows but the record has not grown to yet read
    /// as absent; anything else past the end is `OutOfRange`.
    pub fn get(&self, index: usize) -> Result<Option<&Value>> {
        match self.fields.get(index) {
            Some(field) => Ok(field.value.as_ref()),
            None if self.schema.field_at(index).is_some() => Ok(None),
            None => Err(self.out_of_range(index)),
        }
    }

    /// Like [`Record::get`], falling back to the schema default.
    pub fn get_or_default(&self, index: usize) -> Result<Option<Value>> {
        match self.get(index)? {
            Some(value) => Ok(Some(value.clone())),
            None => Ok(self.schema.field_at(index).and_then(|f| f.default.clone())),
        }
    }

    /// Overwrite an existing slot, returning the previous value.
    pub fn set(&mut self, index: usize, value: Option<Value>) -> Result<Option<Value>> {
        if index >= self.fields.len() {
            return Err(self.out_of_range(index));
        }
        Ok(std::mem::replace(&mut self.fields[index].value, value))
    }

    /// Length the record would have after `grow_to(index)`, or `None` if the
    /// schema has no such position.
    pub fn len_to_reach(&self, index: usize) -> Option<usize> {
        if index < self.fields.len() {
            return Some(self.fields.len());
        }
        self.schema.field_at(index)?;
        let base = self.schema.base_len();
        if index < base {
            return Some(index + 1);
        }
        let size = self.schema.group_size();
        let groups = (index - base) / size + 1;
        Some(base + groups * size)
    }

    /// Push empty fields until `index` exists. In the extensible region whole
    /// groups are pushed.
    pub fn grow_to(&mut self, index: usize) -> Result<()> {
        let target = self.len_to_reach(index).ok_or_else(|| self.out_of_range(index))?;
        self.fields.resize_with(target, Field::default);
        Ok(())
    }

    /// Number of complete extensible groups stored.
    pub fn num_groups(&self) -> usize {
        let size = self.schema.group_size();
        if size == 0 {
            return 0;
        }
        self.fields.len().saturating_sub(self.schema.base_len()) / size
    }

    /// Whether another group may be pushed.
    pub fn can_push_group(&self) -> bool {
        match &self.schema.extensible {
            Some(group) => group.max_groups.is_none_or(|max| self.num_groups() < max),
            None => false,
        }
    }

    /// Whether the last group may be popped.
    pub fn can_pop_group(&self) -> bool {
        match &self.schema.extensible {
            Some(group) => self.num_groups() > group.min_groups,
            None => false,
        }
    }

    /// Append one whole extensible group. Missing trailing values are stored
    /// as absent. Fixed fields are padded first.
    pub fn push_group(&mut self, values: Vec<Option<Value>>) -> Result<()> {
        let size = self.schema.group_size();
        if !self.can_push_group() {
            return Err(Error::SchemaViolation {
                record: Some(self.id),
                field: None,
                message: format!("{} cannot hold another extensible group", self.schema.name),
            });
        }
        if values.len() > size {
            return Err(Error::SchemaViolation {
                record: Some(self.id),
                field: None,
                message: format!("group of {} values exceeds group size {size}", values.len()),
            });
        }
        let base = self.schema.base_len();
        if self.fields.len() < base {
            self.fields.resize_with(base, Field::default);
        }
        let pad = size - values.len();
        self.fields.extend(values.into_iter().map(|value| Field { value, comment: None }));
        self.fields.extend(std::iter::repeat_with(Field::default).take(pad));
        Ok(())
    }

    /// Remove the last extensible group, returning its values. Returns an
    /// empty vector, leaving the record untouched, when that would drop
    /// below the group minimum.
    pub fn pop_group(&mut self) -> Vec<Option<Value>> {
        if !self.can_pop_group() {
            return Vec::new();
        }
        let start = self.fields.len() - self.schema.group_size();
        self.fields.drain(start..).map(|f| f.value).collect()
    }

    /// Indices of required fields that are absent and have no default.
    ///
    /// Pointer fields never have defaults, so an unset required pointer is
    /// always reported.
    pub fn missing_required(&self) -> Vec<usize> {
        let len = self.fields.len().max(self.schema.base_len());
        (0..len)
            .filter(|&i| {
                let Some(desc) = self.schema.field_at(i) else { return false };
                desc.required
                    && desc.default.is_none()
                    && self.fields.get(i).is_none_or(|f| f.value.is_none())
            })
            .collect()
    }
}
