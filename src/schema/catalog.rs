//! In-memory schema catalog.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::Deserialize;

use super::{SchemaCatalog, TypeDescriptor};
use crate::{Error, Result};

/// Catalog backed by a map of descriptors.
///
/// Catalog order is `(rank, insertion order)`.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: HashMap<String, Arc<TypeDescriptor>>,
    /// Lowercased type names in catalog order.
    ordered: Vec<String>,
    inserted: u32,
    insertion: HashMap<String, u32>,
}

#[derive(Deserialize)]
struct CatalogFile {
    types: Vec<TypeDescriptor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_type(mut self, desc: TypeDescriptor) -> Result<Self> {
        self.insert(desc)?;
        Ok(self)
    }

    /// Validate and register a descriptor. Type names must be unique
    /// (case-insensitive).
    pub fn insert(&mut self, desc: TypeDescriptor) -> Result<()> {
        desc.validate()?;
        let key = desc.name.to_lowercase();
        if self.types.contains_key(&key) {
            return Err(Error::InvalidCatalog(format!("duplicate type {}", desc.name)));
        }
        self.insertion.insert(key.clone(), self.inserted);
        self.inserted += 1;
        self.types.insert(key.clone(), Arc::new(desc));
        self.ordered.push(key);

        let (types, insertion) = (&self.types, &self.insertion);
        self.ordered.sort_by_key(|k| (types[k].rank, insertion[k]));
        Ok(())
    }

    /// Load a catalog from `{"types": [ ... ]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for desc in file.types {
            catalog.insert(desc)?;
        }
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl SchemaCatalog for Catalog {
    fn describe(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(&type_name.to_lowercase()).cloned()
    }

    fn type_names(&self) -> Vec<String> {
        self.ordered.iter().map(|k| self.types[k].name.clone()).collect()
    }

    fn rank(&self, type_name: &str) -> Option<u32> {
        let key = type_name.to_lowercase();
        self.ordered.iter().position(|k| *k == key).map(|p| p as u32)
    }
}
