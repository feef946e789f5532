//! Case-insensitive name index.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::model::RecordId;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct NameIndex {
    by_name: HashMap<String, SmallVec<[RecordId; 2]>>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl NameIndex {
    pub fn insert(&mut self, name: &str, id: RecordId) {
        let ids = self.by_name.entry(key(name)).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub fn remove(&mut self, name: &str, id: RecordId) {
        let k = key(name);
        if let Some(ids) = self.by_name.get_mut(&k) {
            ids.retain(|i| *i != id);
            if ids.is_empty() {
                self.by_name.remove(&k);
            }
        }
    }

    /// Records currently holding `name`, in no particular order.
    pub fn get(&self, name: &str) -> &[RecordId] {
        self.by_name.get(&key(name)).map(|ids| ids.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let mut idx = NameIndex::default();
        let id = RecordId::new();
        idx.insert("Zone 1", id);
        assert_eq!(idx.get("ZONE 1"), &[id]);
        idx.remove("zone 1", id);
        assert!(idx.get("Zone 1").is_empty());
    }
}
