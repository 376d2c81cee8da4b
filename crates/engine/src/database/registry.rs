//! Collection registry of one database
//!
//! Names are unique per database. The registry only tracks handles; the
//! documents themselves live in the substrate.

use crate::collection::Collection;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use stratadex_core::{Error, Result};

/// Defined collections by name
#[derive(Default)]
pub(crate) struct CollectionRegistry {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl CollectionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a collection; a taken name is a validation error
    pub(crate) fn register(&self, collection: Collection) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(collection.name()) {
            return Err(Error::validation(format!(
                "collection '{}' is already defined",
                collection.name()
            )));
        }
        collections.insert(collection.name().to_string(), collection);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<Collection> {
        self.collections.read().get(name).cloned()
    }

    /// Every collection, ordered by name
    pub(crate) fn all(&self) -> Vec<Collection> {
        self.collections.read().values().cloned().collect()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::{CollectionOptions, Database};

    #[test]
    fn test_collections_are_listed_by_name() {
        let db = Database::in_memory();
        db.collection("b", CollectionOptions::new()).unwrap();
        db.collection("a", CollectionOptions::new()).unwrap();
        let names: Vec<String> = db.collections().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(db.get_collection("c").is_none());
    }
}
