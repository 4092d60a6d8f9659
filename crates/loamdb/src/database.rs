use loamdb_core::{
    db::{Collection, PartitionKey, PartitionedCollection},
    error::EngineError,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

///
/// Database
///
/// Named-collection registry. Collections are created on first access and
/// handles are cheap clones over shared state.
///

#[derive(Default)]
pub struct Database {
    collections: Mutex<BTreeMap<String, Collection>>,
}

impl Database {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a collection handle, creating the collection on first access.
    pub fn collection(&self, name: &str) -> Result<Collection, EngineError> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(collection) = collections.get(name) {
            return Ok(collection.clone());
        }

        let collection = Collection::create(name)?;
        collections.insert(name.to_string(), collection.clone());

        Ok(collection)
    }

    /// Create a partitioned collection. Unlike [`Self::collection`] this is
    /// explicit: the partition key and count are schema decisions.
    pub fn partitioned_collection(
        &self,
        name: &str,
        key: PartitionKey,
        partition_count: usize,
    ) -> Result<PartitionedCollection, EngineError> {
        PartitionedCollection::create(name, key, partition_count)
    }

    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::Database;
    use loamdb_core::{
        db::Query,
        document::{Document, DocumentId},
        model::index::{Direction, IndexDescriptor},
    };

    #[test]
    fn collection_handles_share_state() {
        let db = Database::new();

        let a = db.collection("products").expect("first handle");
        let b = db.collection("products").expect("second handle");

        a.insert(Document::new(DocumentId::new(1)).with_field("item", "apple"))
            .expect("insert through first handle");
        assert_eq!(b.len(), 1);
        assert_eq!(db.collection_names(), vec!["products".to_string()]);
    }

    #[test]
    fn end_to_end_index_lifecycle() {
        let db = Database::new();
        let products = db.collection("products").expect("collection");

        products
            .create_index(
                IndexDescriptor::new("item_1")
                    .field("item", Direction::Asc)
                    .unique(),
            )
            .expect("create index");
        products
            .insert(Document::new(DocumentId::new(1)).with_field("item", "apple"))
            .expect("insert");

        let err = products
            .insert(Document::new(DocumentId::new(2)).with_field("item", "apple"))
            .expect_err("duplicate item must be rejected");
        assert!(err.is_duplicate_key());

        let report = products
            .explain(&Query::new().eq("item", "apple"))
            .expect("explain");
        assert_eq!(report.index_used.as_deref(), Some("item_1"));
        assert_eq!(report.documents_returned, 1);
    }
}
