//! Module: partition
//! Responsibility: horizontal partitioning of a collection and the
//! uniqueness semantics that survive it.
//! Does not own: per-partition index maintenance (each partition is a full
//! collection with its own catalog and stores).
//! Boundary: unique indexes are enforced per partition; global uniqueness
//! exists only when routing already pins each candidate key to a single
//! partition (partition key is a prefix of the unique key pattern).

use crate::{
    db::{
        catalog::{DropAllOutcome, DropTarget},
        collection::{Collection, CreateIndexOutcome, DropIndexOutcome},
        query::Query,
        reindex::ReindexOutcome,
    },
    document::{Document, DocumentId},
    error::EngineError,
    model::index::IndexDescriptor,
    value::Value,
};
use xxhash_rust::xxh3::Xxh3;

///
/// PartitionKey
///
/// Ordered field list documents are routed by.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionKey(Vec<String>);

impl PartitionKey {
    pub fn new(
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, EngineError> {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(EngineError::invalid_spec("partition key is empty"));
        }

        Ok(Self(fields))
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.0
    }
}

///
/// PartitionedCollection
///
/// A collection split across partitions by a hash of the partition-key
/// values. Every partition owns a complete index set, which is what makes
/// uniqueness per-partition by construction.
///

pub struct PartitionedCollection {
    key: PartitionKey,
    partitions: Vec<Collection>,
}

impl PartitionedCollection {
    pub fn create(
        name: impl Into<String>,
        key: PartitionKey,
        partition_count: usize,
    ) -> Result<Self, EngineError> {
        if partition_count == 0 {
            return Err(EngineError::invalid_spec("partition count must be at least 1"));
        }

        let name = name.into();
        let mut partitions = Vec::with_capacity(partition_count);
        for i in 0..partition_count {
            partitions.push(Collection::create(format!("{name}.p{i}"))?);
        }

        Ok(Self { key, partitions })
    }

    #[must_use]
    pub fn partition_key(&self) -> &PartitionKey {
        &self.key
    }

    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Route a full partition-key value set to its owning partition.
    /// Every key maps to exactly one partition, deterministically.
    #[must_use]
    pub fn route_values(&self, values: &[Value]) -> usize {
        let mut hasher = Xxh3::with_seed(0);
        for value in values {
            value.hash_into(&mut hasher);
        }

        usize::try_from(hasher.digest() % self.partitions.len() as u64).unwrap_or(0)
    }

    /// Route a document by its partition-key fields; a missing field routes
    /// as `Null`, mirroring key extraction.
    #[must_use]
    pub fn route(&self, document: &Document) -> usize {
        let values: Vec<Value> = self
            .key
            .fields()
            .iter()
            .map(|field| document.get(field).cloned().unwrap_or(Value::Null))
            .collect();

        self.route_values(&values)
    }

    pub fn insert(&self, document: Document) -> Result<(), EngineError> {
        let partition = self.route(&document);
        self.partitions[partition].insert(document)
    }

    /// Update in place. Mutating a partition-key field so the document
    /// would re-route is not supported.
    pub fn update(&self, document: Document) -> Result<(), EngineError> {
        let id = document
            .id()
            .ok_or_else(|| EngineError::maintain_invariant("document is missing its identity"))?;

        let Some(owner) = self.owner_of(id) else {
            return Err(EngineError::document_not_found(id));
        };

        if self.route(&document) != owner {
            return Err(EngineError::new(
                crate::error::ErrorClass::Unsupported,
                crate::error::ErrorOrigin::Partition,
                format!("update would re-route document {id} to another partition"),
            ));
        }

        self.partitions[owner].update(document)
    }

    pub fn delete(&self, id: DocumentId) -> Result<bool, EngineError> {
        match self.owner_of(id) {
            Some(owner) => self.partitions[owner].delete(id),
            None => Ok(false),
        }
    }

    #[must_use]
    pub fn get(&self, id: DocumentId) -> Option<Document> {
        self.partitions.iter().find_map(|p| p.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.iter().map(Collection::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(Collection::is_empty)
    }

    /// Ensure an index on every partition.
    ///
    /// Caller-visible limitation: a unique index whose key pattern is not
    /// prefixed by the partition key is enforced within each partition
    /// only; duplicates CAN occur across partitions. Use
    /// [`Self::create_index_global`] to insist on a global guarantee.
    pub fn create_index(
        &self,
        descriptor: IndexDescriptor,
    ) -> Result<Vec<CreateIndexOutcome>, EngineError> {
        self.partitions
            .iter()
            .map(|partition| partition.create_index(descriptor.clone()))
            .collect()
    }

    /// Ensure an index whose uniqueness must hold across the whole
    /// collection. Fails with the cross-partition limitation when the
    /// engine cannot provide that guarantee.
    pub fn create_index_global(
        &self,
        descriptor: IndexDescriptor,
    ) -> Result<Vec<CreateIndexOutcome>, EngineError> {
        if !descriptor.partition_compatible(self.key.fields()) {
            return Err(EngineError::cross_partition_unsupported(&descriptor.name));
        }

        self.create_index(descriptor)
    }

    pub fn drop_index(&self, target: &DropTarget) -> Result<DropIndexOutcome, EngineError> {
        let mut outcome = None;
        for partition in &self.partitions {
            outcome = Some(partition.drop_index(target)?);
        }

        outcome.ok_or_else(|| EngineError::index_not_found(target.to_string()))
    }

    pub fn drop_all_indexes(&self) -> Result<DropAllOutcome, EngineError> {
        let mut outcome = None;
        for partition in &self.partitions {
            outcome = Some(partition.drop_all_indexes()?);
        }

        outcome.ok_or_else(|| EngineError::maintain_invariant("collection has no partitions"))
    }

    pub fn reindex(&self) -> Result<Vec<ReindexOutcome>, EngineError> {
        self.partitions.iter().map(Collection::reindex).collect()
    }

    #[must_use]
    pub fn list_indexes(&self) -> Vec<IndexDescriptor> {
        self.partitions
            .first()
            .map(Collection::list_indexes)
            .unwrap_or_default()
    }

    /// Scatter-gather find across all partitions, in partition order.
    pub fn find(&self, query: &Query) -> Result<Vec<Document>, EngineError> {
        let mut results = Vec::new();
        for partition in &self.partitions {
            results.extend(partition.find(query)?);
        }

        Ok(results)
    }

    fn owner_of(&self, id: DocumentId) -> Option<usize> {
        self.partitions
            .iter()
            .position(|partition| partition.get(id).is_some())
    }
}
