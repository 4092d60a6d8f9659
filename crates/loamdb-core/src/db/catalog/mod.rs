//! Module: catalog
//! Responsibility: the durable registry of index descriptors per collection.
//! Does not own: physical entry sets or build scheduling.
//! Boundary: every descriptor mutation is persisted before it is
//! acknowledged; the builder and coordinator drive state transitions.

mod codec;

pub use codec::CodecError;

use crate::{
    error::EngineError,
    model::index::{Direction, IndexDescriptor, PRIMARY_INDEX_NAME},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

///
/// BuildState
///
/// Descriptor lifecycle: `pending -> building -> ready`. A failed or
/// cancelled build removes the entry outright (`absent` is the absence of
/// the entry, not a stored state).
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum BuildState {
    Pending,
    Building,
    Ready,
}

///
/// CatalogEntry
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub descriptor: IndexDescriptor,
    pub state: BuildState,
}

///
/// CreateOutcome
///
/// Ensure semantics: creation never fails on re-submission of an identical
/// specification and never duplicates.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

///
/// DropAllOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DropAllOutcome {
    /// Index count immediately before the drop, primary included.
    pub n_indexes_was: usize,
    /// Descriptors surviving the drop (at minimum the primary).
    pub remaining: Vec<IndexDescriptor>,
}

///
/// DropTarget
///
/// Drop requests address an index either by name or by exact key pattern.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DropTarget {
    Name(String),
    KeyPattern(Vec<(String, Direction)>),
}

impl DropTarget {
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    #[must_use]
    pub fn key_pattern(pattern: impl IntoIterator<Item = (impl Into<String>, Direction)>) -> Self {
        Self::KeyPattern(
            pattern
                .into_iter()
                .map(|(field, dir)| (field.into(), dir))
                .collect(),
        )
    }

    fn matches(&self, descriptor: &IndexDescriptor) -> bool {
        match self {
            Self::Name(name) => descriptor.name == *name,
            Self::KeyPattern(pattern) => descriptor.key_pattern == *pattern,
        }
    }
}

impl fmt::Display for DropTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::KeyPattern(pattern) => {
                let fields = pattern
                    .iter()
                    .map(|(field, dir)| format!("{field} {dir}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({fields})")
            }
        }
    }
}

///
/// CatalogStorage
///
/// Durability port. The catalog hands a full encoded frame to this port on
/// every mutation and does not acknowledge until it returns.
///

pub trait CatalogStorage: Send {
    fn persist(&mut self, frame: &[u8]) -> Result<(), EngineError>;
    fn load(&self) -> Result<Option<Vec<u8>>, EngineError>;
}

///
/// MemoryCatalogStorage
///
/// Default in-process storage. Clones share the same frame slot, which lets
/// tests reopen a catalog from the bytes a previous instance persisted.
///

#[derive(Clone, Debug, Default)]
pub struct MemoryCatalogStorage {
    frame: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryCatalogStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogStorage for MemoryCatalogStorage {
    fn persist(&mut self, frame: &[u8]) -> Result<(), EngineError> {
        let mut slot = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(frame.to_vec());
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>, EngineError> {
        let slot = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.clone())
    }
}

///
/// Catalog
///
/// Ordered descriptor set for one collection. The primary entry is created
/// at construction and survives every drop path except a full reindex
/// reset, which immediately re-seeds it.
///

pub struct Catalog {
    entries: Vec<CatalogEntry>,
    storage: Box<dyn CatalogStorage>,
}

impl Catalog {
    /// Fresh catalog holding only the ready primary descriptor.
    pub fn new(storage: Box<dyn CatalogStorage>) -> Result<Self, EngineError> {
        let mut catalog = Self {
            entries: vec![CatalogEntry {
                descriptor: IndexDescriptor::primary(),
                state: BuildState::Ready,
            }],
            storage,
        };
        catalog.persist()?;

        Ok(catalog)
    }

    /// Reopen from persisted state, falling back to a fresh catalog when the
    /// storage has never been written. Descriptors persisted as not yet
    /// ready surface through [`Self::pending_builds`] for redo.
    pub fn open(storage: Box<dyn CatalogStorage>) -> Result<Self, EngineError> {
        let Some(frame) = storage.load()? else {
            return Self::new(storage);
        };

        let entries = codec::decode(&frame)?;
        if !entries.iter().any(|entry| entry.descriptor.primary) {
            return Err(EngineError::catalog_corruption(
                "persisted catalog is missing the primary descriptor",
            ));
        }

        Ok(Self { entries, storage })
    }

    /// Idempotent create over full-specification equality.
    pub fn create(&mut self, descriptor: IndexDescriptor) -> Result<CreateOutcome, EngineError> {
        if descriptor.primary {
            return Err(EngineError::invalid_spec(
                "the primary descriptor is reserved and cannot be created explicitly",
            ));
        }
        descriptor.validate()?;

        if self
            .entries
            .iter()
            .any(|entry| entry.descriptor.same_specification(&descriptor))
        {
            return Ok(CreateOutcome::AlreadyExists);
        }

        if self
            .entries
            .iter()
            .any(|entry| entry.descriptor.name == descriptor.name)
        {
            return Err(EngineError::invalid_spec(format!(
                "index name '{}' already exists with a different specification",
                descriptor.name
            )));
        }

        self.entries.push(CatalogEntry {
            descriptor,
            state: BuildState::Pending,
        });
        self.persist()?;

        Ok(CreateOutcome::Created)
    }

    /// Advance the build state of one entry.
    pub fn set_state(&mut self, name: &str, state: BuildState) -> Result<(), EngineError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.descriptor.name == name)
            .ok_or_else(|| EngineError::index_not_found(name))?;

        entry.state = state;
        self.persist()
    }

    /// Roll a failed or cancelled build back to `absent`.
    pub fn remove_entry(&mut self, name: &str) -> Result<bool, EngineError> {
        if name == PRIMARY_INDEX_NAME {
            return Err(EngineError::maintain_invariant(
                "primary descriptor cannot be rolled back",
            ));
        }

        let before = self.entries.len();
        self.entries.retain(|entry| entry.descriptor.name != name);
        let removed = self.entries.len() < before;

        if removed {
            self.persist()?;
        }

        Ok(removed)
    }

    /// Drop one index by name or exact key pattern, refusing the primary.
    pub fn drop_target(&mut self, target: &DropTarget) -> Result<usize, EngineError> {
        let matched: Vec<&CatalogEntry> = self
            .entries
            .iter()
            .filter(|entry| target.matches(&entry.descriptor))
            .collect();

        if matched.is_empty() {
            return Err(EngineError::index_not_found(target.to_string()));
        }
        if matched.iter().any(|entry| entry.descriptor.primary) {
            return Err(EngineError::new(
                crate::error::ErrorClass::Unsupported,
                crate::error::ErrorOrigin::Catalog,
                "cannot drop the primary index",
            ));
        }

        let before = self.entries.len();
        self.entries.retain(|entry| !target.matches(&entry.descriptor));
        let removed = before - self.entries.len();
        self.persist()?;

        Ok(removed)
    }

    /// Drop every non-primary descriptor.
    pub fn drop_all(&mut self) -> Result<DropAllOutcome, EngineError> {
        let n_indexes_was = self.entries.len();

        self.entries.retain(|entry| entry.descriptor.primary);
        self.persist()?;

        Ok(DropAllOutcome {
            n_indexes_was,
            remaining: self.list(),
        })
    }

    /// Capture all descriptors and reset to a pending primary. The reindex
    /// coordinator rebuilds from the returned set.
    pub fn reset_for_reindex(&mut self) -> Result<Vec<IndexDescriptor>, EngineError> {
        let captured = self.list();

        self.entries = vec![CatalogEntry {
            descriptor: IndexDescriptor::primary(),
            state: BuildState::Pending,
        }];
        self.persist()?;

        Ok(captured)
    }

    #[must_use]
    pub fn list(&self) -> Vec<IndexDescriptor> {
        self.entries
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.name == name)
    }

    #[must_use]
    pub fn is_ready(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|entry| entry.state == BuildState::Ready)
    }

    /// Descriptors persisted as not yet ready: candidates for build redo
    /// after a crash between acknowledgement and build completion.
    #[must_use]
    pub fn pending_builds(&self) -> Vec<IndexDescriptor> {
        self.entries
            .iter()
            .filter(|entry| entry.state != BuildState::Ready)
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    #[must_use]
    pub fn n_indexes(&self) -> usize {
        self.entries.len()
    }

    fn persist(&mut self) -> Result<(), EngineError> {
        let frame = codec::encode(&self.entries)?;
        self.storage.persist(&frame)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{
        BuildState, Catalog, CreateOutcome, DropTarget, MemoryCatalogStorage,
    };
    use crate::{
        error::ErrorClass,
        model::index::{Direction, IndexDescriptor, PRIMARY_INDEX_NAME},
    };

    fn catalog() -> Catalog {
        Catalog::new(Box::new(MemoryCatalogStorage::new())).expect("create catalog")
    }

    fn item_index() -> IndexDescriptor {
        IndexDescriptor::new("item_1").field("item", Direction::Asc)
    }

    #[test]
    fn create_is_idempotent_over_full_specification() {
        let mut catalog = catalog();

        assert_eq!(
            catalog.create(item_index()).expect("first create"),
            CreateOutcome::Created
        );
        assert_eq!(
            catalog.create(item_index()).expect("second create"),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(catalog.n_indexes(), 2);
    }

    #[test]
    fn same_name_different_specification_is_rejected() {
        let mut catalog = catalog();
        catalog.create(item_index()).expect("create");

        let err = catalog
            .create(item_index().unique())
            .expect_err("conflicting respecification must fail");
        assert_eq!(err.class, ErrorClass::InvalidSpecification);
    }

    #[test]
    fn drop_refuses_primary_by_name_and_pattern() {
        let mut catalog = catalog();

        let by_name = catalog
            .drop_target(&DropTarget::name(PRIMARY_INDEX_NAME))
            .expect_err("primary drop must fail");
        assert_eq!(by_name.class, ErrorClass::Unsupported);

        let by_pattern = catalog
            .drop_target(&DropTarget::key_pattern([("_id", Direction::Asc)]))
            .expect_err("primary drop by pattern must fail");
        assert_eq!(by_pattern.class, ErrorClass::Unsupported);
    }

    #[test]
    fn drop_missing_index_reports_not_found() {
        let mut catalog = catalog();

        let err = catalog
            .drop_target(&DropTarget::name("missing"))
            .expect_err("missing index drop must fail");
        assert!(err.is_index_not_found());
    }

    #[test]
    fn drop_all_reports_pre_drop_count_and_survivors() {
        let mut catalog = catalog();
        catalog.create(item_index()).expect("create item");
        catalog
            .create(IndexDescriptor::new("other_1").field("other", Direction::Asc))
            .expect("create other");

        let outcome = catalog.drop_all().expect("drop all");

        assert_eq!(outcome.n_indexes_was, 3);
        assert_eq!(outcome.remaining.len(), 1);
        assert!(outcome.remaining[0].primary);
    }

    #[test]
    fn reopen_surfaces_unfinished_builds() {
        let storage = MemoryCatalogStorage::new();
        {
            let mut catalog =
                Catalog::new(Box::new(storage.clone())).expect("create catalog");
            catalog.create(item_index()).expect("create");
            catalog
                .set_state("item_1", BuildState::Building)
                .expect("mark building");
        }

        let reopened = Catalog::open(Box::new(storage)).expect("reopen catalog");
        let pending = reopened.pending_builds();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "item_1");
    }

    #[test]
    fn reset_for_reindex_captures_and_reseeds_primary() {
        let mut catalog = catalog();
        catalog.create(item_index()).expect("create");

        let captured = catalog.reset_for_reindex().expect("reset");

        assert_eq!(captured.len(), 2);
        assert_eq!(catalog.n_indexes(), 1);
        let primary = catalog.get(PRIMARY_INDEX_NAME).expect("primary present");
        assert_eq!(primary.state, BuildState::Pending);
    }

    #[test]
    fn explicit_primary_create_is_rejected() {
        let mut catalog = catalog();

        let err = catalog
            .create(IndexDescriptor::primary())
            .expect_err("explicit primary create must fail");
        assert_eq!(err.class, ErrorClass::InvalidSpecification);
    }
}
