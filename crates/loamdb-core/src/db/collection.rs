use crate::{
    db::{
        build::{
            BackgroundBuild, BuildConfig, BuildHandle, BuildMode, BuildReport, build_foreground,
            mint_build_id,
        },
        catalog::{
            BuildState, Catalog, CatalogStorage, CreateOutcome, DropAllOutcome, DropTarget,
            MemoryCatalogStorage,
        },
        index::IndexStoreRegistry,
        maintain, query,
        query::{ExplainReport, Query},
        reindex::{self, ReindexOutcome},
    },
    document::{Document, DocumentId},
    error::EngineError,
    model::index::IndexDescriptor,
    obs::sink::{BuildPhase, ExecKind, MetricsEvent, record},
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

///
/// CollectionInner
///
/// State shared between the collection handle and background build workers.
/// All access is serialized through one lock; background builds hold it per
/// batch only, letting mutation traffic interleave with the scan.
///

pub(crate) struct CollectionInner {
    pub(crate) name: String,
    pub(crate) documents: BTreeMap<DocumentId, Document>,
    pub(crate) catalog: Catalog,
    pub(crate) stores: IndexStoreRegistry,
    /// Name of the index whose structural change is in flight, if any.
    /// At most one per collection.
    pub(crate) building_index: Option<String>,
}

///
/// CreateIndexOutcome
///

#[derive(Debug)]
pub enum CreateIndexOutcome {
    /// Ensure semantics: an identical specification already exists.
    AlreadyExists,
    /// Foreground build completed; the index is ready.
    Ready(BuildReport),
    /// Background build admitted; poll or wait on the handle.
    Building(BuildHandle),
}

///
/// DropIndexOutcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DropIndexOutcome {
    /// Index count immediately before the drop.
    pub n_indexes_was: usize,
}

///
/// Collection
///
/// One document collection and its index set. Handles are cheap clones over
/// shared state.
///

#[derive(Clone)]
pub struct Collection {
    shared: Arc<Mutex<CollectionInner>>,
}

impl Collection {
    /// Create a collection with in-process catalog storage.
    pub fn create(name: impl Into<String>) -> Result<Self, EngineError> {
        Self::with_storage(name, Box::new(MemoryCatalogStorage::new()))
    }

    /// Create a collection persisting its catalog through `storage`.
    pub fn with_storage(
        name: impl Into<String>,
        storage: Box<dyn CatalogStorage>,
    ) -> Result<Self, EngineError> {
        let catalog = Catalog::new(storage)?;
        Ok(Self::from_catalog(name.into(), catalog))
    }

    /// Reopen a collection from previously persisted catalog state.
    ///
    /// Physical entries are never trusted across a reopen: descriptors come
    /// back with their persisted build states and [`Self::pending_builds`]
    /// lists the ones needing a redo via [`Self::resume_pending_builds`].
    pub fn open(
        name: impl Into<String>,
        storage: Box<dyn CatalogStorage>,
    ) -> Result<Self, EngineError> {
        let catalog = Catalog::open(storage)?;
        Ok(Self::from_catalog(name.into(), catalog))
    }

    fn from_catalog(name: String, catalog: Catalog) -> Self {
        let mut stores = IndexStoreRegistry::new();
        for entry in catalog.entries() {
            stores.ensure(&entry.descriptor.name);
        }

        Self {
            shared: Arc::new(Mutex::new(CollectionInner {
                name,
                documents: BTreeMap::new(),
                catalog,
                stores,
                building_index: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CollectionInner> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().documents.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: DocumentId) -> Option<Document> {
        self.lock().documents.get(&id).cloned()
    }

    /// Insert one document. All-or-nothing across the index set: a unique
    /// conflict leaves every index and the document store untouched.
    pub fn insert(&self, document: Document) -> Result<(), EngineError> {
        record(MetricsEvent::Exec {
            kind: ExecKind::Insert,
        });

        let mut guard = self.lock();
        let inner = &mut *guard;
        let id = require_identity(&document)?;

        if inner.documents.contains_key(&id) {
            return Err(EngineError::duplicate_key(
                crate::model::index::PRIMARY_INDEX_NAME,
                &[crate::document::ID_FIELD],
            ));
        }

        maintain::apply_mutation(&inner.catalog, &mut inner.stores, None, Some(&document))?;
        inner.documents.insert(id, document);

        Ok(())
    }

    /// Replace one document by identity. Unique constraints are re-checked
    /// only for indexes whose extracted key actually changed.
    pub fn update(&self, document: Document) -> Result<(), EngineError> {
        record(MetricsEvent::Exec {
            kind: ExecKind::Update,
        });

        let mut guard = self.lock();
        let inner = &mut *guard;
        let id = require_identity(&document)?;

        let before = inner
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::document_not_found(id))?;

        maintain::apply_mutation(
            &inner.catalog,
            &mut inner.stores,
            Some(&before),
            Some(&document),
        )?;
        inner.documents.insert(id, document);

        Ok(())
    }

    /// Delete by identity. Idempotent: deleting an absent document returns
    /// `false` and touches nothing.
    pub fn delete(&self, id: DocumentId) -> Result<bool, EngineError> {
        record(MetricsEvent::Exec {
            kind: ExecKind::Delete,
        });

        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(before) = inner.documents.get(&id).cloned() else {
            return Ok(false);
        };

        maintain::apply_mutation(&inner.catalog, &mut inner.stores, Some(&before), None)?;
        inner.documents.remove(&id);

        Ok(true)
    }

    /// Ensure an index exists, building it with the default configuration.
    pub fn create_index(
        &self,
        descriptor: IndexDescriptor,
    ) -> Result<CreateIndexOutcome, EngineError> {
        self.create_index_with(descriptor, BuildConfig::default())
    }

    /// Ensure an index exists with an explicit build configuration.
    ///
    /// `descriptor.background` selects the build mode: foreground blocks the
    /// collection and returns `Ready`; background returns a handle while the
    /// scan interleaves with live traffic.
    pub fn create_index_with(
        &self,
        descriptor: IndexDescriptor,
        config: BuildConfig,
    ) -> Result<CreateIndexOutcome, EngineError> {
        if descriptor.background {
            return match self.admit_background_build(descriptor, config)? {
                Some(build) => Ok(CreateIndexOutcome::Building(BuildHandle::spawn(build))),
                None => Ok(CreateIndexOutcome::AlreadyExists),
            };
        }

        let mut inner = self.lock();
        if let Some(building) = &inner.building_index {
            return Err(EngineError::build_in_flight(building));
        }

        if inner.catalog.create(descriptor.clone())? == CreateOutcome::AlreadyExists {
            return Ok(CreateIndexOutcome::AlreadyExists);
        }

        record(MetricsEvent::Build {
            phase: BuildPhase::Started,
            index: descriptor.name.clone(),
        });
        let started_at = Utc::now();
        inner.stores.ensure(&descriptor.name);

        match build_foreground(&mut inner, &descriptor, &config) {
            Ok((scanned, dropped)) => {
                inner
                    .catalog
                    .set_state(&descriptor.name, BuildState::Ready)?;

                record(MetricsEvent::Build {
                    phase: BuildPhase::Ready,
                    index: descriptor.name.clone(),
                });

                Ok(CreateIndexOutcome::Ready(BuildReport {
                    build_id: mint_build_id(started_at),
                    index: descriptor.name,
                    mode: BuildMode::Foreground,
                    documents_scanned: scanned,
                    duplicates_dropped: dropped,
                    started_at,
                    finished_at: Utc::now(),
                }))
            }
            Err(err) => {
                // Full rollback: no partial descriptor is visible.
                inner.stores.drop_store(&descriptor.name);
                let _ = inner.catalog.remove_entry(&descriptor.name);

                record(MetricsEvent::Build {
                    phase: BuildPhase::Aborted,
                    index: descriptor.name.clone(),
                });

                Err(err)
            }
        }
    }

    /// Admit a background build without spawning its worker. Returns `None`
    /// when an identical specification already exists.
    pub(crate) fn admit_background_build(
        &self,
        descriptor: IndexDescriptor,
        config: BuildConfig,
    ) -> Result<Option<BackgroundBuild>, EngineError> {
        let snapshot_token;
        {
            let mut inner = self.lock();
            if let Some(building) = &inner.building_index {
                return Err(EngineError::build_in_flight(building));
            }

            if inner.catalog.create(descriptor.clone())? == CreateOutcome::AlreadyExists {
                return Ok(None);
            }

            inner
                .catalog
                .set_state(&descriptor.name, BuildState::Building)?;
            inner.stores.ensure(&descriptor.name);
            inner.building_index = Some(descriptor.name.clone());

            snapshot_token = inner.documents.keys().next_back().copied();
        }

        Ok(Some(BackgroundBuild::admit(
            Arc::clone(&self.shared),
            descriptor,
            config,
            snapshot_token,
        )))
    }

    /// Drop one index by name or exact key pattern.
    pub fn drop_index(&self, target: &DropTarget) -> Result<DropIndexOutcome, EngineError> {
        let mut inner = self.lock();
        if let Some(building) = &inner.building_index {
            return Err(EngineError::build_in_flight(building));
        }

        let n_indexes_was = inner.catalog.n_indexes();
        let names: Vec<String> = inner
            .catalog
            .list()
            .into_iter()
            .filter(|descriptor| match target {
                DropTarget::Name(name) => descriptor.name == *name,
                DropTarget::KeyPattern(pattern) => descriptor.key_pattern == *pattern,
            })
            .map(|descriptor| descriptor.name)
            .collect();

        inner.catalog.drop_target(target)?;
        for name in names {
            inner.stores.drop_store(&name);
        }

        Ok(DropIndexOutcome { n_indexes_was })
    }

    /// Drop every secondary index; the primary survives with its entries.
    pub fn drop_all_indexes(&self) -> Result<DropAllOutcome, EngineError> {
        let mut inner = self.lock();
        if let Some(building) = &inner.building_index {
            return Err(EngineError::build_in_flight(building));
        }

        let doomed: Vec<String> = inner
            .catalog
            .list()
            .into_iter()
            .filter(|descriptor| !descriptor.primary)
            .map(|descriptor| descriptor.name)
            .collect();

        let outcome = inner.catalog.drop_all()?;
        for name in doomed {
            inner.stores.drop_store(&name);
        }

        Ok(outcome)
    }

    /// Drop and rebuild every index, the primary included, in foreground.
    pub fn reindex(&self) -> Result<ReindexOutcome, EngineError> {
        let mut inner = self.lock();
        if let Some(building) = &inner.building_index {
            return Err(EngineError::build_in_flight(building));
        }

        reindex::reindex(&mut inner)
    }

    #[must_use]
    pub fn list_indexes(&self) -> Vec<IndexDescriptor> {
        self.lock().catalog.list()
    }

    /// Descriptors persisted as not yet ready (crash between acknowledgement
    /// and build completion).
    #[must_use]
    pub fn pending_builds(&self) -> Vec<IndexDescriptor> {
        self.lock().catalog.pending_builds()
    }

    /// Redo every unfinished build in foreground, marking each ready.
    pub fn resume_pending_builds(&self) -> Result<Vec<BuildReport>, EngineError> {
        let mut inner = self.lock();
        if let Some(building) = &inner.building_index {
            return Err(EngineError::build_in_flight(building));
        }

        let pending = inner.catalog.pending_builds();
        let mut reports = Vec::with_capacity(pending.len());

        for descriptor in pending {
            let started_at = Utc::now();
            inner.stores.ensure(&descriptor.name).clear();

            match build_foreground(&mut inner, &descriptor, &BuildConfig::default()) {
                Ok((scanned, dropped)) => {
                    inner
                        .catalog
                        .set_state(&descriptor.name, BuildState::Ready)?;
                    reports.push(BuildReport {
                        build_id: mint_build_id(started_at),
                        index: descriptor.name,
                        mode: BuildMode::Foreground,
                        documents_scanned: scanned,
                        duplicates_dropped: dropped,
                        started_at,
                        finished_at: Utc::now(),
                    });
                }
                Err(err) => {
                    inner.stores.drop_store(&descriptor.name);
                    let _ = inner.catalog.remove_entry(&descriptor.name);
                    return Err(err);
                }
            }
        }

        Ok(reports)
    }

    /// Execute an equality query through the planner.
    pub fn find(&self, query: &Query) -> Result<Vec<Document>, EngineError> {
        record(MetricsEvent::Exec {
            kind: ExecKind::Find,
        });

        let inner = self.lock();
        query::execute(&inner, query, None).map(|(documents, _)| documents)
    }

    /// Execute and return the plan/utilization projection.
    pub fn explain(&self, query: &Query) -> Result<ExplainReport, EngineError> {
        let inner = self.lock();
        query::execute(&inner, query, None).map(|(_, report)| report)
    }

    /// Execute forcing a specific index; fails when it is absent or not
    /// ready.
    pub fn hint(&self, query: &Query, index: &str) -> Result<ExplainReport, EngineError> {
        let inner = self.lock();
        query::execute(&inner, query, Some(index)).map(|(_, report)| report)
    }

    /// Run a closure with read access to the shared state. Test plumbing
    /// for store-level assertions.
    #[cfg(test)]
    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&CollectionInner) -> R) -> R {
        f(&self.lock())
    }
}

fn require_identity(document: &Document) -> Result<DocumentId, EngineError> {
    document
        .id()
        .ok_or_else(|| EngineError::maintain_invariant("document is missing its identity"))
}
