//! Module: build
//! Responsibility: constructing an index's physical representation from
//! existing collection data, foreground or background.
//! Does not own: catalog create/drop decisions or mutation planning.
//! Boundary: admitted by the collection; feeds and finalizes one store.

use crate::{
    db::{
        catalog::BuildState,
        collection::CollectionInner,
        index::{IndexEntry, IndexKey, IndexStore, KeyProjection, extract_key},
    },
    document::DocumentId,
    error::EngineError,
    model::index::IndexDescriptor,
    obs::sink::{BuildPhase, MetricsEvent, record},
};
use chrono::{DateTime, Utc};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use ulid::Ulid;

///
/// BuildConfig
///
/// Configuration surface for one build attempt. `drop_dups` is destructive
/// and must be opted into explicitly: it removes all but one conflicting
/// document's entries from a unique index instead of failing the build.
///

#[derive(Clone, Copy, Debug)]
pub struct BuildConfig {
    pub batch_size: usize,
    pub drop_dups: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            drop_dups: false,
        }
    }
}

///
/// BuildMode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildMode {
    Foreground,
    Background,
}

///
/// BuildReport
///

#[derive(Clone, Debug)]
pub struct BuildReport {
    pub build_id: Ulid,
    pub index: String,
    pub mode: BuildMode,
    pub documents_scanned: u64,
    pub duplicates_dropped: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

///
/// BuildProgress
///
/// Poll surface for one admitted build. `Absent` means the attempt is fully
/// rolled back; no partial descriptor is visible to queries.
///

#[derive(Clone, Debug)]
pub enum BuildProgress {
    Building { documents_scanned: u64 },
    Ready(BuildReport),
    Absent { reason: String },
}

/// Mint a build id from wall-clock milliseconds plus a process-local
/// sequence, keeping ids unique without a random source.
pub(crate) fn mint_build_id(now: DateTime<Utc>) -> Ulid {
    static SEQ: AtomicU64 = AtomicU64::new(0);

    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);

    Ulid::from_parts(millis, u128::from(seq))
}

///
/// BuildStep
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BuildStep {
    /// One batch scanned; more documents remain below the snapshot token.
    Scanned(u64),
    /// The scan has reached the snapshot token.
    Drained,
}

///
/// BackgroundBuild
///
/// One admitted background build, driven batch by batch. Between steps the
/// collection lock is released, so ordinary mutation traffic interleaves
/// with the scan; the maintainer routes that traffic to the building store
/// and the scan's idempotent upserts make re-application a no-op.
///

pub(crate) struct BackgroundBuild {
    shared: Arc<Mutex<CollectionInner>>,
    descriptor: IndexDescriptor,
    config: BuildConfig,
    snapshot_token: Option<DocumentId>,
    cursor: Option<DocumentId>,
    documents_scanned: u64,
    duplicates_dropped: u64,
    build_id: Ulid,
    started_at: DateTime<Utc>,
}

impl BackgroundBuild {
    /// Admission happens with the collection lock held by the caller; the
    /// snapshot token is the highest id present at that point.
    pub(crate) fn admit(
        shared: Arc<Mutex<CollectionInner>>,
        descriptor: IndexDescriptor,
        config: BuildConfig,
        snapshot_token: Option<DocumentId>,
    ) -> Self {
        let started_at = Utc::now();

        record(MetricsEvent::Build {
            phase: BuildPhase::Started,
            index: descriptor.name.clone(),
        });

        Self {
            shared,
            descriptor,
            config,
            snapshot_token,
            cursor: None,
            documents_scanned: 0,
            duplicates_dropped: 0,
            build_id: mint_build_id(started_at),
            started_at,
        }
    }

    #[must_use]
    pub(crate) fn index_name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub(crate) const fn documents_scanned(&self) -> u64 {
        self.documents_scanned
    }

    /// Scan one batch below the snapshot token. A duplicate key on a unique
    /// build without the destructive override fails the step; the driver
    /// must then call [`Self::abort`].
    pub(crate) fn step(&mut self) -> Result<BuildStep, EngineError> {
        let Some(token) = self.snapshot_token else {
            return Ok(BuildStep::Drained);
        };

        let shared = Arc::clone(&self.shared);
        let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);

        let lower = match self.cursor {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Unbounded,
        };

        // Phase 1: project the batch's keys from current document state.
        let batch: Vec<(DocumentId, KeyProjection)> = inner
            .documents
            .range((lower, Bound::Included(token)))
            .take(self.config.batch_size)
            .map(|(id, doc)| (*id, extract_key(&self.descriptor, doc)))
            .collect();

        if batch.is_empty() {
            return Ok(BuildStep::Drained);
        }

        // Phase 2: idempotent upserts into the building store.
        let scanned = batch.len() as u64;
        let store = inner.stores.ensure(&self.descriptor.name);
        for (id, projection) in batch {
            self.cursor = Some(id);

            let Some(key) = projection.into_key() else {
                continue;
            };
            store.upsert(key.clone(), id);

            let owners = store.get(&key).map_or(0, IndexEntry::len);
            if self.descriptor.unique && owners > 1 {
                if !self.config.drop_dups {
                    return Err(EngineError::duplicate_key(
                        &self.descriptor.name,
                        &self.descriptor.fields(),
                    ));
                }
                self.duplicates_dropped += prune_entry(store, &key);
            }
        }

        self.documents_scanned = self.documents_scanned.saturating_add(scanned);
        Ok(BuildStep::Scanned(scanned))
    }

    /// Verify and publish the build. Uniqueness is re-verified over the
    /// whole store because concurrent mutations may have landed duplicate
    /// owners the scan never saw together.
    pub(crate) fn finalize(mut self) -> Result<BuildReport, EngineError> {
        let shared = Arc::clone(&self.shared);
        let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);

        if self.descriptor.unique {
            let store = inner.stores.ensure(&self.descriptor.name);

            if self.config.drop_dups {
                self.duplicates_dropped += prune_all_duplicates(store);
            } else {
                let duplicate = store
                    .first_duplicate()
                    .map(|(_, entry)| entry.len());
                if let Some(owners) = duplicate {
                    let reason = format!("duplicate key with {owners} owners");
                    return Err(rollback(&mut inner, &self.descriptor.name, &reason));
                }
            }
        }

        if let Err(err) = inner
            .catalog
            .set_state(&self.descriptor.name, BuildState::Ready)
        {
            return Err(rollback(&mut inner, &self.descriptor.name, &err.to_string()));
        }
        inner.building_index = None;

        record(MetricsEvent::Build {
            phase: BuildPhase::Ready,
            index: self.descriptor.name.clone(),
        });

        Ok(BuildReport {
            build_id: self.build_id,
            index: self.descriptor.name,
            mode: BuildMode::Background,
            documents_scanned: self.documents_scanned,
            duplicates_dropped: self.duplicates_dropped,
            started_at: self.started_at,
            finished_at: Utc::now(),
        })
    }

    /// Roll the attempt back to `absent`: the store is dropped and the
    /// catalog entry removed before the error is surfaced.
    pub(crate) fn abort(self, reason: &str) -> EngineError {
        let shared = Arc::clone(&self.shared);
        let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);

        rollback(&mut inner, &self.descriptor.name, reason)
    }
}

fn rollback(inner: &mut CollectionInner, index: &str, reason: &str) -> EngineError {
    inner.stores.drop_store(index);
    // The entry may already be gone if the catalog rejected the transition.
    let _ = inner.catalog.remove_entry(index);
    inner.building_index = None;

    record(MetricsEvent::Build {
        phase: BuildPhase::Aborted,
        index: index.to_string(),
    });

    EngineError::build_aborted(index, reason)
}

/// Remove all but the first (lowest-id) owner at `key`.
fn prune_entry(store: &mut IndexStore, key: &IndexKey) -> u64 {
    let Some(entry) = store.get(key) else {
        return 0;
    };
    let Some(keep) = entry.first() else {
        return 0;
    };

    let extras: Vec<DocumentId> = entry.iter_ids().filter(|id| *id != keep).collect();
    let mut dropped = 0u64;
    for id in extras {
        if store.remove_if_present(key, id) {
            dropped += 1;
        }
    }

    dropped
}

fn prune_all_duplicates(store: &mut IndexStore) -> u64 {
    let dup_keys: Vec<_> = store
        .iter()
        .filter(|(_, entry)| entry.len() > 1)
        .map(|(key, _)| key.clone())
        .collect();

    let mut dropped = 0u64;
    for key in dup_keys {
        dropped += prune_entry(store, &key);
    }

    dropped
}

/// Build one index in the foreground: the caller holds the collection lock
/// for the whole duration, so no concurrent mutation is visible.
///
/// Rollback on failure is the caller's responsibility; this function only
/// populates the (pre-ensured, empty) store.
pub(crate) fn build_foreground(
    inner: &mut CollectionInner,
    descriptor: &IndexDescriptor,
    config: &BuildConfig,
) -> Result<(u64, u64), EngineError> {
    let mut scanned = 0u64;
    let mut dropped = 0u64;

    let projections: Vec<(DocumentId, KeyProjection)> = inner
        .documents
        .iter()
        .map(|(id, doc)| (*id, extract_key(descriptor, doc)))
        .collect();

    let store = inner.stores.ensure(&descriptor.name);

    for (id, projection) in projections {
        scanned += 1;

        let Some(key) = projection.into_key() else {
            continue;
        };
        store.upsert(key.clone(), id);

        let owners = store.get(&key).map_or(0, IndexEntry::len);
        if descriptor.unique && owners > 1 {
            if !config.drop_dups {
                return Err(EngineError::duplicate_key(
                    &descriptor.name,
                    &descriptor.fields(),
                ));
            }
            dropped += prune_entry(store, &key);
        }
    }

    Ok((scanned, dropped))
}

///
/// BuildHandle
///
/// Handle to one background build running on a worker thread. The admitting
/// caller is never blocked; `wait` joins cooperatively and `cancel` takes
/// effect between batches.
///

#[derive(Debug)]
pub struct BuildHandle {
    index: String,
    status: Arc<Mutex<BuildProgress>>,
    cancel: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl BuildHandle {
    pub(crate) fn spawn(build: BackgroundBuild) -> Self {
        let index = build.index_name().to_string();
        let status = Arc::new(Mutex::new(BuildProgress::Building {
            documents_scanned: 0,
        }));
        let cancel = Arc::new(AtomicBool::new(false));

        let thread_status = Arc::clone(&status);
        let thread_cancel = Arc::clone(&cancel);
        let join = std::thread::spawn(move || {
            run_background(build, &thread_status, &thread_cancel);
        });

        Self {
            index,
            status,
            cancel,
            join: Mutex::new(Some(join)),
        }
    }

    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Current progress snapshot.
    #[must_use]
    pub fn poll(&self) -> BuildProgress {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Request cooperative cancellation; honoured between batches.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Block until the build settles, returning the report or the abort.
    pub fn wait(&self) -> Result<BuildReport, EngineError> {
        let handle = self
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            return Err(EngineError::build_aborted(&self.index, "worker panicked"));
        }

        match self.poll() {
            BuildProgress::Ready(report) => Ok(report),
            BuildProgress::Absent { reason } => {
                Err(EngineError::build_aborted(&self.index, reason))
            }
            BuildProgress::Building { .. } => Err(EngineError::build_aborted(
                &self.index,
                "worker exited without settling the build",
            )),
        }
    }
}

fn run_background(
    mut build: BackgroundBuild,
    status: &Arc<Mutex<BuildProgress>>,
    cancel: &Arc<AtomicBool>,
) {
    let set_status = |progress: BuildProgress| {
        let mut slot = status.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = progress;
    };

    loop {
        if cancel.load(Ordering::SeqCst) {
            let err = build.abort("cancelled");
            set_status(BuildProgress::Absent {
                reason: err.to_string(),
            });
            return;
        }

        match build.step() {
            Ok(BuildStep::Scanned(_)) => {
                set_status(BuildProgress::Building {
                    documents_scanned: build.documents_scanned(),
                });
            }
            Ok(BuildStep::Drained) => break,
            Err(err) => {
                let err = build.abort(&err.to_string());
                set_status(BuildProgress::Absent {
                    reason: err.to_string(),
                });
                return;
            }
        }
    }

    match build.finalize() {
        Ok(report) => set_status(BuildProgress::Ready(report)),
        Err(err) => set_status(BuildProgress::Absent {
            reason: err.to_string(),
        }),
    }
}
