//! Module: reindex
//! Responsibility: atomic drop-all + foreground rebuild of a collection's
//! whole index set, the primary included.
//! Does not own: background scheduling; rebuilds always run foreground.
//! Boundary: called by the collection with the lock held for the duration.

use crate::{
    db::{
        build::{BuildConfig, build_foreground},
        catalog::BuildState,
        collection::CollectionInner,
    },
    error::EngineError,
    model::index::IndexDescriptor,
};

///
/// ReindexOutcome
///

#[derive(Clone, Debug)]
pub struct ReindexOutcome {
    pub n_indexes_was: usize,
    pub n_indexes: usize,
    pub indexes: Vec<IndexDescriptor>,
    pub ok: bool,
}

/// Drop and rebuild every index from current document state.
///
/// The primary is reseeded and rebuilt before any secondary, so a failure
/// mid-rebuild always leaves the collection with a recoverable primary plus
/// the subset of secondaries that already succeeded.
pub(crate) fn reindex(inner: &mut CollectionInner) -> Result<ReindexOutcome, EngineError> {
    let config = BuildConfig::default();

    // Phase 1: capture descriptors and reset the catalog to a pending
    // primary (persisted before any physical work).
    let captured = inner.catalog.reset_for_reindex()?;
    let n_indexes_was = captured.len();

    // Phase 2: drop all physical stores.
    for descriptor in &captured {
        inner.stores.drop_store(&descriptor.name);
    }

    // Phase 3: rebuild the primary first.
    let primary = IndexDescriptor::primary();
    inner.stores.ensure(&primary.name);
    build_foreground(inner, &primary, &config)?;
    inner.catalog.set_state(&primary.name, BuildState::Ready)?;

    // Phase 4: rebuild each captured secondary in foreground.
    for descriptor in captured.into_iter().filter(|d| !d.primary) {
        inner.catalog.create(descriptor.clone())?;
        inner.stores.ensure(&descriptor.name);

        match build_foreground(inner, &descriptor, &config) {
            Ok(_) => {
                inner
                    .catalog
                    .set_state(&descriptor.name, BuildState::Ready)?;
            }
            Err(err) => {
                // Surface partial failure; the primary and the succeeded
                // subset stay rebuilt and the caller can retry.
                inner.stores.drop_store(&descriptor.name);
                let _ = inner.catalog.remove_entry(&descriptor.name);
                return Err(err);
            }
        }
    }

    Ok(ReindexOutcome {
        n_indexes_was,
        n_indexes: inner.catalog.n_indexes(),
        indexes: inner.catalog.list(),
        ok: true,
    })
}
