//! Module: maintain
//! Responsibility: preflight planning for deterministic index mutations.
//! Does not own: build scheduling or catalog state transitions.
//! Boundary: the collection calls this module for every document mutation.

mod unique;

use crate::{
    db::{
        catalog::{BuildState, Catalog},
        index::{IndexKey, IndexStoreRegistry, extract_key},
    },
    document::{Document, DocumentId},
    error::EngineError,
    obs::sink::{MetricsEvent, record},
};

///
/// IndexOp
///
/// One planned physical mutation against one index: remove the old key,
/// insert the new one, either side optional.
///

#[derive(Debug)]
pub(crate) struct IndexOp {
    pub index: String,
    pub id: DocumentId,
    pub remove: Option<IndexKey>,
    pub insert: Option<IndexKey>,
}

/// Plan all index mutations for a single document transition.
///
/// This function:
/// - Extracts old/new keys per applicable index
/// - Computes the key delta, skipping indexes whose key did not change
/// - Validates unique constraints against `ready` indexes
///
/// All fallible work happens here. The returned plan is safe to apply
/// infallibly, so a rejected mutation leaves every index untouched.
pub(crate) fn plan_document_mutation(
    catalog: &Catalog,
    stores: &IndexStoreRegistry,
    before: Option<&Document>,
    after: Option<&Document>,
) -> Result<Vec<IndexOp>, EngineError> {
    // Phase 1: derive and cross-check the document identity.
    let id = document_identity(before, after)?;

    let mut ops = Vec::with_capacity(catalog.n_indexes());

    // Phase 2: per-index extraction, delta, and unique validation.
    for entry in catalog.entries() {
        let descriptor = &entry.descriptor;

        let Some(store) = stores.get(descriptor.name.as_str()) else {
            if entry.state == BuildState::Ready {
                return Err(EngineError::index_corruption(format!(
                    "ready index '{}' has no physical store",
                    descriptor.name
                )));
            }
            // Only not-yet-ready descriptors may lack a store; the redo
            // build repopulates them from scratch.
            continue;
        };

        let old_key = before.and_then(|doc| extract_key(descriptor, doc).into_key());
        let new_key = after.and_then(|doc| extract_key(descriptor, doc).into_key());

        if old_key == new_key {
            continue;
        }

        if descriptor.unique
            && entry.state == BuildState::Ready
            && let Some(key) = &new_key
        {
            unique::check_unique(descriptor, store, key, id)?;
        }

        ops.push(IndexOp {
            index: descriptor.name.clone(),
            id,
            remove: old_key,
            insert: new_key,
        });
    }

    Ok(ops)
}

/// Apply a plan produced by [`plan_document_mutation`]. Infallible: ops
/// against a store that has been dropped concurrently are skipped, and
/// every physical mutation is idempotent.
pub(crate) fn apply_ops(stores: &mut IndexStoreRegistry, ops: Vec<IndexOp>) -> (u64, u64) {
    let mut inserts = 0u64;
    let mut removes = 0u64;

    for op in ops {
        let Some(store) = stores.get_mut(op.index.as_str()) else {
            continue;
        };

        if let Some(key) = op.remove
            && store.remove_if_present(&key, op.id)
        {
            removes += 1;
        }
        if let Some(key) = op.insert
            && store.upsert(key, op.id)
        {
            inserts += 1;
        }
    }

    (inserts, removes)
}

/// Plan and apply one document transition across the whole index set.
pub(crate) fn apply_mutation(
    catalog: &Catalog,
    stores: &mut IndexStoreRegistry,
    before: Option<&Document>,
    after: Option<&Document>,
) -> Result<(), EngineError> {
    let ops = plan_document_mutation(catalog, stores, before, after)?;
    let (inserts, removes) = apply_ops(stores, ops);

    if inserts > 0 || removes > 0 {
        record(MetricsEvent::IndexDelta { inserts, removes });
    }

    Ok(())
}

fn document_identity(
    before: Option<&Document>,
    after: Option<&Document>,
) -> Result<DocumentId, EngineError> {
    let id_of = |doc: &Document| {
        doc.id()
            .ok_or_else(|| EngineError::maintain_invariant("document is missing its identity"))
    };

    match (before, after) {
        (None, None) => Err(EngineError::maintain_invariant(
            "mutation carries neither a before nor an after image",
        )),
        (Some(doc), None) | (None, Some(doc)) => id_of(doc),
        (Some(old), Some(new)) => {
            let old_id = id_of(old)?;
            let new_id = id_of(new)?;
            if old_id != new_id {
                return Err(EngineError::maintain_invariant(format!(
                    "update changes document identity: {old_id} -> {new_id}"
                )));
            }
            Ok(old_id)
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{apply_mutation, plan_document_mutation};
    use crate::{
        db::{
            catalog::{BuildState, Catalog, MemoryCatalogStorage},
            index::IndexStoreRegistry,
        },
        document::{Document, DocumentId},
        model::index::{Direction, IndexDescriptor},
    };

    fn fixture() -> (Catalog, IndexStoreRegistry) {
        let mut catalog =
            Catalog::new(Box::new(MemoryCatalogStorage::new())).expect("create catalog");
        catalog
            .create(
                IndexDescriptor::new("item_1_category_1")
                    .field("item", Direction::Asc)
                    .field("category", Direction::Asc)
                    .unique(),
            )
            .expect("create unique index");
        catalog
            .create(IndexDescriptor::new("qty_1").field("qty", Direction::Asc))
            .expect("create qty index");
        catalog
            .set_state("item_1_category_1", BuildState::Ready)
            .expect("mark ready");
        catalog.set_state("qty_1", BuildState::Ready).expect("mark ready");

        let mut stores = IndexStoreRegistry::new();
        stores.ensure("_id_");
        stores.ensure("item_1_category_1");
        stores.ensure("qty_1");

        (catalog, stores)
    }

    fn doc(id: u64, item: &str, category: &str, qty: i64) -> Document {
        Document::new(DocumentId::new(id))
            .with_field("item", item)
            .with_field("category", category)
            .with_field("qty", qty)
    }

    #[test]
    fn insert_touches_every_ready_index() {
        let (catalog, mut stores) = fixture();
        let d = doc(1, "apple", "fruit", 3);

        apply_mutation(&catalog, &mut stores, None, Some(&d)).expect("insert");

        assert_eq!(stores.get("_id_").expect("primary store").entry_count(), 1);
        assert_eq!(
            stores
                .get("item_1_category_1")
                .expect("compound store")
                .entry_count(),
            1
        );
        assert_eq!(stores.get("qty_1").expect("qty store").entry_count(), 1);
    }

    #[test]
    fn conflicting_insert_mutates_nothing() {
        let (catalog, mut stores) = fixture();
        let first = doc(1, "apple", "fruit", 3);
        apply_mutation(&catalog, &mut stores, None, Some(&first)).expect("first insert");

        let dup = doc(2, "apple", "fruit", 9);
        let err = plan_document_mutation(&catalog, &stores, None, Some(&dup))
            .expect_err("duplicate compound key must conflict");

        assert!(err.is_duplicate_key());
        // All-or-nothing: the non-unique qty index saw no partial write.
        assert_eq!(stores.get("qty_1").expect("qty store").entry_count(), 1);
    }

    #[test]
    fn update_touches_only_indexes_whose_key_changed() {
        let (catalog, mut stores) = fixture();
        let before = doc(1, "apple", "fruit", 3);
        apply_mutation(&catalog, &mut stores, None, Some(&before)).expect("insert");

        let after = doc(1, "apple", "fruit", 7);
        let ops = plan_document_mutation(&catalog, &stores, Some(&before), Some(&after))
            .expect("plan update");

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].index, "qty_1");
    }

    #[test]
    fn delete_is_idempotent() {
        let (catalog, mut stores) = fixture();
        let d = doc(1, "apple", "fruit", 3);
        apply_mutation(&catalog, &mut stores, None, Some(&d)).expect("insert");

        apply_mutation(&catalog, &mut stores, Some(&d), None).expect("delete");
        apply_mutation(&catalog, &mut stores, Some(&d), None).expect("re-delete is a no-op");

        assert_eq!(stores.get("qty_1").expect("qty store").entry_count(), 0);
    }

    #[test]
    fn building_indexes_receive_mutations_without_enforcement() {
        let (mut catalog, mut stores) = fixture();
        catalog
            .set_state("item_1_category_1", BuildState::Building)
            .expect("mark building");

        let first = doc(1, "apple", "fruit", 3);
        let dup = doc(2, "apple", "fruit", 9);
        apply_mutation(&catalog, &mut stores, None, Some(&first)).expect("first insert");
        apply_mutation(&catalog, &mut stores, None, Some(&dup))
            .expect("building index must not enforce uniqueness");

        // Both owners landed; build finalization is responsible for
        // detecting the duplicate.
        assert_eq!(
            stores
                .get("item_1_category_1")
                .expect("compound store")
                .entry_count(),
            2
        );
    }

    #[test]
    fn identity_change_is_rejected() {
        let (catalog, stores) = fixture();
        let before = doc(1, "a", "b", 1);
        let after = doc(2, "a", "b", 1);

        let err = plan_document_mutation(&catalog, &stores, Some(&before), Some(&after))
            .expect_err("identity change must fail");
        assert_eq!(err.class, crate::error::ErrorClass::InvariantViolation);
    }
}
