use crate::{
    db::index::{IndexKey, IndexStore},
    document::DocumentId,
    error::EngineError,
    model::index::IndexDescriptor,
    obs::sink::{MetricsEvent, record},
};

/// Validate a unique constraint for one candidate key against the committed
/// entry set of a `ready` index.
///
/// This detects:
/// - Index corruption (multiple existing owners for a unique key)
/// - Uniqueness violations (conflicting key ownership)
///
/// A key already owned by the mutating document itself is not a conflict;
/// the maintainer's remove-old/add-new ops make that transition safe.
pub(super) fn check_unique(
    descriptor: &IndexDescriptor,
    store: &IndexStore,
    key: &IndexKey,
    id: DocumentId,
) -> Result<(), EngineError> {
    let Some(entry) = store.get(key) else {
        return Ok(());
    };

    if entry.contains(id) {
        return Ok(());
    }

    if entry.len() > 1 {
        return Err(EngineError::index_corruption(format!(
            "unique index '{}' holds {} owners for one key",
            descriptor.name,
            entry.len()
        )));
    }

    record(MetricsEvent::UniqueViolation {
        index: descriptor.name.clone(),
    });

    Err(EngineError::duplicate_key(
        &descriptor.name,
        &descriptor.fields(),
    ))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::check_unique;
    use crate::{
        db::index::{IndexKey, IndexStore},
        document::DocumentId,
        model::index::{Direction, IndexDescriptor},
        value::Value,
    };

    fn descriptor() -> IndexDescriptor {
        IndexDescriptor::new("item_1").field("item", Direction::Asc).unique()
    }

    fn key(v: i64) -> IndexKey {
        IndexKey::new(vec![Value::Int(v)])
    }

    #[test]
    fn vacant_key_passes() {
        let store = IndexStore::default();
        assert!(check_unique(&descriptor(), &store, &key(1), DocumentId::new(1)).is_ok());
    }

    #[test]
    fn own_key_passes() {
        let mut store = IndexStore::default();
        store.upsert(key(1), DocumentId::new(1));

        assert!(check_unique(&descriptor(), &store, &key(1), DocumentId::new(1)).is_ok());
    }

    #[test]
    fn foreign_key_conflicts() {
        let mut store = IndexStore::default();
        store.upsert(key(1), DocumentId::new(1));

        let err = check_unique(&descriptor(), &store, &key(1), DocumentId::new(2))
            .expect_err("foreign owner must conflict");
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn multi_owner_entry_is_corruption() {
        let mut store = IndexStore::default();
        store.upsert(key(1), DocumentId::new(1));
        store.upsert(key(1), DocumentId::new(2));

        let err = check_unique(&descriptor(), &store, &key(1), DocumentId::new(3))
            .expect_err("multi-owner unique entry must be corruption");
        assert_eq!(err.class, crate::error::ErrorClass::Corruption);
    }
}
