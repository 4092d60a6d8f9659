use crate::{
    db::index::{entry::IndexEntry, key::IndexKey},
    document::DocumentId,
    error::EngineError,
    value::Value,
};
use derive_more::{Deref, DerefMut};
use std::collections::BTreeMap;

///
/// IndexStoreRegistry
///
/// Physical stores keyed by index name. The catalog is the authority on
/// which names exist; the registry only holds entry sets.
///

#[derive(Debug, Default, Deref, DerefMut)]
pub struct IndexStoreRegistry(BTreeMap<String, IndexStore>);

impl IndexStoreRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create an empty store for `name` if one does not exist.
    pub fn ensure(&mut self, name: &str) -> &mut IndexStore {
        self.0.entry(name.to_string()).or_default()
    }

    pub fn drop_store(&mut self, name: &str) -> bool {
        self.0.remove(name).is_some()
    }

    pub(crate) fn try_get(&self, name: &str) -> Result<&IndexStore, EngineError> {
        self.0
            .get(name)
            .ok_or_else(|| EngineError::index_corruption(format!("index store missing: '{name}'")))
    }
}

///
/// IndexStore
///
/// Ordered entry map for one index. All mutations are idempotent
/// (upsert / remove-if-present) so the background builder's scan can
/// re-apply work already performed by live mutation interception.
///

#[derive(Debug, Default)]
pub struct IndexStore {
    entries: BTreeMap<IndexKey, IndexEntry>,
}

impl IndexStore {
    /// Idempotent insert. Returns whether `(key, id)` was newly added.
    pub fn upsert(&mut self, key: IndexKey, id: DocumentId) -> bool {
        match self.entries.get_mut(&key) {
            Some(entry) => entry.insert(id),
            None => {
                self.entries.insert(key, IndexEntry::new(id));
                true
            }
        }
    }

    /// Idempotent removal; the entry is dropped once its id set drains.
    /// Returns whether `(key, id)` was present.
    pub fn remove_if_present(&mut self, key: &IndexKey, id: DocumentId) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };

        let removed = entry.remove(id);
        if entry.is_empty() {
            self.entries.remove(key);
        }

        removed
    }

    #[must_use]
    pub fn get(&self, key: &IndexKey) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Entries whose key starts with `prefix`, in key order.
    pub fn scan_prefix<'a>(
        &'a self,
        prefix: &'a [Value],
    ) -> impl Iterator<Item = (&'a IndexKey, &'a IndexEntry)> {
        let start = IndexKey::new(prefix.to_vec());

        self.entries
            .range(start..)
            .take_while(move |(key, _)| key.starts_with(prefix))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexKey, &IndexEntry)> {
        self.entries.iter()
    }

    /// First entry holding more than one id, if any. Used by build
    /// finalization to verify unique arity over the whole store.
    #[must_use]
    pub(crate) fn first_duplicate(&self) -> Option<(&IndexKey, &IndexEntry)> {
        self.entries.iter().find(|(_, entry)| entry.len() > 1)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of `(key, id)` pairs.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.values().map(IndexEntry::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{IndexStore, IndexStoreRegistry};
    use crate::{db::index::key::IndexKey, document::DocumentId, value::Value};

    fn key(values: &[i64]) -> IndexKey {
        IndexKey::new(values.iter().map(|v| Value::Int(*v)).collect())
    }

    #[test]
    fn upsert_and_remove_are_idempotent() {
        let mut store = IndexStore::default();
        let id = DocumentId::new(1);

        assert!(store.upsert(key(&[5]), id));
        assert!(!store.upsert(key(&[5]), id));
        assert_eq!(store.entry_count(), 1);

        assert!(store.remove_if_present(&key(&[5]), id));
        assert!(!store.remove_if_present(&key(&[5]), id));
        assert!(store.is_empty());
    }

    #[test]
    fn drained_entries_are_dropped() {
        let mut store = IndexStore::default();
        store.upsert(key(&[1]), DocumentId::new(1));
        store.upsert(key(&[1]), DocumentId::new(2));

        store.remove_if_present(&key(&[1]), DocumentId::new(1));
        assert_eq!(store.key_count(), 1);

        store.remove_if_present(&key(&[1]), DocumentId::new(2));
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn scan_prefix_walks_matching_range_in_order() {
        let mut store = IndexStore::default();
        store.upsert(key(&[1, 1]), DocumentId::new(1));
        store.upsert(key(&[1, 2]), DocumentId::new(2));
        store.upsert(key(&[2, 1]), DocumentId::new(3));

        let hits: Vec<_> = store
            .scan_prefix(&[Value::Int(1)])
            .map(|(k, _)| k.clone())
            .collect();

        assert_eq!(hits, vec![key(&[1, 1]), key(&[1, 2])]);
    }

    #[test]
    fn first_duplicate_finds_multi_id_entries() {
        let mut store = IndexStore::default();
        store.upsert(key(&[1]), DocumentId::new(1));
        assert!(store.first_duplicate().is_none());

        store.upsert(key(&[1]), DocumentId::new(2));
        let (dup_key, entry) = store.first_duplicate().expect("duplicate should surface");
        assert_eq!(dup_key, &key(&[1]));
        assert_eq!(entry.len(), 2);
    }

    #[test]
    fn registry_ensure_is_idempotent() {
        let mut registry = IndexStoreRegistry::new();
        registry.ensure("a").upsert(key(&[1]), DocumentId::new(1));
        registry.ensure("a");

        assert_eq!(
            registry.try_get("a").expect("store should exist").entry_count(),
            1
        );
        assert!(registry.try_get("missing").is_err());
    }
}
