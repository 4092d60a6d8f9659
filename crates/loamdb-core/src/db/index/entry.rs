//! Module: index::entry
//! Responsibility: the id-set owned by one extracted key.
//! Does not own: unique-policy decisions or store-level iteration.
//! Boundary: the store mutates entries; the maintainer and builder only see
//! them through store operations.

use crate::document::DocumentId;
use std::collections::BTreeSet;

///
/// IndexEntry
///
/// Set of document ids owning one extracted key. A `ready` unique index
/// holds exactly one id per entry; any other arity there is corruption.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IndexEntry {
    ids: BTreeSet<DocumentId>,
}

impl IndexEntry {
    #[must_use]
    pub(crate) fn new(id: DocumentId) -> Self {
        let mut ids = BTreeSet::new();
        ids.insert(id);
        Self { ids }
    }

    /// Insert an id; idempotent. Returns whether the id was newly added.
    pub(crate) fn insert(&mut self, id: DocumentId) -> bool {
        self.ids.insert(id)
    }

    /// Remove an id if present. Returns whether an id was removed.
    pub(crate) fn remove(&mut self, id: DocumentId) -> bool {
        self.ids.remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: DocumentId) -> bool {
        self.ids.contains(&id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// The lowest owning id. Build-time duplicate resolution keeps this one.
    #[must_use]
    pub(crate) fn first(&self) -> Option<DocumentId> {
        self.ids.iter().next().copied()
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.ids.iter().copied()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::IndexEntry;
    use crate::document::DocumentId;

    #[test]
    fn insert_is_idempotent() {
        let mut entry = IndexEntry::new(DocumentId::new(1));

        assert!(!entry.insert(DocumentId::new(1)));
        assert!(entry.insert(DocumentId::new(2)));
        assert_eq!(entry.len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut entry = IndexEntry::new(DocumentId::new(1));

        assert!(entry.remove(DocumentId::new(1)));
        assert!(!entry.remove(DocumentId::new(1)));
        assert!(entry.is_empty());
    }

    #[test]
    fn first_returns_lowest_id() {
        let mut entry = IndexEntry::new(DocumentId::new(9));
        entry.insert(DocumentId::new(3));

        assert_eq!(entry.first(), Some(DocumentId::new(3)));
    }
}
