//! Module: index::key
//! Responsibility: canonical index-key extraction from documents.
//! Does not own: index-store scanning or unique-constraint policy.
//! Boundary: maintainer, builder, and planner use this as the key authority.

use crate::{document::Document, model::index::IndexDescriptor, value::Value};

///
/// IndexKey
///
/// Extracted values for one document under one key pattern, compared
/// componentwise in pattern order. Keys are stored ascending regardless of
/// component direction; direction is honoured at plan time.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct IndexKey(Vec<Value>);

impl IndexKey {
    #[must_use]
    pub(crate) const fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub(crate) fn starts_with(&self, prefix: &[Value]) -> bool {
        self.0.len() >= prefix.len() && self.0[..prefix.len()] == *prefix
    }
}

///
/// KeyProjection
///
/// Outcome of running a document through the key extractor.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyProjection {
    /// The document owns an entry at this key.
    Key(IndexKey),
    /// Sparse index and at least one key field is missing; the document is
    /// excluded from the index entirely.
    Skip,
}

impl KeyProjection {
    #[must_use]
    pub(crate) fn into_key(self) -> Option<IndexKey> {
        match self {
            Self::Key(key) => Some(key),
            Self::Skip => None,
        }
    }
}

/// Run one document through the extractor for a descriptor's key pattern.
///
/// A missing field yields a `Null` placeholder component unless the index is
/// sparse, in which case the whole document is skipped.
#[must_use]
pub fn extract_key(descriptor: &IndexDescriptor, document: &Document) -> KeyProjection {
    let mut values = Vec::with_capacity(descriptor.key_pattern.len());

    for (field, _) in &descriptor.key_pattern {
        match document.get(field) {
            Some(value) => values.push(value.clone()),
            None if descriptor.sparse => return KeyProjection::Skip,
            None => values.push(Value::Null),
        }
    }

    KeyProjection::Key(IndexKey::new(values))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{KeyProjection, extract_key};
    use crate::{
        document::{Document, DocumentId},
        model::index::{Direction, IndexDescriptor},
        value::Value,
    };

    fn doc(id: u64) -> Document {
        Document::new(DocumentId::new(id))
    }

    #[test]
    fn extracts_components_in_pattern_order() {
        let descriptor = IndexDescriptor::new("item_1_category_1")
            .field("item", Direction::Asc)
            .field("category", Direction::Asc);
        let document = doc(1).with_field("category", "fruit").with_field("item", "apple");

        let KeyProjection::Key(key) = extract_key(&descriptor, &document) else {
            panic!("expected a key projection");
        };
        assert_eq!(key.values(), &[Value::from("apple"), Value::from("fruit")]);
    }

    #[test]
    fn missing_field_yields_null_placeholder() {
        let descriptor = IndexDescriptor::new("item_1").field("item", Direction::Asc);

        let KeyProjection::Key(key) = extract_key(&descriptor, &doc(1)) else {
            panic!("expected a key projection");
        };
        assert_eq!(key.values(), &[Value::Null]);
    }

    #[test]
    fn sparse_index_skips_missing_field() {
        let descriptor = IndexDescriptor::new("twitter_name_1")
            .field("twitterName", Direction::Asc)
            .sparse();

        assert_eq!(extract_key(&descriptor, &doc(1)), KeyProjection::Skip);
    }

    #[test]
    fn prefix_matching_is_componentwise() {
        let descriptor = IndexDescriptor::new("a_1_b_1")
            .field("a", Direction::Asc)
            .field("b", Direction::Asc);
        let document = doc(1).with_field("a", 1i64).with_field("b", 2i64);

        let KeyProjection::Key(key) = extract_key(&descriptor, &document) else {
            panic!("expected a key projection");
        };
        assert!(key.starts_with(&[Value::Int(1)]));
        assert!(key.starts_with(&[Value::Int(1), Value::Int(2)]));
        assert!(!key.starts_with(&[Value::Int(2)]));
        assert!(!key.starts_with(&[Value::Int(1), Value::Int(2), Value::Int(3)]));
    }
}
