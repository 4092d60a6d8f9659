use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved identity field present on every stored document.
pub const ID_FIELD: &str = "_id";

///
/// DocumentId
///
/// Identity of a document within one collection. Ids are allocated by the
/// caller and are the unit the primary index is built over.
///

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct DocumentId(u64);

impl DocumentId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DocumentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

///
/// Document
///
/// Flat field map. The identity is carried in the `_id` field so that the
/// primary index extracts its key through the same path as every secondary
/// index.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Create a document carrying only its identity field.
    #[must_use]
    pub fn new(id: DocumentId) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(ID_FIELD.to_string(), Value::Uint(id.get()));

        Self { fields }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        if name == ID_FIELD {
            return None;
        }
        self.fields.remove(name)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Identity of this document, if the `_id` field is present and well
    /// typed. Mutation entry points reject documents where this is `None`.
    #[must_use]
    pub fn id(&self) -> Option<DocumentId> {
        match self.fields.get(ID_FIELD) {
            Some(Value::Uint(id)) => Some(DocumentId::new(*id)),
            _ => None,
        }
    }

    #[must_use]
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{Document, DocumentId, ID_FIELD};
    use crate::value::Value;

    #[test]
    fn new_document_carries_identity_field() {
        let doc = Document::new(DocumentId::new(7));

        assert_eq!(doc.id(), Some(DocumentId::new(7)));
        assert_eq!(doc.get(ID_FIELD), Some(&Value::Uint(7)));
    }

    #[test]
    fn identity_field_cannot_be_removed() {
        let mut doc = Document::new(DocumentId::new(1)).with_field("name", "a");

        assert!(doc.remove_field(ID_FIELD).is_none());
        assert!(doc.remove_field("name").is_some());
        assert_eq!(doc.id(), Some(DocumentId::new(1)));
    }

    #[test]
    fn mistyped_identity_yields_none() {
        let doc = Document::default().with_field(ID_FIELD, "not-a-uint");

        assert!(doc.id().is_none());
    }
}
