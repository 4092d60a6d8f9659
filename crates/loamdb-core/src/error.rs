use std::fmt;
use thiserror::Error as ThisError;

///
/// EngineError
///
/// Structured runtime error with a stable internal classification.
/// Every fallible surface of the index subsystem returns this type; callers
/// branch on `class` (and `detail` where structured payloads exist) rather
/// than on message text.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct EngineError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl EngineError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct an invalid index specification error.
    pub(crate) fn invalid_spec(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvalidSpecification,
            ErrorOrigin::Catalog,
            message,
        )
    }

    /// Construct a unique-constraint conflict for one index.
    pub(crate) fn duplicate_key(index: &str, fields: &[&str]) -> Self {
        Self {
            class: ErrorClass::Conflict,
            origin: ErrorOrigin::Index,
            message: format!(
                "duplicate key conflict: '{index}' ({})",
                fields.join(", ")
            ),
            detail: Some(ErrorDetail::DuplicateKey {
                index: index.to_string(),
            }),
        }
    }

    /// Construct an index-not-found error for drop/hint targets.
    pub(crate) fn index_not_found(index: impl Into<String>) -> Self {
        let index = index.into();

        Self {
            class: ErrorClass::NotFound,
            origin: ErrorOrigin::Catalog,
            message: format!("index not found: '{index}'"),
            detail: Some(ErrorDetail::IndexNotFound { index }),
        }
    }

    /// Construct a document-not-found error for update targets.
    pub(crate) fn document_not_found(id: impl fmt::Display) -> Self {
        Self::new(
            ErrorClass::NotFound,
            ErrorOrigin::Maintain,
            format!("document not found: {id}"),
        )
    }

    /// Construct a build-aborted error (cancelled or failed mid-build).
    pub(crate) fn build_aborted(index: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorClass::Aborted,
            ErrorOrigin::Build,
            format!("index build aborted: '{index}' ({reason})"),
        )
    }

    /// Construct the cross-partition uniqueness limitation error.
    pub(crate) fn cross_partition_unsupported(index: &str) -> Self {
        Self::new(
            ErrorClass::Unsupported,
            ErrorOrigin::Partition,
            format!(
                "global uniqueness unsupported: '{index}' is not aligned with the partition key"
            ),
        )
    }

    /// Construct a catalog-origin corruption error.
    pub(crate) fn catalog_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Catalog, message)
    }

    /// Construct an index-origin corruption error.
    pub(crate) fn index_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Index, message)
    }

    /// Construct a build-origin conflict for serialized structural changes.
    pub(crate) fn build_in_flight(index: &str) -> Self {
        Self::new(
            ErrorClass::Conflict,
            ErrorOrigin::Build,
            format!("a structural change is already in flight (building '{index}')"),
        )
    }

    /// Construct a maintain-origin invariant violation.
    pub(crate) fn maintain_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Maintain,
            message,
        )
    }

    /// Construct a serialize-origin internal error.
    pub(crate) fn serialize_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, message)
    }

    #[must_use]
    pub const fn is_duplicate_key(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::DuplicateKey { .. }))
    }

    #[must_use]
    pub const fn is_index_not_found(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::IndexNotFound { .. }))
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`EngineError`].
/// This enum is intentionally extensible.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorDetail {
    DuplicateKey { index: String },
    IndexNotFound { index: String },
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    InvalidSpecification,
    Conflict,
    NotFound,
    Aborted,
    Unsupported,
    Corruption,
    Internal,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidSpecification => "invalid_specification",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Aborted => "aborted",
            Self::Unsupported => "unsupported",
            Self::Corruption => "corruption",
            Self::Internal => "internal",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Catalog,
    Index,
    Build,
    Maintain,
    Query,
    Partition,
    Serialize,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Catalog => "catalog",
            Self::Index => "index",
            Self::Build => "build",
            Self::Maintain => "maintain",
            Self::Query => "query",
            Self::Partition => "partition",
            Self::Serialize => "serialize",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{EngineError, ErrorClass, ErrorOrigin};

    #[test]
    fn duplicate_key_carries_detail() {
        let err = EngineError::duplicate_key("item_1_category_1", &["item", "category"]);

        assert_eq!(err.class, ErrorClass::Conflict);
        assert_eq!(err.origin, ErrorOrigin::Index);
        assert!(err.is_duplicate_key());
        assert!(!err.is_index_not_found());
    }

    #[test]
    fn display_with_class_is_labelled() {
        let err = EngineError::index_not_found("missing");

        assert_eq!(
            err.display_with_class(),
            "catalog:not_found: index not found: 'missing'"
        );
    }
}
