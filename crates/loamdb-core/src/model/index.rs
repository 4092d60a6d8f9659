use crate::{
    document::ID_FIELD,
    error::EngineError,
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// Name reserved for the implicit primary index over the identity field.
pub const PRIMARY_INDEX_NAME: &str = "_id_";

///
/// Direction
///
/// Canonical traversal direction for one key-pattern component. Storage is
/// always ascending; direction is honoured at plan time.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

///
/// SpecError
///
/// Rejections raised when validating an index specification at creation.
///

#[derive(Debug, ThisError)]
pub enum SpecError {
    #[error("index key pattern is empty")]
    EmptyKeyPattern,

    #[error("index key pattern repeats field '{field}'")]
    DuplicateField { field: String },

    #[error("index key pattern has {count} fields (limit {})", crate::MAX_INDEX_FIELDS)]
    TooManyFields { count: usize },

    #[error("sparse option is unsupported on compound key patterns")]
    SparseCompound,

    #[error("index name '{name}' is reserved for the primary index")]
    ReservedName { name: String },
}

impl From<SpecError> for EngineError {
    fn from(err: SpecError) -> Self {
        Self::invalid_spec(err.to_string())
    }
}

///
/// IndexDescriptor
///
/// Persisted metadata describing one index's shape and options. The
/// `primary` flag marks the reserved identity index: it cannot be dropped
/// individually, survives drop-all, and is only replaced by a full reindex.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub key_pattern: Vec<(String, Direction)>,
    pub unique: bool,
    pub sparse: bool,
    pub background: bool,
    pub primary: bool,
}

impl IndexDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_pattern: Vec::new(),
            unique: false,
            sparse: false,
            background: false,
            primary: false,
        }
    }

    /// Append one key-pattern component. Order matters for compound keys
    /// and prefix-based query matching.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, direction: Direction) -> Self {
        self.key_pattern.push((name.into(), direction));
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    #[must_use]
    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    /// The reserved descriptor over the identity field.
    #[must_use]
    pub(crate) fn primary() -> Self {
        Self {
            name: PRIMARY_INDEX_NAME.to_string(),
            key_pattern: vec![(ID_FIELD.to_string(), Direction::Asc)],
            unique: true,
            sparse: false,
            background: false,
            primary: true,
        }
    }

    /// Validate the shape of a caller-supplied specification.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.key_pattern.is_empty() {
            return Err(SpecError::EmptyKeyPattern);
        }
        if self.key_pattern.len() > crate::MAX_INDEX_FIELDS {
            return Err(SpecError::TooManyFields {
                count: self.key_pattern.len(),
            });
        }

        for (i, (field, _)) in self.key_pattern.iter().enumerate() {
            if self.key_pattern[..i].iter().any(|(seen, _)| seen == field) {
                return Err(SpecError::DuplicateField {
                    field: field.clone(),
                });
            }
        }

        if self.sparse && self.key_pattern.len() > 1 {
            return Err(SpecError::SparseCompound);
        }

        if !self.primary && self.name == PRIMARY_INDEX_NAME {
            return Err(SpecError::ReservedName {
                name: self.name.clone(),
            });
        }

        Ok(())
    }

    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.key_pattern
            .iter()
            .map(|(field, _)| field.as_str())
            .collect()
    }

    /// Ensure semantics compare the full specification, not the name:
    /// same key pattern and same constraint options means the same index.
    /// Build mode is not part of the identity.
    #[must_use]
    pub fn same_specification(&self, other: &Self) -> bool {
        self.key_pattern == other.key_pattern
            && self.unique == other.unique
            && self.sparse == other.sparse
    }

    /// Whether the partition key is a prefix of this key pattern
    /// (order-sensitive, directions ignored).
    #[must_use]
    pub fn is_partition_key_prefix(&self, partition_key: &[String]) -> bool {
        partition_key.len() <= self.key_pattern.len()
            && partition_key
                .iter()
                .zip(self.key_pattern.iter())
                .all(|(pk, (field, _))| pk == field)
    }

    /// Derived: a unique index is partition-compatible only when routing
    /// already sends every candidate key to a single partition.
    #[must_use]
    pub fn partition_compatible(&self, partition_key: &[String]) -> bool {
        !self.unique || self.is_partition_key_prefix(partition_key)
    }
}

impl Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = self
            .key_pattern
            .iter()
            .map(|(field, dir)| format!("{field} {dir}"))
            .collect::<Vec<_>>()
            .join(", ");

        if self.unique {
            write!(f, "UNIQUE {}({pattern})", self.name)
        } else {
            write!(f, "{}({pattern})", self.name)
        }
    }
}

///
/// TESTS
///
