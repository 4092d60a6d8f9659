//! Module: value
//! Responsibility: scalar field values and their canonical total ordering.
//! Does not own: key extraction or index-store layout.
//! Boundary: index keys, documents, and the catalog consume `Value` as-is.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

///
/// ValueTag
///
/// Rank tag that fixes the cross-variant ordering of values. Values of
/// different variants compare by rank first, then within the variant.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum ValueTag {
    Null,
    Bool,
    Int,
    Uint,
    Float,
    Text,
    Bytes,
}

impl ValueTag {
    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool => 1,
            Self::Int => 2,
            Self::Uint => 3,
            Self::Float => 4,
            Self::Text => 5,
            Self::Bytes => 6,
        }
    }
}

///
/// Value
///
/// Scalar document field value. `Null` doubles as the placeholder entry for
/// missing fields on non-sparse indexes.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    #[must_use]
    pub(crate) const fn tag(&self) -> ValueTag {
        match self {
            Self::Null => ValueTag::Null,
            Self::Bool(_) => ValueTag::Bool,
            Self::Int(_) => ValueTag::Int,
            Self::Uint(_) => ValueTag::Uint,
            Self::Float(_) => ValueTag::Float,
            Self::Text(_) => ValueTag::Text,
            Self::Bytes(_) => ValueTag::Bytes,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Feed the canonical byte form of this value into a hasher stream.
    ///
    /// Used for partition routing; the encoding is stable across runs.
    pub(crate) fn hash_into(&self, hasher: &mut xxhash_rust::xxh3::Xxh3) {
        hasher.update(&[self.tag().rank()]);
        match self {
            Self::Null => {}
            Self::Bool(b) => hasher.update(&[u8::from(*b)]),
            Self::Int(i) => hasher.update(&i.to_be_bytes()),
            Self::Uint(u) => hasher.update(&u.to_be_bytes()),
            Self::Float(f) => hasher.update(&f.to_bits().to_be_bytes()),
            Self::Text(s) => {
                hasher.update(&(s.len() as u64).to_be_bytes());
                hasher.update(s.as_bytes());
            }
            Self::Bytes(b) => {
                hasher.update(&(b.len() as u64).to_be_bytes());
                hasher.update(b);
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Uint(a), Self::Uint(b)) => a.cmp(b),
            // total_cmp gives floats a total order (NaN sorts above +inf).
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            _ => self.tag().rank().cmp(&other.tag().rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::Bytes(b) => write!(f, "bytes[{}]", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::Uint(u)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::Value;
    use std::cmp::Ordering;

    #[test]
    fn ranks_order_across_variants() {
        let ordered = [
            Value::Null,
            Value::Bool(true),
            Value::Int(i64::MAX),
            Value::Uint(0),
            Value::Float(f64::NEG_INFINITY),
            Value::Text(String::new()),
            Value::Bytes(vec![]),
        ];

        for pair in ordered.windows(2) {
            assert_eq!(pair[0].cmp(&pair[1]), Ordering::Less, "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn floats_use_total_order() {
        assert_eq!(
            Value::Float(f64::NAN).cmp(&Value::Float(f64::NAN)),
            Ordering::Equal
        );
        assert_eq!(
            Value::Float(-0.0).cmp(&Value::Float(0.0)),
            Ordering::Less
        );
        assert_eq!(
            Value::Float(1.5).cmp(&Value::Float(2.0)),
            Ordering::Less
        );
    }

    #[test]
    fn equality_follows_ordering() {
        assert_eq!(Value::Text("a".into()), Value::from("a"));
        assert_ne!(Value::Int(1), Value::Uint(1));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn hash_stream_is_length_prefixed() {
        // "ab" + "c" must not collide with "a" + "bc".
        let mut h1 = xxhash_rust::xxh3::Xxh3::with_seed(0);
        Value::from("ab").hash_into(&mut h1);
        Value::from("c").hash_into(&mut h1);

        let mut h2 = xxhash_rust::xxh3::Xxh3::with_seed(0);
        Value::from("a").hash_into(&mut h2);
        Value::from("bc").hash_into(&mut h2);

        assert_ne!(h1.digest(), h2.digest());
    }
}
