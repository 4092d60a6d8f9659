//! Core runtime for LoamDB's index subsystem: values, documents, the
//! descriptor catalog, physical index stores, builders, uniqueness
//! enforcement, and the utilization surface.

pub mod db;
pub mod document;
pub mod error;
pub mod model;
pub mod obs;
pub mod value;

///
/// CONSTANTS
///

/// Maximum number of indexed fields allowed in one key pattern.
///
/// This limit keeps compound keys within bounded sizes and simplifies
/// sizing assumptions in the stores.
pub const MAX_INDEX_FIELDS: usize = 32;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, stores, codecs, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{Collection, PartitionedCollection, Query},
        document::{Document, DocumentId},
        model::index::{Direction, IndexDescriptor},
        value::Value,
    };
}
