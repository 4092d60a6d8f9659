mod entry;
mod key;
mod store;

pub use entry::IndexEntry;
pub use key::{IndexKey, KeyProjection, extract_key};
pub use store::{IndexStore, IndexStoreRegistry};
