//! Caller-facing surface for LoamDB: descriptor catalog, foreground and
//! background index builds, unique and sparse constraints
//! (partition-aware), rebuild coordination, and index utilization
//! reporting. The subsystem itself lives in `loamdb-core`.

mod database;

pub use database::Database;

pub use loamdb_core::{
    db::{
        BuildConfig, BuildHandle, BuildMode, BuildProgress, BuildReport, CatalogStorage,
        Collection, CreateIndexOutcome, CreateOutcome, DropAllOutcome, DropIndexOutcome,
        DropTarget, ExplainAccessPath, ExplainReport, MemoryCatalogStorage, PartitionKey,
        PartitionedCollection, Query, ReindexOutcome,
    },
    document::{Document, DocumentId, ID_FIELD},
    error::{EngineError, ErrorClass, ErrorDetail, ErrorOrigin},
    model::index::{Direction, IndexDescriptor, PRIMARY_INDEX_NAME},
    obs::{EventState, MetricsSink, metrics_report, metrics_reset_all},
    value::Value,
};

pub mod prelude {
    pub use loamdb_core::prelude::*;
}
