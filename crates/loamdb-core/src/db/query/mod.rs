//! Module: query
//! Responsibility: equality queries, index-prefix access-path selection,
//! and the explain/hint projection surface.
//! Does not own: index mutation or build state transitions.
//! Boundary: executes against a locked collection; `building` indexes are
//! invisible to planning.

use crate::{
    db::{
        catalog::{BuildState, Catalog},
        collection::CollectionInner,
    },
    document::{Document, DocumentId},
    error::EngineError,
    obs::sink::{MetricsEvent, PlanKind, record},
    value::Value,
};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// Query
///
/// Conjunction of equality predicates over document fields.
///

#[derive(Clone, Debug, Default)]
pub struct Query {
    predicates: BTreeMap<String, Value>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn predicates(&self) -> &BTreeMap<String, Value> {
        &self.predicates
    }

    #[must_use]
    pub(crate) fn matches(&self, document: &Document) -> bool {
        self.predicates
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }
}

///
/// AccessPath
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum AccessPath {
    IndexPrefix { index: String, prefix: Vec<Value> },
    FullScan,
}

///
/// ExplainAccessPath
///
/// Projection of the chosen access path, decoupled from plan internals.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum ExplainAccessPath {
    IndexPrefix { index: String, prefix_len: usize },
    FullScan,
}

///
/// ExplainReport
///

#[derive(Clone, Debug, Serialize)]
pub struct ExplainReport {
    pub index_used: Option<String>,
    pub access_path: ExplainAccessPath,
    pub documents_scanned: u64,
    pub documents_returned: u64,
}

/// Longest key-pattern prefix of `descriptor` fully covered by the query's
/// equality predicates, as extracted prefix values.
fn covered_prefix(
    query: &Query,
    key_pattern: &[(String, crate::model::index::Direction)],
) -> Vec<Value> {
    let mut prefix = Vec::new();

    for (field, _) in key_pattern {
        match query.predicates.get(field) {
            Some(value) => prefix.push(value.clone()),
            None => break,
        }
    }

    prefix
}

/// Select the access path: the ready index covering the longest prefix of
/// its key pattern wins; ties resolve to catalog order.
pub(crate) fn plan_access(catalog: &Catalog, query: &Query) -> AccessPath {
    let mut best: Option<(String, Vec<Value>)> = None;

    for entry in catalog.entries() {
        if entry.state != BuildState::Ready {
            continue;
        }

        let prefix = covered_prefix(query, &entry.descriptor.key_pattern);
        if prefix.is_empty() {
            continue;
        }

        let better = best
            .as_ref()
            .is_none_or(|(_, best_prefix)| prefix.len() > best_prefix.len());
        if better {
            best = Some((entry.descriptor.name.clone(), prefix));
        }
    }

    match best {
        Some((index, prefix)) => AccessPath::IndexPrefix { index, prefix },
        None => AccessPath::FullScan,
    }
}

/// Execute a query over a locked collection, optionally forcing an index.
///
/// A forced index must exist and be ready, otherwise the call fails with
/// the not-found error the hint surface documents.
pub(crate) fn execute(
    inner: &CollectionInner,
    query: &Query,
    forced: Option<&str>,
) -> Result<(Vec<Document>, ExplainReport), EngineError> {
    // Phase 1: resolve the access path.
    let path = match forced {
        Some(name) => {
            let entry = inner
                .catalog
                .get(name)
                .ok_or_else(|| EngineError::index_not_found(name))?;
            if entry.state != BuildState::Ready {
                return Err(EngineError::index_not_found(name));
            }

            AccessPath::IndexPrefix {
                index: name.to_string(),
                prefix: covered_prefix(query, &entry.descriptor.key_pattern),
            }
        }
        None => plan_access(&inner.catalog, query),
    };

    // Phase 2: gather candidate ids and record plan telemetry.
    let candidates: Vec<DocumentId> = match &path {
        AccessPath::IndexPrefix { index, prefix } => {
            record(MetricsEvent::Plan {
                kind: PlanKind::Index,
            });
            record(MetricsEvent::IndexAccess {
                index: index.clone(),
            });

            let store = inner.stores.try_get(index)?;
            store
                .scan_prefix(prefix)
                .flat_map(|(_, entry)| entry.iter_ids())
                .collect()
        }
        AccessPath::FullScan => {
            record(MetricsEvent::Plan {
                kind: PlanKind::FullScan,
            });

            inner.documents.keys().copied().collect()
        }
    };

    // Phase 3: fetch, residual-filter, and count.
    let mut results = Vec::new();
    let mut scanned = 0u64;

    for id in candidates {
        let Some(document) = inner.documents.get(&id) else {
            return Err(EngineError::index_corruption(format!(
                "index entry points at missing document: {id}"
            )));
        };

        scanned += 1;
        if query.matches(document) {
            results.push(document.clone());
        }
    }

    record(MetricsEvent::RowsScanned { rows: scanned });

    let report = ExplainReport {
        index_used: match &path {
            AccessPath::IndexPrefix { index, .. } => Some(index.clone()),
            AccessPath::FullScan => None,
        },
        access_path: match &path {
            AccessPath::IndexPrefix { index, prefix } => ExplainAccessPath::IndexPrefix {
                index: index.clone(),
                prefix_len: prefix.len(),
            },
            AccessPath::FullScan => ExplainAccessPath::FullScan,
        },
        documents_scanned: scanned,
        documents_returned: results.len() as u64,
    };

    Ok((results, report))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{AccessPath, Query, covered_prefix, plan_access};
    use crate::{
        db::catalog::{BuildState, Catalog, MemoryCatalogStorage},
        model::index::{Direction, IndexDescriptor},
        value::Value,
    };

    fn catalog() -> Catalog {
        let mut catalog =
            Catalog::new(Box::new(MemoryCatalogStorage::new())).expect("create catalog");
        catalog
            .create(
                IndexDescriptor::new("item_1_category_1")
                    .field("item", Direction::Asc)
                    .field("category", Direction::Asc),
            )
            .expect("create compound");
        catalog
            .create(IndexDescriptor::new("category_1").field("category", Direction::Asc))
            .expect("create single");
        catalog
            .set_state("item_1_category_1", BuildState::Ready)
            .expect("ready");
        catalog
            .set_state("category_1", BuildState::Ready)
            .expect("ready");
        catalog
    }

    #[test]
    fn longest_covered_prefix_wins() {
        let catalog = catalog();
        let query = Query::new().eq("item", "apple").eq("category", "fruit");

        let path = plan_access(&catalog, &query);
        assert_eq!(
            path,
            AccessPath::IndexPrefix {
                index: "item_1_category_1".into(),
                prefix: vec![Value::from("apple"), Value::from("fruit")],
            }
        );
    }

    #[test]
    fn uncovered_query_falls_back_to_full_scan() {
        let catalog = catalog();
        let query = Query::new().eq("qty", 3i64);

        assert_eq!(plan_access(&catalog, &query), AccessPath::FullScan);
    }

    #[test]
    fn building_indexes_are_invisible_to_planning() {
        let mut catalog = catalog();
        catalog
            .set_state("category_1", BuildState::Building)
            .expect("mark building");
        let query = Query::new().eq("category", "fruit");

        // The compound index starts with `item`, so `category` alone covers
        // no prefix of it; with category_1 building, nothing is usable.
        assert_eq!(plan_access(&catalog, &query), AccessPath::FullScan);
    }

    #[test]
    fn prefix_stops_at_first_uncovered_field() {
        let query = Query::new().eq("item", "apple").eq("qty", 1i64);
        let pattern = vec![
            ("item".to_string(), Direction::Asc),
            ("category".to_string(), Direction::Asc),
            ("qty".to_string(), Direction::Asc),
        ];

        assert_eq!(covered_prefix(&query, &pattern), vec![Value::from("apple")]);
    }
}
