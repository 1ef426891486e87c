//! Engine coordinating collections, indexes and aggregate queries

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::EngineConfig;
use crate::data::{DataStore, RecordId};
use crate::document::Document;
use crate::error::{QuillError, QuillResult};
use crate::index::{CollectionIndex, IndexService};
use crate::query::{Order, Query};
use crate::value::Value;

/// One collection's state: indexes, payload store and the maintained
/// document count.
struct CollectionData {
    indexes: Vec<CollectionIndex>,
    data: DataStore,
    doc_count: u64,
}

impl CollectionData {
    fn new(config: &EngineConfig) -> Self {
        Self {
            indexes: Vec::new(),
            data: DataStore::with_capacity(config.initial_capacity),
            doc_count: 0,
        }
    }

    fn index_for(&self, field: &str) -> Option<&CollectionIndex> {
        self.indexes.iter().find(|index| index.expression() == field)
    }

    /// The primary index: slot 0, the first index created for the
    /// collection. `min()`/`max()` operate on this one implicitly.
    fn primary(&self) -> Option<&CollectionIndex> {
        self.indexes.first()
    }

    fn key_for(&self, doc: &Document, field: &str) -> Value {
        doc.get(field).cloned().unwrap_or(Value::Null)
    }
}

/// Main database engine.
///
/// Aggregate queries (`count`, `exists`, `min`, `max`) are answered from
/// index keys and the maintained document count alone; stored payloads are
/// never deserialized on that path. Every traversal completes inside the
/// collection lock the operation takes, so no structural mutation can
/// interleave with an outstanding node sequence.
pub struct QuillEngine {
    collections: RwLock<HashMap<String, Arc<RwLock<CollectionData>>>>,
    indexer: IndexService,
    config: EngineConfig,
}

impl QuillEngine {
    /// Create a new engine
    pub fn new(config: EngineConfig) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            indexer: IndexService::new(),
            config,
        }
    }

    /// Create a collection
    pub fn create_collection(&self, name: &str) -> QuillResult<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(QuillError::Storage(format!(
                "Collection '{}' already exists",
                name
            )));
        }

        collections.insert(
            name.to_string(),
            Arc::new(RwLock::new(CollectionData::new(&self.config))),
        );
        tracing::debug!("Created collection '{}'", name);

        Ok(())
    }

    /// Drop a collection, returning whether it existed
    pub fn drop_collection(&self, name: &str) -> bool {
        let existed = self.collections.write().remove(name).is_some();
        if existed {
            tracing::info!("Dropped collection '{}'", name);
        }
        existed
    }

    /// List collection names
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Ensure an index on `expression` exists, creating the collection if
    /// needed and backfilling from already-stored documents.
    ///
    /// Returns `true` if a new index was built. Requesting an existing
    /// index with a different uniqueness constraint is an error; a
    /// uniqueness violation during backfill aborts without publishing the
    /// index.
    pub fn ensure_index(&self, name: &str, expression: &str, unique: bool) -> QuillResult<bool> {
        if expression.trim().is_empty() {
            return Err(QuillError::InvalidInput(
                "Index field expression must not be empty".into(),
            ));
        }

        let col = self.get_or_create(name);
        let mut col = col.write();

        if let Some(existing) = col.index_for(expression) {
            if existing.is_unique() != unique {
                return Err(QuillError::InvalidInput(format!(
                    "Index '{}' already exists with unique={}",
                    expression,
                    existing.is_unique()
                )));
            }
            return Ok(false);
        }

        let mut index = CollectionIndex::new(expression, unique, self.config.max_index_level);
        for (record, payload) in col.data.iter() {
            let doc: Document = bincode::deserialize(payload).map_err(|e| {
                QuillError::Serialization(format!("Failed to decode document: {}", e))
            })?;
            let key = doc.get(expression).cloned().unwrap_or(Value::Null);
            self.indexer.insert(&mut index, key, record)?;
        }

        col.indexes.push(index);
        tracing::debug!(
            "Created index '{}' on collection '{}' (unique: {})",
            expression,
            name,
            unique
        );

        Ok(true)
    }

    /// Drop an index, returning whether it existed
    pub fn drop_index(&self, name: &str, expression: &str) -> QuillResult<bool> {
        let Some(col) = self.collection_data(name) else {
            return Ok(false);
        };
        let mut col = col.write();

        let Some(pos) = col
            .indexes
            .iter()
            .position(|index| index.expression() == expression)
        else {
            return Ok(false);
        };

        col.indexes.remove(pos);
        tracing::info!("Dropped index '{}' from collection '{}'", expression, name);

        Ok(true)
    }

    /// Insert a document, creating the collection on first use.
    ///
    /// Adds one node per index (a missing field indexes as `Null`) and
    /// bumps the document count. Unique constraints are checked across all
    /// indexes before anything is stored or linked.
    pub fn insert(&self, name: &str, doc: Document) -> QuillResult<RecordId> {
        let col = self.get_or_create(name);
        let mut col = col.write();

        for index in &col.indexes {
            if index.is_unique() {
                let key = col.key_for(&doc, index.expression());
                if self.indexer.find(index, &key).is_some() {
                    return Err(QuillError::Index(format!(
                        "Duplicate key {} in unique index '{}'",
                        key,
                        index.expression()
                    )));
                }
            }
        }

        let payload = bincode::serialize(&doc).map_err(|e| {
            QuillError::Serialization(format!("Failed to encode document: {}", e))
        })?;
        let record = col.data.insert(payload);

        let CollectionData { indexes, .. } = &mut *col;
        for index in indexes.iter_mut() {
            let key = doc.get(index.expression()).cloned().unwrap_or(Value::Null);
            self.indexer.insert(index, key, record)?;
        }

        col.doc_count += 1;
        Ok(record)
    }

    /// Replace a document in place, re-keying every index (delete then
    /// reinsert of each node). Returns whether the record existed.
    pub fn update(&self, name: &str, record: RecordId, doc: Document) -> QuillResult<bool> {
        let Some(col) = self.collection_data(name) else {
            return Ok(false);
        };
        let mut col = col.write();

        if !col.data.contains(record) {
            return Ok(false);
        }

        for index in &col.indexes {
            if index.is_unique() {
                let key = col.key_for(&doc, index.expression());
                if let Some(existing) = self.indexer.find(index, &key)
                    && existing.record() != record
                {
                    return Err(QuillError::Index(format!(
                        "Duplicate key {} in unique index '{}'",
                        key,
                        index.expression()
                    )));
                }
            }
        }

        let payload = bincode::serialize(&doc).map_err(|e| {
            QuillError::Serialization(format!("Failed to encode document: {}", e))
        })?;
        col.data.replace(record, payload);

        let CollectionData { indexes, .. } = &mut *col;
        for index in indexes.iter_mut() {
            self.indexer.delete(index, record);
            let key = doc.get(index.expression()).cloned().unwrap_or(Value::Null);
            self.indexer.insert(index, key, record)?;
        }

        Ok(true)
    }

    /// Delete every document matched by `query`, returning the number
    /// removed. A collection or index that does not exist matches nothing.
    pub fn delete(&self, name: &str, query: &Query) -> QuillResult<u64> {
        let Some(col) = self.collection_data(name) else {
            return Ok(0);
        };
        let mut col = col.write();

        let records: Vec<RecordId> = match col.index_for(query.field()) {
            Some(index) => {
                index.validate()?;
                query
                    .execute_index(&self.indexer, index)
                    .map(|node| node.record())
                    .collect()
            }
            None => return Ok(0),
        };

        for record in &records {
            for index in col.indexes.iter_mut() {
                self.indexer.delete(index, *record);
            }
            col.data.remove(*record);
            col.doc_count -= 1;
        }

        tracing::debug!(
            "Deleted {} documents from collection '{}'",
            records.len(),
            name
        );

        Ok(records.len() as u64)
    }

    /// Count documents.
    ///
    /// Without a query this reads the maintained document count in O(1)
    /// and touches no index. With a query it fully consumes the query's
    /// filtered index traversal; an unknown collection or unindexed field
    /// counts as zero.
    pub fn count(&self, name: &str, query: Option<&Query>) -> QuillResult<u64> {
        let Some(col) = self.collection_data(name) else {
            return Ok(0);
        };
        let col = col.read();

        match query {
            None => Ok(col.doc_count),
            Some(query) => match col.index_for(query.field()) {
                Some(index) => {
                    index.validate()?;
                    Ok(query.execute_index(&self.indexer, index).count() as u64)
                }
                None => Ok(0),
            },
        }
    }

    /// Whether `query` matches at least one document. Stops at the first
    /// matching node.
    pub fn exists(&self, name: &str, query: &Query) -> QuillResult<bool> {
        let Some(col) = self.collection_data(name) else {
            return Ok(false);
        };
        let col = col.read();

        match col.index_for(query.field()) {
            Some(index) => {
                index.validate()?;
                Ok(query.execute_index(&self.indexer, index).next().is_some())
            }
            None => Ok(false),
        }
    }

    /// Smallest key in the collection's primary index, or `MinValue` when
    /// the collection is empty or has no index
    pub fn min(&self, name: &str) -> QuillResult<Value> {
        self.boundary_key(name, Order::Ascending, Value::MinValue)
    }

    /// Largest key in the collection's primary index, or `MaxValue` when
    /// the collection is empty or has no index
    pub fn max(&self, name: &str) -> QuillResult<Value> {
        self.boundary_key(name, Order::Descending, Value::MaxValue)
    }

    fn boundary_key(&self, name: &str, order: Order, empty: Value) -> QuillResult<Value> {
        let Some(col) = self.collection_data(name) else {
            return Ok(empty);
        };
        let col = col.read();

        let Some(index) = col.primary() else {
            return Ok(empty);
        };
        index.validate()?;

        Ok(self
            .indexer
            .find_all(index, order)
            .next()
            .map(|node| node.key().clone())
            .unwrap_or(empty))
    }

    fn collection_data(&self, name: &str) -> Option<Arc<RwLock<CollectionData>>> {
        self.collections.read().get(name).cloned()
    }

    fn get_or_create(&self, name: &str) -> Arc<RwLock<CollectionData>> {
        if let Some(col) = self.collections.read().get(name) {
            return Arc::clone(col);
        }

        let mut collections = self.collections.write();
        Arc::clone(collections.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!("Created collection '{}'", name);
            Arc::new(RwLock::new(CollectionData::new(&self.config)))
        }))
    }
}

impl Default for QuillEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use pretty_assertions::assert_eq;

    use super::*;

    fn scenario_engine() -> QuillEngine {
        // Keys [3, 1, 4, 1, 5] in a non-unique index on "n"
        let engine = QuillEngine::default();
        engine.ensure_index("nums", "n", false).unwrap();
        for key in [3, 1, 4, 1, 5] {
            engine
                .insert("nums", Document::new().set("n", key))
                .unwrap();
        }
        engine
    }

    fn above_two() -> Query {
        Query::filter("n", |v| *v > Value::Int32(2), Order::Ascending).unwrap()
    }

    #[test]
    fn test_count_without_query_is_doc_count() {
        let engine = QuillEngine::default();
        for i in 0..3 {
            engine
                .insert("plain", Document::new().set("i", i))
                .unwrap();
        }

        // No index required: the maintained count answers this
        assert_eq!(engine.count("plain", None).unwrap(), 3);
    }

    #[test]
    fn test_count_with_query() {
        let engine = scenario_engine();

        assert_eq!(engine.count("nums", Some(&above_two())).unwrap(), 3);

        let all = Query::filter("n", |_| true, Order::Ascending).unwrap();
        assert_eq!(engine.count("nums", Some(&all)).unwrap(), 5);

        let none = Query::filter("n", |v| *v > Value::Int32(9), Order::Ascending).unwrap();
        assert_eq!(engine.count("nums", Some(&none)).unwrap(), 0);
    }

    #[test]
    fn test_exists_iff_count_positive() {
        let engine = scenario_engine();

        let one = Query::filter("n", |v| *v == Value::Int32(1), Order::Ascending).unwrap();
        let nine = Query::filter("n", |v| *v == Value::Int32(9), Order::Ascending).unwrap();

        assert!(engine.exists("nums", &one).unwrap());
        assert!(engine.count("nums", Some(&one)).unwrap() > 0);
        assert!(!engine.exists("nums", &nine).unwrap());
        assert_eq!(engine.count("nums", Some(&nine)).unwrap(), 0);
    }

    #[test]
    fn test_count_is_order_invariant() {
        let engine = scenario_engine();

        let asc = Query::filter("n", |v| *v > Value::Int32(2), Order::Ascending).unwrap();
        let desc = Query::filter("n", |v| *v > Value::Int32(2), Order::Descending).unwrap();

        assert_eq!(
            engine.count("nums", Some(&asc)).unwrap(),
            engine.count("nums", Some(&desc)).unwrap()
        );
    }

    #[test]
    fn test_min_max_bounds() {
        let engine = scenario_engine();

        assert_eq!(engine.min("nums").unwrap(), Value::Int32(1));
        assert_eq!(engine.max("nums").unwrap(), Value::Int32(5));
    }

    #[test]
    fn test_exists_short_circuits() {
        let engine = scenario_engine();

        let calls = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&calls);
        let query = Query::filter(
            "n",
            move |_| {
                probe.fetch_add(1, AtomicOrdering::SeqCst);
                true
            },
            Order::Ascending,
        )
        .unwrap();

        assert!(engine.exists("nums", &query).unwrap());
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_empty_collection_aggregates() {
        let engine = QuillEngine::default();
        engine.ensure_index("empty", "n", false).unwrap();

        assert_eq!(engine.count("empty", Some(&above_two())).unwrap(), 0);
        assert!(!engine.exists("empty", &above_two()).unwrap());
        assert_eq!(engine.min("empty").unwrap(), Value::MinValue);
        assert_eq!(engine.max("empty").unwrap(), Value::MaxValue);
    }

    #[test]
    fn test_unknown_collection_is_logically_empty() {
        let engine = QuillEngine::default();

        assert_eq!(engine.count("ghost", None).unwrap(), 0);
        assert_eq!(engine.count("ghost", Some(&above_two())).unwrap(), 0);
        assert!(!engine.exists("ghost", &above_two()).unwrap());
        assert_eq!(engine.min("ghost").unwrap(), Value::MinValue);
        assert_eq!(engine.max("ghost").unwrap(), Value::MaxValue);
    }

    #[test]
    fn test_unindexed_field_matches_nothing() {
        let engine = scenario_engine();

        let query = Query::filter("other", |_| true, Order::Ascending).unwrap();
        assert_eq!(engine.count("nums", Some(&query)).unwrap(), 0);
        assert!(!engine.exists("nums", &query).unwrap());
    }

    #[test]
    fn test_aggregates_are_idempotent() {
        let engine = scenario_engine();
        let query = above_two();

        let first = engine.count("nums", Some(&query)).unwrap();
        let second = engine.count("nums", Some(&query)).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            engine.exists("nums", &query).unwrap(),
            engine.exists("nums", &query).unwrap()
        );
    }

    #[test]
    fn test_min_max_use_primary_index() {
        let engine = QuillEngine::default();
        engine.ensure_index("col", "a", false).unwrap();
        engine.ensure_index("col", "b", false).unwrap();
        engine
            .insert("col", Document::new().set("a", 5).set("b", 100))
            .unwrap();
        engine
            .insert("col", Document::new().set("a", 7).set("b", 50))
            .unwrap();

        // Slot 0 is "a": min/max never consult the "b" index
        assert_eq!(engine.min("col").unwrap(), Value::Int32(5));
        assert_eq!(engine.max("col").unwrap(), Value::Int32(7));
    }

    #[test]
    fn test_missing_field_indexes_as_null() {
        let engine = QuillEngine::default();
        engine.ensure_index("col", "n", false).unwrap();
        engine.insert("col", Document::new().set("n", 1)).unwrap();
        engine
            .insert("col", Document::new().set("other", 2))
            .unwrap();

        let nulls = Query::filter("n", |v| v.is_null(), Order::Ascending).unwrap();
        assert_eq!(engine.count("col", Some(&nulls)).unwrap(), 1);
        assert_eq!(engine.min("col").unwrap(), Value::Null);
    }

    #[test]
    fn test_ensure_index_backfills_existing_documents() {
        let engine = QuillEngine::default();
        for key in [10, 20, 30] {
            engine.insert("col", Document::new().set("n", key)).unwrap();
        }

        assert!(engine.ensure_index("col", "n", false).unwrap());
        assert!(!engine.ensure_index("col", "n", false).unwrap());

        let query = Query::filter("n", |v| *v >= Value::Int32(20), Order::Ascending).unwrap();
        assert_eq!(engine.count("col", Some(&query)).unwrap(), 2);
    }

    #[test]
    fn test_ensure_index_uniqueness_mismatch() {
        let engine = QuillEngine::default();
        engine.ensure_index("col", "n", false).unwrap();

        let err = engine.ensure_index("col", "n", true).unwrap_err();
        assert!(matches!(err, QuillError::InvalidInput(_)));
    }

    #[test]
    fn test_ensure_index_backfill_unique_violation() {
        let engine = QuillEngine::default();
        engine.insert("col", Document::new().set("n", 1)).unwrap();
        engine.insert("col", Document::new().set("n", 1)).unwrap();

        let err = engine.ensure_index("col", "n", true).unwrap_err();
        assert!(matches!(err, QuillError::Index(_)));

        // The failed index was not published; a non-unique one still works
        assert!(engine.ensure_index("col", "n", false).unwrap());
        let all = Query::filter("n", |_| true, Order::Ascending).unwrap();
        assert_eq!(engine.count("col", Some(&all)).unwrap(), 2);
    }

    #[test]
    fn test_unique_insert_rejected_without_side_effects() {
        let engine = QuillEngine::default();
        engine.ensure_index("col", "n", true).unwrap();
        engine.insert("col", Document::new().set("n", 7)).unwrap();

        let err = engine
            .insert("col", Document::new().set("n", 7))
            .unwrap_err();
        assert!(matches!(err, QuillError::Index(_)));
        assert_eq!(engine.count("col", None).unwrap(), 1);
    }

    #[test]
    fn test_update_rekeys_indexes() {
        let engine = QuillEngine::default();
        engine.ensure_index("col", "n", false).unwrap();
        let record = engine.insert("col", Document::new().set("n", 1)).unwrap();

        assert!(engine
            .update("col", record, Document::new().set("n", 10))
            .unwrap());

        let old = Query::filter("n", |v| *v == Value::Int32(1), Order::Ascending).unwrap();
        let new = Query::filter("n", |v| *v == Value::Int32(10), Order::Ascending).unwrap();
        assert_eq!(engine.count("col", Some(&old)).unwrap(), 0);
        assert_eq!(engine.count("col", Some(&new)).unwrap(), 1);
        assert_eq!(engine.count("col", None).unwrap(), 1);

        assert!(!engine
            .update("col", RecordId(999), Document::new().set("n", 0))
            .unwrap());
    }

    #[test]
    fn test_delete_by_query() {
        let engine = scenario_engine();

        assert_eq!(engine.delete("nums", &above_two()).unwrap(), 3);
        assert_eq!(engine.count("nums", None).unwrap(), 2);
        assert_eq!(engine.min("nums").unwrap(), Value::Int32(1));
        assert_eq!(engine.max("nums").unwrap(), Value::Int32(1));
        assert!(!engine.exists("nums", &above_two()).unwrap());
    }

    #[test]
    fn test_create_and_drop_collection() {
        let engine = QuillEngine::default();

        engine.create_collection("col").unwrap();
        assert!(engine.create_collection("col").is_err());
        assert_eq!(engine.collection_names(), vec!["col".to_string()]);

        assert!(engine.drop_collection("col"));
        assert!(!engine.drop_collection("col"));
        assert_eq!(engine.count("col", None).unwrap(), 0);
    }

    #[test]
    fn test_drop_index() {
        let engine = scenario_engine();

        assert!(engine.drop_index("nums", "n").unwrap());
        assert!(!engine.drop_index("nums", "n").unwrap());

        // Aggregate queries on the dropped index now match nothing
        assert_eq!(engine.count("nums", Some(&above_two())).unwrap(), 0);
        // The maintained count is untouched
        assert_eq!(engine.count("nums", None).unwrap(), 5);
    }
}
