//! Public database and collection handles

use std::sync::Arc;

use crate::EngineConfig;
use crate::data::RecordId;
use crate::document::Document;
use crate::engine::QuillEngine;
use crate::error::{QuillError, QuillResult};
use crate::query::Query;
use crate::value::Value;

/// Entry point: owns the engine and hands out collection handles.
///
/// The engine is injected explicitly: handles built from the same
/// `Database` share one engine, and nothing is process-global.
pub struct Database {
    engine: Arc<QuillEngine>,
}

impl Database {
    /// Open an in-memory database
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Arc::new(QuillEngine::new(config)),
        }
    }

    /// Build a database around an existing engine
    pub fn with_engine(engine: Arc<QuillEngine>) -> Self {
        Self { engine }
    }

    /// Get a handle to a collection. The collection itself is created
    /// lazily on first write.
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            engine: Arc::clone(&self.engine),
            name: name.to_string(),
        }
    }

    /// The shared engine
    pub fn engine(&self) -> &Arc<QuillEngine> {
        &self.engine
    }

    /// List collection names
    pub fn collection_names(&self) -> Vec<String> {
        self.engine.collection_names()
    }

    /// Drop a collection, returning whether it existed
    pub fn drop_collection(&self, name: &str) -> bool {
        self.engine.drop_collection(name)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Handle to one collection: thin delegation into the engine.
///
/// The query-taking operations require a query; passing `None` fails with
/// `InvalidInput` before any work is done.
#[derive(Clone)]
pub struct Collection {
    engine: Arc<QuillEngine>,
    name: String,
}

impl Collection {
    /// The collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the document count from the maintained collection total.
    /// Does not use indexes. Saturates at `u32::MAX`.
    pub fn count(&self) -> QuillResult<u32> {
        self.engine
            .count(&self.name, None)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
    }

    /// Count documents matching a query without deserializing any of
    /// them. Needs an index on the query expression. Saturates at
    /// `u32::MAX`.
    pub fn count_by(&self, query: Option<&Query>) -> QuillResult<u32> {
        let query = Self::required(query, "count_by")?;
        self.engine
            .count(&self.name, Some(query))
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
    }

    /// Get the document count from the maintained collection total.
    /// Does not use indexes.
    pub fn long_count(&self) -> QuillResult<u64> {
        self.engine.count(&self.name, None)
    }

    /// Count documents matching a query without deserializing any of
    /// them. Needs an index on the query expression.
    pub fn long_count_by(&self, query: Option<&Query>) -> QuillResult<u64> {
        let query = Self::required(query, "long_count_by")?;
        self.engine.count(&self.name, Some(query))
    }

    /// Returns true if the query matches any document. Stops at the first
    /// match and never deserializes a document.
    pub fn exists(&self, query: Option<&Query>) -> QuillResult<bool> {
        let query = Self::required(query, "exists")?;
        self.engine.exists(&self.name, query)
    }

    /// The first (minimum) key of the collection's primary index
    pub fn min(&self) -> QuillResult<Value> {
        self.engine.min(&self.name)
    }

    /// The last (maximum) key of the collection's primary index
    pub fn max(&self) -> QuillResult<Value> {
        self.engine.max(&self.name)
    }

    /// Insert a document
    pub fn insert(&self, doc: Document) -> QuillResult<RecordId> {
        self.engine.insert(&self.name, doc)
    }

    /// Replace a stored document, returning whether it existed
    pub fn update(&self, record: RecordId, doc: Document) -> QuillResult<bool> {
        self.engine.update(&self.name, record, doc)
    }

    /// Delete every document matching the query, returning the number
    /// removed
    pub fn delete(&self, query: Option<&Query>) -> QuillResult<u64> {
        let query = Self::required(query, "delete")?;
        self.engine.delete(&self.name, query)
    }

    /// Ensure an index exists on a field, returning whether it was created
    pub fn ensure_index(&self, expression: &str, unique: bool) -> QuillResult<bool> {
        self.engine.ensure_index(&self.name, expression, unique)
    }

    /// Drop an index, returning whether it existed
    pub fn drop_index(&self, expression: &str) -> QuillResult<bool> {
        self.engine.drop_index(&self.name, expression)
    }

    fn required<'q>(query: Option<&'q Query>, operation: &str) -> QuillResult<&'q Query> {
        query.ok_or_else(|| {
            QuillError::InvalidInput(format!("{} requires a query", operation))
        })
    }
}
