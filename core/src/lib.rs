//! QuillDB - embedded document database engine
//!
//! Aggregate queries (`count`, `exists`, `min`, `max`) are answered by
//! walking ordered per-field indexes directly; stored documents are never
//! deserialized on the query path.

pub mod collection;
pub mod data;
pub mod document;
pub mod engine;
pub mod error;
pub mod index;
pub mod query;
pub mod value;

pub use collection::{Collection, Database};
pub use data::RecordId;
pub use document::Document;
pub use engine::QuillEngine;
pub use error::{QuillError, QuillResult};
pub use index::{CollectionIndex, FindAll, IndexNode, IndexService, NodeId};
pub use query::{Order, Predicate, Query};
pub use value::Value;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Records a new collection reserves space for up front
    pub initial_capacity: usize,
    /// Skip-list height cap for new indexes (at most [`index::MAX_LEVELS`])
    pub max_index_level: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            max_index_level: index::MAX_LEVELS,
        }
    }
}
