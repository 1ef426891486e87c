//! Ordered index structure: arena-backed skip list with sentinel bounds

pub mod service;

use std::collections::HashMap;

use smallvec::{SmallVec, smallvec};

use crate::data::RecordId;
use crate::error::{QuillError, QuillResult};
use crate::value::Value;

pub use service::{FindAll, IndexService};

/// Hard cap on skip-list height
pub const MAX_LEVELS: usize = 32;

/// Record id stored on the head/tail sentinels, which own no document
const SENTINEL_RECORD: RecordId = RecordId(u32::MAX);

/// Stable handle to a node within its owning index's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One element of an ordered index: a key, the location of the owning
/// document, and the per-level links of the traversal path.
#[derive(Debug, Clone)]
pub struct IndexNode {
    key: Value,
    record: RecordId,
    prev: SmallVec<[Option<NodeId>; 4]>,
    next: SmallVec<[Option<NodeId>; 4]>,
}

impl IndexNode {
    fn new(key: Value, record: RecordId, level: usize) -> Self {
        Self {
            key,
            record,
            prev: smallvec![None; level],
            next: smallvec![None; level],
        }
    }

    /// The indexed key. Immutable for the node's lifetime.
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// Location of the owning document. Never dereferenced by this layer.
    pub fn record(&self) -> RecordId {
        self.record
    }

    /// Number of levels this node participates in
    pub fn level(&self) -> usize {
        self.next.len()
    }

    /// Forward link at `level`
    pub fn next(&self, level: usize) -> Option<NodeId> {
        self.next.get(level).copied().flatten()
    }

    /// Backward link at `level`
    pub fn prev(&self, level: usize) -> Option<NodeId> {
        self.prev.get(level).copied().flatten()
    }

    fn set_next(&mut self, level: usize, id: Option<NodeId>) {
        self.next[level] = id;
    }

    fn set_prev(&mut self, level: usize, id: Option<NodeId>) {
        self.prev[level] = id;
    }
}

/// Per-field index over one collection.
///
/// Owns its nodes in an arena addressed by [`NodeId`]; links are arena
/// handles rather than references, so the bidirectional chain carries no
/// ownership cycles. The `head`/`tail` sentinels (keyed `MinValue` and
/// `MaxValue`) exist from construction and bound every traversal; they are
/// never yielded as results.
pub struct CollectionIndex {
    expression: String,
    unique: bool,
    head: NodeId,
    tail: NodeId,
    max_level: usize,
    nodes: Vec<IndexNode>,
    free: Vec<NodeId>,
    by_record: HashMap<RecordId, NodeId>,
    len: usize,
}

impl CollectionIndex {
    /// Create an empty index for one field expression
    pub fn new(expression: impl Into<String>, unique: bool, max_level: usize) -> Self {
        let max_level = max_level.clamp(1, MAX_LEVELS);
        let head = NodeId(0);
        let tail = NodeId(1);

        let mut head_node = IndexNode::new(Value::MinValue, SENTINEL_RECORD, max_level);
        let mut tail_node = IndexNode::new(Value::MaxValue, SENTINEL_RECORD, max_level);
        for level in 0..max_level {
            head_node.set_next(level, Some(tail));
            tail_node.set_prev(level, Some(head));
        }

        Self {
            expression: expression.into(),
            unique,
            head,
            tail,
            max_level,
            nodes: vec![head_node, tail_node],
            free: Vec::new(),
            by_record: HashMap::new(),
            len: 0,
        }
    }

    /// The field expression whose evaluated value supplies the keys
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether duplicate keys are forbidden
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Head sentinel handle
    pub fn head(&self) -> NodeId {
        self.head
    }

    /// Tail sentinel handle
    pub fn tail(&self) -> NodeId {
        self.tail
    }

    /// Maximum skip-list height for this index
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Number of live (non-sentinel) nodes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index holds no keys
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolve a node handle
    pub fn node(&self, id: NodeId) -> &IndexNode {
        &self.nodes[id.index()]
    }

    /// Handle of the node indexing `record`, if any
    pub fn node_for_record(&self, record: RecordId) -> Option<NodeId> {
        self.by_record.get(&record).copied()
    }

    /// Check the sentinel invariants that every traversal relies on.
    ///
    /// Run at trust boundaries before handing the index to the traversal
    /// engine; a violation is a fatal integrity fault, not a recoverable
    /// condition.
    pub fn validate(&self) -> QuillResult<()> {
        let ok = self
            .nodes
            .get(self.head.index())
            .is_some_and(|h| matches!(h.key, Value::MinValue) && h.next(0).is_some())
            && self
                .nodes
                .get(self.tail.index())
                .is_some_and(|t| matches!(t.key, Value::MaxValue) && t.prev(0).is_some());

        if ok {
            Ok(())
        } else {
            Err(QuillError::Integrity(format!(
                "Sentinel invariants violated in index '{}'",
                self.expression
            )))
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut IndexNode {
        &mut self.nodes[id.index()]
    }

    fn alloc(&mut self, node: IndexNode) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = node;
            return id;
        }

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn register(&mut self, record: RecordId, id: NodeId) {
        self.by_record.insert(record, id);
        self.len += 1;
    }

    fn release(&mut self, record: RecordId, id: NodeId) {
        self.by_record.remove(&record);
        self.len -= 1;
        // Freed slots hold a stub until reused
        self.nodes[id.index()] = IndexNode::new(Value::Null, SENTINEL_RECORD, 0);
        self.free.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_index_shape() {
        let index = CollectionIndex::new("age", false, MAX_LEVELS);

        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert_eq!(index.node(index.head()).next(0), Some(index.tail()));
        assert_eq!(index.node(index.tail()).prev(0), Some(index.head()));
        assert!(index.validate().is_ok());
    }

    #[test]
    fn test_max_level_clamped() {
        let index = CollectionIndex::new("age", false, 1000);
        assert_eq!(index.max_level(), MAX_LEVELS);

        let index = CollectionIndex::new("age", false, 0);
        assert_eq!(index.max_level(), 1);
    }
}
