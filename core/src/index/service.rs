//! Traversal and mutation engine for collection indexes

use std::cmp::Ordering;

use rand::Rng;

use crate::data::RecordId;
use crate::error::{QuillError, QuillResult};
use crate::index::{CollectionIndex, IndexNode, NodeId};
use crate::query::Order;
use crate::value::Value;

/// Skip-list engine.
///
/// Owns every index algorithm; [`CollectionIndex`] stays pure data. The
/// service is stateless and one instance is shared by all collections.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexService;

impl IndexService {
    /// Create a new index service
    pub fn new() -> Self {
        Self
    }

    /// Produce all live nodes in key order.
    ///
    /// The returned sequence is lazy (one link-hop per `next()` call),
    /// finite (bounded by the live-node count at call time) and not
    /// restartable. Callers must not mutate the index while the sequence
    /// is outstanding.
    pub fn find_all<'a>(&self, index: &'a CollectionIndex, order: Order) -> FindAll<'a> {
        let start = match order {
            Order::Ascending => index.head(),
            Order::Descending => index.tail(),
        };

        FindAll {
            index,
            current: start,
            order,
            remaining: index.len(),
        }
    }

    /// Point lookup: the first node whose key equals `key`
    pub fn find<'a>(&self, index: &'a CollectionIndex, key: &Value) -> Option<&'a IndexNode> {
        let current = self.seek(index, key);

        let candidate = index.node(current).next(0)?;
        if candidate == index.tail() {
            return None;
        }

        let node = index.node(candidate);
        (node.key() == key).then_some(node)
    }

    /// Insert a key for `record`, preserving key order at every moment.
    ///
    /// Equal keys in a non-unique index are linked after existing ones, so
    /// duplicates traverse in insertion order. A duplicate key in a unique
    /// index fails without modifying the structure.
    pub fn insert(
        &self,
        index: &mut CollectionIndex,
        key: Value,
        record: RecordId,
    ) -> QuillResult<NodeId> {
        if index.is_unique() && self.find(index, &key).is_some() {
            return Err(QuillError::Index(format!(
                "Duplicate key {} in unique index '{}'",
                key,
                index.expression()
            )));
        }

        let level = self.random_level(index.max_level());

        // Rightmost node with key <= new key at each level: the nodes the
        // new links splice in after.
        let mut path = vec![index.head(); index.max_level()];
        let mut current = index.head();
        for lvl in (0..index.max_level()).rev() {
            while let Some(next) = index.node(current).next(lvl) {
                if next == index.tail() || index.node(next).key() > &key {
                    break;
                }
                current = next;
            }
            path[lvl] = current;
        }

        let id = index.alloc(IndexNode::new(key, record, level));
        for (lvl, prev) in path.iter().copied().enumerate().take(level) {
            let next = index.node(prev).next(lvl);
            index.node_mut(id).set_prev(lvl, Some(prev));
            index.node_mut(id).set_next(lvl, next);
            if let Some(next) = next {
                index.node_mut(next).set_prev(lvl, Some(id));
            }
            index.node_mut(prev).set_next(lvl, Some(id));
        }

        index.register(record, id);
        Ok(id)
    }

    /// Unlink and free the node indexing `record`. Returns whether one existed.
    pub fn delete(&self, index: &mut CollectionIndex, record: RecordId) -> bool {
        let Some(id) = index.node_for_record(record) else {
            return false;
        };

        for lvl in 0..index.node(id).level() {
            let prev = index.node(id).prev(lvl);
            let next = index.node(id).next(lvl);
            if let Some(prev) = prev {
                index.node_mut(prev).set_next(lvl, next);
            }
            if let Some(next) = next {
                index.node_mut(next).set_prev(lvl, prev);
            }
        }

        index.release(record, id);
        true
    }

    /// Rightmost node strictly before the first key >= `key` at level 0
    fn seek(&self, index: &CollectionIndex, key: &Value) -> NodeId {
        let mut current = index.head();
        for lvl in (0..index.max_level()).rev() {
            while let Some(next) = index.node(current).next(lvl) {
                if next == index.tail() {
                    break;
                }
                match index.node(next).key().cmp(key) {
                    Ordering::Less => current = next,
                    Ordering::Equal | Ordering::Greater => break,
                }
            }
        }
        current
    }

    fn random_level(&self, cap: usize) -> usize {
        let mut rng = rand::thread_rng();
        let mut level = 1;
        while level < cap && rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }
}

/// Lazy, direction-aware traversal over an index's live nodes.
///
/// Starts just past the entry sentinel and stops at the opposite one. Each
/// `next()` performs a single link-hop; nothing is buffered, so a consumer
/// that stops pulling abandons the remainder at no cost.
pub struct FindAll<'a> {
    index: &'a CollectionIndex,
    current: NodeId,
    order: Order,
    remaining: usize,
}

impl<'a> Iterator for FindAll<'a> {
    type Item = &'a IndexNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let node = self.index.node(self.current);
        let (hop, stop) = match self.order {
            Order::Ascending => (node.next(0), self.index.tail()),
            Order::Descending => (node.prev(0), self.index.head()),
        };

        let id = hop?;
        if id == stop {
            self.remaining = 0;
            return None;
        }

        self.remaining -= 1;
        self.current = id;
        Some(self.index.node(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
