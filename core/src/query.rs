//! Predicate queries executed against collection indexes

use std::fmt;
use std::sync::Arc;

use crate::error::{QuillError, QuillResult};
use crate::index::{CollectionIndex, IndexNode, IndexService};
use crate::value::Value;

/// Direction of an index traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Predicate over an index key
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A query: a closed set of predicate variants, each able to execute
/// itself against an index as a filtered lazy node sequence.
///
/// Variants dispatch through [`execute_index`](Query::execute_index); the
/// aggregate layer never branches on the concrete variant. The predicate
/// only ever sees index keys, so executing a query touches no stored
/// document.
#[derive(Clone)]
pub enum Query {
    Where {
        field: String,
        predicate: Predicate,
        order: Order,
    },
}

impl Query {
    /// Build a `Where` query: scan the index on `field` in `order` and
    /// keep the nodes whose key satisfies `predicate`.
    ///
    /// Fails with `InvalidInput` if the field expression is empty.
    pub fn filter(
        field: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
        order: Order,
    ) -> QuillResult<Self> {
        let field = field.into();
        if field.trim().is_empty() {
            return Err(QuillError::InvalidInput(
                "Query field expression must not be empty".into(),
            ));
        }

        Ok(Query::Where {
            field,
            predicate: Arc::new(predicate),
            order,
        })
    }

    /// The field whose index this query targets
    pub fn field(&self) -> &str {
        match self {
            Query::Where { field, .. } => field,
        }
    }

    /// Traversal direction
    pub fn order(&self) -> Order {
        match self {
            Query::Where { order, .. } => *order,
        }
    }

    /// Execute against `index`, yielding matching nodes lazily.
    ///
    /// One node is examined per pull, so short-circuit consumers pay for
    /// exactly the prefix they consume.
    pub(crate) fn execute_index<'a>(
        &'a self,
        indexer: &IndexService,
        index: &'a CollectionIndex,
    ) -> Box<dyn Iterator<Item = &'a IndexNode> + 'a> {
        match self {
            Query::Where {
                predicate, order, ..
            } => Box::new(
                indexer
                    .find_all(index, *order)
                    .filter(move |node| predicate(node.key())),
            ),
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Where { field, order, .. } => f
                .debug_struct("Where")
                .field("field", field)
                .field("order", order)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RecordId;

    #[test]
    fn test_filter_rejects_empty_field() {
        let err = Query::filter("", |_| true, Order::Ascending).unwrap_err();
        assert!(matches!(err, QuillError::InvalidInput(_)));

        let err = Query::filter("   ", |_| true, Order::Descending).unwrap_err();
        assert!(matches!(err, QuillError::InvalidInput(_)));
    }

    #[test]
    fn test_execute_index_filters_keys() {
        let service = IndexService::new();
        let mut index = CollectionIndex::new("n", false, 8);
        for (i, key) in [3, 1, 4, 1, 5].into_iter().enumerate() {
            service
                .insert(&mut index, Value::Int32(key), RecordId(i as u32))
                .unwrap();
        }

        let query = Query::filter("n", |v| *v > Value::Int32(2), Order::Ascending).unwrap();
        let matched: Vec<Value> = query
            .execute_index(&service, &index)
            .map(|node| node.key().clone())
            .collect();

        assert_eq!(
            matched,
            vec![Value::Int32(3), Value::Int32(4), Value::Int32(5)]
        );
    }

    #[test]
    fn test_execute_index_respects_order() {
        let service = IndexService::new();
        let mut index = CollectionIndex::new("n", false, 8);
        for (i, key) in [2, 9, 6].into_iter().enumerate() {
            service
                .insert(&mut index, Value::Int32(key), RecordId(i as u32))
                .unwrap();
        }

        let query = Query::filter("n", |_| true, Order::Descending).unwrap();
        let keys: Vec<Value> = query
            .execute_index(&service, &index)
            .map(|node| node.key().clone())
            .collect();

        assert_eq!(
            keys,
            vec![Value::Int32(9), Value::Int32(6), Value::Int32(2)]
        );
    }
}
