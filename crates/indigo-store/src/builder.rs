//! Query construction surface for callers outside the engine.
//!
//! Scripting and service layers build queries with [`condition`] (or
//! [`parse_condition`] when the operator arrives as text), [`and`] and
//! [`or`]. They never see backend filter syntax.

use serde_json::Value;

use crate::query::{BinaryOp, CompareOp, Condition, LogicalOp, QueryError, QueryNode};

/// Leaf constructor: `field op value`.
pub fn condition(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> QueryNode {
    QueryNode::Condition(Condition::new(field, op, value))
}

/// Leaf constructor taking the operator as text (`=`, `==`, `!=`, `>`, `<`,
/// `>=`, `<=`).
pub fn parse_condition(
    field: impl Into<String>,
    op: &str,
    value: impl Into<Value>,
) -> Result<QueryNode, QueryError> {
    let field = field.into();
    if field.is_empty() {
        return Err(QueryError::EmptyField);
    }
    Ok(condition(field, op.parse()?, value))
}

/// `left AND right`.
pub fn and(left: QueryNode, right: QueryNode) -> QueryNode {
    combine(left, LogicalOp::And, right)
}

/// `left OR right`.
pub fn or(left: QueryNode, right: QueryNode) -> QueryNode {
    combine(left, LogicalOp::Or, right)
}

fn combine(left: QueryNode, op: LogicalOp, right: QueryNode) -> QueryNode {
    QueryNode::BinaryOp(BinaryOp {
        left: Box::new(left),
        right: Box::new(right),
        op,
    })
}

/// Fluent wrapper around a growing [`QueryNode`].
///
/// ```ignore
/// use indigo_store::{CompareOp, QueryBuilder};
///
/// let q = QueryBuilder::condition("name", CompareOp::Eq, "erin")
///     .and(indigo_store::builder::condition("age", CompareOp::Ge, 18))
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    query: QueryNode,
}

impl QueryBuilder {
    /// Start from an existing node.
    pub fn new(query: QueryNode) -> Self {
        Self { query }
    }

    /// Start from a single condition.
    pub fn condition(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::new(condition(field, op, value))
    }

    /// `self AND other`.
    pub fn and(self, other: QueryNode) -> Self {
        Self::new(and(self.query, other))
    }

    /// `self OR other`.
    pub fn or(self, other: QueryNode) -> Self {
        Self::new(or(self.query, other))
    }

    /// Fold `nodes` left to right with AND. `None` for an empty list.
    pub fn all_of(nodes: impl IntoIterator<Item = QueryNode>) -> Option<QueryNode> {
        nodes.into_iter().reduce(and)
    }

    /// Fold `nodes` left to right with OR. `None` for an empty list.
    pub fn any_of(nodes: impl IntoIterator<Item = QueryNode>) -> Option<QueryNode> {
        nodes.into_iter().reduce(or)
    }

    /// Finish building.
    pub fn build(self) -> QueryNode {
        self.query
    }
}

impl From<QueryBuilder> for QueryNode {
    fn from(b: QueryBuilder) -> Self {
        b.build()
    }
}
