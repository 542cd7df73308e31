//! Boolean predicate trees over entities.
//!
//! A [`QueryNode`] is either a leaf [`Condition`] (`field op value`) or a
//! [`BinaryOp`] joining two nodes with AND / OR. The same tree is evaluated
//! in process by the file backend ([`QueryNode::evaluate`]) and compiled to a
//! native filter document by the MongoDB backend
//! ([`QueryNode::compile_filter`]). The comparison rules below follow the
//! document database's type brackets so both targets select the same
//! documents:
//!
//! - numbers compare numerically whatever their integer/float encoding;
//! - strings compare by byte order;
//! - booleans order `false < true`, and `null` only equals `null`;
//! - arrays and objects compare structurally for `=` / `!=`;
//! - an array field matches a scalar operand when any element matches;
//! - ordering across different brackets is `false`.
//!
//! A condition on a field the entity does not have is an error, not a
//! non-match.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;

// ═══════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════

/// Errors raised while evaluating or compiling a query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// The condition names a field the entity does not have.
    #[error("no field `{field}` found in entity")]
    MissingField { field: String },

    /// The operator text is not one of `= != > < >= <=` / `AND OR`.
    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),

    /// A condition's field name is empty.
    #[error("condition field name is empty")]
    EmptyField,
}

// ═══════════════════════════════════════════════════════════════════════
//  Operators
// ═══════════════════════════════════════════════════════════════════════

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl CompareOp {
    /// All operators, in display order.
    pub const ALL: [CompareOp; 6] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Gt,
        CompareOp::Lt,
        CompareOp::Ge,
        CompareOp::Le,
    ];

    /// The textual form used in queries and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    /// The matching MongoDB query operator.
    pub fn mongo_operator(&self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Lt => "$lt",
            Self::Ge => "$gte",
            Self::Le => "$lte",
        }
    }

    /// Whether an ordering result satisfies this operator.
    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Lt => ord == Ordering::Less,
            Self::Ge => ord != Ordering::Less,
            Self::Le => ord != Ordering::Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            other => Err(QueryError::UnsupportedOperator(other.to_string())),
        }
    }
}

/// Combinator of a [`BinaryOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    /// `AND` / `OR`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    /// The matching MongoDB query operator.
    pub fn mongo_operator(&self) -> &'static str {
        match self {
            Self::And => "$and",
            Self::Or => "$or",
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" | "&&" => Ok(Self::And),
            "OR" | "||" => Ok(Self::Or),
            _ => Err(QueryError::UnsupportedOperator(s.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tree
// ═══════════════════════════════════════════════════════════════════════

/// Leaf comparison: `field op value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

/// `left op right`, where `op` is AND or OR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryOp {
    pub left: Box<QueryNode>,
    pub right: Box<QueryNode>,
    pub op: LogicalOp,
}

/// A predicate over an [`Entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryNode {
    Condition(Condition),
    BinaryOp(BinaryOp),
}

impl QueryNode {
    /// Decide whether `entity` matches.
    ///
    /// Both sides of a [`BinaryOp`] are always evaluated; if either fails the
    /// left error is reported first.
    pub fn evaluate(&self, entity: &Entity) -> Result<bool, QueryError> {
        match self {
            Self::Condition(c) => c.evaluate(entity),
            Self::BinaryOp(b) => b.evaluate(entity),
        }
    }

    /// Check the tree for problems evaluation would only hit per entity.
    pub fn validate(&self) -> Result<(), QueryError> {
        match self {
            Self::Condition(c) if c.field.is_empty() => Err(QueryError::EmptyField),
            Self::Condition(_) => Ok(()),
            Self::BinaryOp(b) => {
                b.left.validate()?;
                b.right.validate()
            }
        }
    }
}

impl Condition {
    /// Build a condition.
    pub fn new(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Compare the entity's field against the operand.
    pub fn evaluate(&self, entity: &Entity) -> Result<bool, QueryError> {
        let candidates = lookup(entity, &self.field);
        if candidates.is_empty() {
            return Err(QueryError::MissingField {
                field: self.field.clone(),
            });
        }
        Ok(field_matches(&candidates, self.op, &self.value))
    }
}

impl BinaryOp {
    /// Evaluate both children and combine them.
    pub fn evaluate(&self, entity: &Entity) -> Result<bool, QueryError> {
        let left = self.left.evaluate(entity);
        let right = self.right.evaluate(entity);
        let (left, right) = (left?, right?);
        Ok(match self.op {
            LogicalOp::And => left && right,
            LogicalOp::Or => left || right,
        })
    }
}

impl From<Condition> for QueryNode {
    fn from(c: Condition) -> Self {
        Self::Condition(c)
    }
}

impl From<BinaryOp> for QueryNode {
    fn from(b: BinaryOp) -> Self {
        Self::BinaryOp(b)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {} ({})", self.left, self.op, self.right)
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(c) => c.fmt(f),
            Self::BinaryOp(b) => b.fmt(f),
        }
    }
}

/// Render an optional query for messages; `None` matches everything.
pub fn describe(query: Option<&QueryNode>) -> String {
    match query {
        Some(q) => q.to_string(),
        None => "<all>".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Comparison
// ═══════════════════════════════════════════════════════════════════════

/// Every value `field` names in the entity: the literal key first, then a
/// dotted path through nested objects. A path segment that reaches an array
/// continues into each of its object elements, so `items.name` over
/// `items: [{name: "a"}, {name: "b"}]` yields both names.
fn lookup<'a>(entity: &'a Entity, field: &str) -> Vec<&'a Value> {
    if let Some(v) = entity.get(field) {
        return vec![v];
    }
    let mut found = Vec::new();
    if let Some((head, rest)) = field.split_once('.') {
        if let Some(v) = entity.get(head) {
            descend(v, rest, &mut found);
        }
    }
    found
}

fn descend<'a>(value: &'a Value, path: &str, found: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            let (part, rest) = match path.split_once('.') {
                Some((part, rest)) => (part, Some(rest)),
                None => (path, None),
            };
            match (map.get(part), rest) {
                (Some(next), Some(rest)) => descend(next, rest, found),
                (Some(next), None) => found.push(next),
                (None, _) => {}
            }
        }
        // Only one level: arrays nested directly in arrays are not entered.
        Value::Array(items) => {
            for item in items.iter().filter(|item| item.is_object()) {
                descend(item, path, found);
            }
        }
        _ => {}
    }
}

/// `!=` holds when no candidate equals the operand; every other operator
/// holds when any candidate satisfies it.
fn field_matches(candidates: &[&Value], op: CompareOp, operand: &Value) -> bool {
    match op {
        CompareOp::Eq => candidates.iter().any(|v| equals(v, operand)),
        CompareOp::Ne => !candidates.iter().any(|v| equals(v, operand)),
        _ => candidates.iter().any(|v| match v {
            Value::Array(items) => items.iter().any(|item| ordered(item, op, operand)),
            _ => ordered(v, op, operand),
        }),
    }
}

/// `=` with array-contains semantics for array fields.
fn equals(actual: &Value, operand: &Value) -> bool {
    if values_equal(actual, operand) {
        return true;
    }
    match actual {
        Value::Array(items) => items.iter().any(|item| values_equal(item, operand)),
        _ => false,
    }
}

fn ordered(actual: &Value, op: CompareOp, operand: &Value) -> bool {
    match compare_values(actual, operand) {
        Some(ord) => op.accepts(ord),
        None => false,
    }
}

/// Structural equality with numeric comparison across representations.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Order two scalars of the same bracket; `None` across brackets.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
