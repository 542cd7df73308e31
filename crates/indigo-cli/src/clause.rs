//! `--where` clause parsing.
//!
//! A clause is `field op value`. Spaces around the operator are optional.
//! The value is read as JSON (`18`, `true`, `"x y"`, `[1,2]`) and falls
//! back to a bare string, so `name = erin` works without quoting.

use anyhow::{Result, bail};
use indigo_store::{QueryBuilder, QueryNode, parse_condition};
use serde_json::Value;

use crate::cli::FilterArgs;

const OPERATOR_CHARS: &[char] = &['=', '!', '<', '>'];

/// Parse one clause into a condition.
pub fn parse_clause(clause: &str) -> Result<QueryNode> {
    let Some(start) = clause.find(OPERATOR_CHARS) else {
        bail!("clause `{clause}` has no operator (expected one of = == != > < >= <=)");
    };
    let rest = &clause[start..];
    let op_len = rest
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(rest.len());

    let field = clause[..start].trim();
    let op = &rest[..op_len];
    let raw = rest[op_len..].trim();

    if field.is_empty() {
        bail!("clause `{clause}` has no field name");
    }
    if raw.is_empty() {
        bail!("clause `{clause}` has no value");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok(parse_condition(field, op, value)?)
}

impl FilterArgs {
    /// The combined query, `None` when no clause was given.
    pub fn query(&self) -> Result<Option<QueryNode>> {
        let nodes = self
            .clauses
            .iter()
            .map(|c| parse_clause(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(if self.any {
            QueryBuilder::any_of(nodes)
        } else {
            QueryBuilder::all_of(nodes)
        })
    }
}

#[cfg(test)]
mod tests {
    use indigo_store::{CompareOp, condition};
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_spaced_and_compact_forms() {
        assert_eq!(
            parse_clause("age >= 18").unwrap(),
            condition("age", CompareOp::Ge, 18)
        );
        assert_eq!(
            parse_clause("age>=18").unwrap(),
            condition("age", CompareOp::Ge, 18)
        );
        assert_eq!(
            parse_clause("name==erin").unwrap(),
            condition("name", CompareOp::Eq, "erin")
        );
    }

    #[test]
    fn values_are_json_with_string_fallback() {
        assert_eq!(
            parse_clause("age = \"17\"").unwrap(),
            condition("age", CompareOp::Eq, "17")
        );
        assert_eq!(
            parse_clause("vip != true").unwrap(),
            condition("vip", CompareOp::Ne, true)
        );
        assert_eq!(
            parse_clause("tags = [\"a\", \"b\"]").unwrap(),
            condition("tags", CompareOp::Eq, json!(["a", "b"]))
        );
        assert_eq!(
            parse_clause("city = New York").unwrap(),
            condition("city", CompareOp::Eq, "New York")
        );
    }

    #[test]
    fn rejects_malformed_clauses() {
        assert!(parse_clause("age 18").is_err());
        assert!(parse_clause("= 18").is_err());
        assert!(parse_clause("age >=").is_err());
        assert!(parse_clause("age =< 18").is_err());
    }

    #[test]
    fn filter_args_combine_clauses() {
        let none = FilterArgs::default();
        assert!(none.query().unwrap().is_none());

        let all = FilterArgs {
            clauses: vec!["a = 1".into(), "b = 2".into()],
            any: false,
        };
        assert_eq!(all.query().unwrap().unwrap().to_string(), "(a = 1) AND (b = 2)");

        let any = FilterArgs {
            clauses: vec!["a = 1".into(), "b = 2".into()],
            any: true,
        };
        assert_eq!(any.query().unwrap().unwrap().to_string(), "(a = 1) OR (b = 2)");
    }
}
