//! Condition expressions for conditional step inclusion
//!
//! A condition is a pure predicate over the activity attribute bag,
//! evaluated exactly once when the request snapshot is taken. Grammar:
//! one or more comparisons joined by `&&`, each of the form
//! `attribute OP literal` where OP is one of `== != >= <= > <` and the
//! literal is a single-quoted string, a number, or `true`/`false`.
//!
//! Examples: `days > 3`, `paid == true && amount >= 500`,
//! `category == 'travel'`.

use crate::error::{EngineError, Result};
use approval_types::AttributeValue;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static CLAUSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*(==|!=|>=|<=|>|<)\s*(.+?)\s*$")
        .expect("clause regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparator {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Clause {
    attribute: String,
    comparator: Comparator,
    literal: AttributeValue,
}

impl Clause {
    /// Missing attributes and type mismatches evaluate to false rather
    /// than failing the request; the template author opted the step out.
    fn evaluate(&self, attributes: &HashMap<String, AttributeValue>) -> bool {
        let Some(value) = attributes.get(&self.attribute) else {
            return false;
        };

        match (value, &self.literal) {
            (AttributeValue::Number(lhs), AttributeValue::Number(rhs)) => match self.comparator {
                Comparator::Eq => lhs == rhs,
                Comparator::Ne => lhs != rhs,
                Comparator::Gt => lhs > rhs,
                Comparator::Ge => lhs >= rhs,
                Comparator::Lt => lhs < rhs,
                Comparator::Le => lhs <= rhs,
            },
            (AttributeValue::Text(lhs), AttributeValue::Text(rhs)) => match self.comparator {
                Comparator::Eq => lhs == rhs,
                Comparator::Ne => lhs != rhs,
                _ => false,
            },
            (AttributeValue::Flag(lhs), AttributeValue::Flag(rhs)) => match self.comparator {
                Comparator::Eq => lhs == rhs,
                Comparator::Ne => lhs != rhs,
                _ => false,
            },
            _ => false,
        }
    }
}

/// A parsed condition expression
#[derive(Debug, Clone)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    /// True when every clause holds against the attribute bag
    pub fn evaluate(&self, attributes: &HashMap<String, AttributeValue>) -> bool {
        self.clauses.iter().all(|clause| clause.evaluate(attributes))
    }
}

/// Parse a condition expression
pub fn parse(expression: &str) -> Result<Condition> {
    if expression.trim().is_empty() {
        return Err(EngineError::Validation(
            "Condition expression must not be empty".to_string(),
        ));
    }

    let clauses = expression
        .split("&&")
        .map(parse_clause)
        .collect::<Result<Vec<_>>>()?;

    Ok(Condition { clauses })
}

/// Syntax-check an expression without evaluating it
pub fn validate(expression: &str) -> Result<()> {
    parse(expression).map(|_| ())
}

fn parse_clause(clause: &str) -> Result<Clause> {
    let captures = CLAUSE_RE.captures(clause).ok_or_else(|| {
        EngineError::Validation(format!("Malformed condition clause: '{}'", clause.trim()))
    })?;

    let attribute = captures[1].to_string();
    let comparator = Comparator::from_symbol(&captures[2])
        .ok_or_else(|| EngineError::Validation(format!("Unknown comparator in '{}'", clause)))?;
    let literal = parse_literal(&captures[3])?;

    Ok(Clause {
        attribute,
        comparator,
        literal,
    })
}

fn parse_literal(raw: &str) -> Result<AttributeValue> {
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Ok(AttributeValue::Text(raw[1..raw.len() - 1].to_string()));
    }

    match raw {
        "true" => return Ok(AttributeValue::Flag(true)),
        "false" => return Ok(AttributeValue::Flag(false)),
        _ => {}
    }

    raw.parse::<f64>()
        .map(AttributeValue::Number)
        .map_err(|_| EngineError::Validation(format!("Malformed condition literal: '{}'", raw)))
}
