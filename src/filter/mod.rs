//! Where-clause handling.
//!
//! - `WhereSpec` - the caller's filter, parsed from the application-side shape
//! - `translator.rs` - lowering into the transport's primitive filter calls

mod translator;

pub use translator::{FilterTranslator, OrGroupPolicy, quote_literal};

use crate::core::{AdapterError, Result, Row};
use serde_json::Value;

/// Key that marks an OR-group in the application-side where shape.
pub const OR_KEY: &str = "OR";

/// One primitive filter call understood by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Every `(column, literal)` pair must match exactly.
    Match(Vec<(String, String)>),
    /// `column IS NULL`.
    IsNull(String),
    /// Disjunction in the transport grammar, e.g. `user_id.is.null,user_id.eq.u1`.
    Or(String),
}

/// Single-field test inside an OR-group.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// Caller-side filter.
///
/// Either a flat equality map (all pairs must hold) or a single OR-group of
/// per-field equality/null conditions. Nothing else is expressible; nested
/// boolean trees and comparison operators are rejected at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereSpec {
    Match(Row),
    Any(Vec<Condition>),
}

impl WhereSpec {
    pub fn new() -> Self {
        WhereSpec::Match(Row::new())
    }

    /// Adds an equality pair to a flat map. An OR-group is returned unchanged.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        match self {
            WhereSpec::Match(mut map) => {
                map.insert(field.into(), value.into());
                WhereSpec::Match(map)
            }
            any => any,
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        WhereSpec::Any(conditions)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            WhereSpec::Match(map) => map.is_empty(),
            WhereSpec::Any(conditions) => conditions.is_empty(),
        }
    }

    /// Parses `{field: value, ...}` or `{"OR": [{field: value}, ...]}`.
    pub fn parse(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            AdapterError::validation(format!("where must be an object, got {value}"))
        })?;

        if let Some(group) = map.get(OR_KEY) {
            if map.len() > 1 {
                return Err(AdapterError::validation(
                    "OR-group cannot be combined with other where conditions",
                ));
            }
            return Self::parse_or_group(group);
        }

        for (field, value) in map {
            if !is_scalar(value) {
                return Err(AdapterError::validation(format!(
                    "unsupported condition on '{field}': only equality against scalar values is supported"
                )));
            }
        }

        Ok(WhereSpec::Match(map.clone()))
    }

    fn parse_or_group(group: &Value) -> Result<Self> {
        let items = group
            .as_array()
            .ok_or_else(|| AdapterError::validation("OR-group must be an array of conditions"))?;

        if items.is_empty() {
            return Err(AdapterError::validation("OR-group must not be empty"));
        }

        let mut conditions = Vec::with_capacity(items.len());
        for item in items {
            let condition = item
                .as_object()
                .filter(|obj| obj.len() == 1)
                .and_then(|obj| obj.iter().next())
                .ok_or_else(|| {
                    AdapterError::validation(format!(
                        "OR-group condition must be a single-field object, got {item}"
                    ))
                })?;

            let (field, value) = condition;
            if field == OR_KEY || !is_scalar(value) {
                return Err(AdapterError::validation(format!(
                    "nested conditions are not supported inside an OR-group (field '{field}')"
                )));
            }
            conditions.push(Condition::new(field.clone(), value.clone()));
        }

        Ok(WhereSpec::Any(conditions))
    }
}

impl Default for WhereSpec {
    fn default() -> Self {
        Self::new()
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}
