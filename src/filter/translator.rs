use super::{Condition, Filter, WhereSpec};
use crate::core::{AdapterError, ColumnDef, ColumnType, Result};
use crate::naming::NamingConverter;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How an OR-group with several non-null equality conditions is lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrGroupPolicy {
    /// Keep every IS NULL test but only the first non-null equality; later
    /// equalities are dropped with a warning. This is the historical
    /// behavior callers depend on.
    #[default]
    FirstEquality,
    /// Keep every condition.
    AllConditions,
}

/// Lowers a [`WhereSpec`] into transport filter calls.
#[derive(Debug, Clone, Default)]
pub struct FilterTranslator {
    naming: NamingConverter,
    policy: OrGroupPolicy,
    null_sentinels: Vec<String>,
}

impl FilterTranslator {
    pub fn new(naming: NamingConverter) -> Self {
        Self {
            naming,
            policy: OrGroupPolicy::default(),
            null_sentinels: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: OrGroupPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// String values that mean "global / unset" inside an OR-group and are
    /// lowered to IS NULL instead of an equality.
    pub fn with_null_sentinels(mut self, sentinels: Vec<String>) -> Self {
        self.null_sentinels = sentinels;
        self
    }

    /// Translates `spec` against the declared `columns` (storage names).
    ///
    /// Always yields the filters of one request; a where filter is never split over
    /// several round trips.
    pub fn translate(
        &self,
        spec: &WhereSpec,
        columns: &BTreeMap<String, ColumnDef>,
    ) -> Result<Vec<Filter>> {
        match spec {
            WhereSpec::Match(map) => self.translate_match(map.iter(), columns),
            WhereSpec::Any(conditions) => self.translate_or(conditions, columns).map(|f| vec![f]),
        }
    }

    fn translate_match<'a>(
        &self,
        pairs: impl Iterator<Item = (&'a String, &'a Value)>,
        columns: &BTreeMap<String, ColumnDef>,
    ) -> Result<Vec<Filter>> {
        let mut equalities = Vec::new();
        let mut filters = Vec::new();

        for (field, value) in pairs {
            let column = self.naming.storage_key(field).into_owned();
            if value.is_null() {
                filters.push(Filter::IsNull(column));
                continue;
            }
            let literal = literal_for(&column, value, columns)?;
            equalities.push((column, literal));
        }

        if !equalities.is_empty() {
            filters.insert(0, Filter::Match(equalities));
        }
        Ok(filters)
    }

    fn translate_or(
        &self,
        conditions: &[Condition],
        columns: &BTreeMap<String, ColumnDef>,
    ) -> Result<Filter> {
        let mut parts = Vec::with_capacity(conditions.len());
        let mut equality_seen = false;

        for condition in conditions {
            let column = self.naming.storage_key(&condition.field).into_owned();

            if self.is_null_like(&condition.value) {
                if let Some(def) = columns.get(&column) {
                    if !def.nullable {
                        return Err(AdapterError::validation(format!(
                            "OR-group tests '{column}' for NULL but the column is not nullable"
                        )));
                    }
                }
                parts.push(format!("{column}.is.null"));
                continue;
            }

            if equality_seen && self.policy == OrGroupPolicy::FirstEquality {
                warn!(
                    "OR-group: dropping equality condition on '{}' after the first non-null condition",
                    column
                );
                continue;
            }

            let literal = literal_for(&column, &condition.value, columns)?;
            parts.push(format!("{column}.eq.{}", quote_literal(&literal)));
            equality_seen = true;
        }

        Ok(Filter::Or(parts.join(",")))
    }

    fn is_null_like(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => self.null_sentinels.iter().any(|sentinel| sentinel == s),
            _ => false,
        }
    }
}

fn literal_for(column: &str, value: &Value, columns: &BTreeMap<String, ColumnDef>) -> Result<String> {
    let ty = columns.get(column).map(|def| def.ty).unwrap_or(ColumnType::Text);
    ty.render_literal(value)
        .map_err(|reason| AdapterError::validation(format!("column '{column}': {reason}")))
}

/// Double-quotes a literal when it contains characters reserved by the
/// transport's filter grammar.
pub fn quote_literal(literal: &str) -> String {
    let reserved = |c: char| matches!(c, ',' | '.' | ':' | '(' | ')' | '"' | '\\') || c.is_whitespace();
    if !literal.is_empty() && !literal.contains(reserved) {
        return literal.to_string();
    }

    let mut quoted = String::with_capacity(literal.len() + 2);
    quoted.push('"');
    for c in literal.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
