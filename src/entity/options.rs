use crate::core::{AdapterError, Result, Row};
use crate::filter::WhereSpec;
use crate::relation::IncludeSpec;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

const OPTION_KEYS: [&str; 5] = ["where", "data", "include", "orderBy", "take"];

/// The six operations every entity exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FindUnique,
    FindFirst,
    FindMany,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::FindUnique,
        Operation::FindFirst,
        Operation::FindMany,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::FindUnique => "findUnique",
            Operation::FindFirst => "findFirst",
            Operation::FindMany => "findMany",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = AdapterError;

    /// Accepts both `findMany` and `find_many`.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.replace('_', "").to_ascii_lowercase();
        Operation::ALL
            .into_iter()
            .find(|op| op.name().to_ascii_lowercase() == wanted)
            .ok_or_else(|| AdapterError::validation(format!("unknown operation '{s}'")))
    }
}

/// Single-column ordering, application-side field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub field: String,
    pub ascending: bool,
}

impl OrderSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }

    /// Parses `{field: "asc" | "desc"}` or a one-element array of it.
    pub fn parse(value: &Value) -> Result<Self> {
        let object = match value {
            Value::Object(map) => map,
            Value::Array(items) if items.len() == 1 => {
                return Self::parse(&items[0]);
            }
            Value::Array(_) => {
                return Err(AdapterError::validation(
                    "orderBy supports exactly one column",
                ));
            }
            other => {
                return Err(AdapterError::validation(format!(
                    "orderBy must be an object, got {other}"
                )));
            }
        };

        if object.len() != 1 {
            return Err(AdapterError::validation(
                "orderBy supports exactly one column",
            ));
        }
        let Some((field, direction)) = object.iter().next() else {
            return Err(AdapterError::validation("orderBy must name a column"));
        };

        match direction.as_str().map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => Ok(Self::asc(field.clone())),
            Some("desc") => Ok(Self::desc(field.clone())),
            _ => Err(AdapterError::validation(format!(
                "orderBy direction for '{field}' must be \"asc\" or \"desc\""
            ))),
        }
    }
}

/// Options of one call, in application-side naming.
///
/// Built directly with the methods below, or parsed from the JSON call
/// argument with [`QueryOptions::parse`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: Option<WhereSpec>,
    pub data: Option<Row>,
    pub include: Option<IncludeSpec>,
    pub order_by: Option<OrderSpec>,
    pub take: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, spec: WhereSpec) -> Self {
        self.filter = Some(spec);
        self
    }

    pub fn data(mut self, row: Row) -> Self {
        self.data = Some(row);
        self
    }

    pub fn include(mut self, include: IncludeSpec) -> Self {
        self.include = Some(include);
        self
    }

    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.take = Some(n);
        self
    }

    /// Where filter, if any, with empty flat maps treated as absent.
    pub fn where_spec(&self) -> Option<&WhereSpec> {
        self.filter.as_ref().filter(|spec| !spec.is_empty())
    }

    /// Parses the raw call argument of `op`.
    ///
    /// The argument is either the options object (`{where, data, include,
    /// orderBy, take}`) or the bare payload: the where filter for reads and
    /// deletes, the row for `create`. `update` needs both a filter and a
    /// payload and so only accepts the options form.
    pub fn parse(op: Operation, value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        if is_options_form(value) {
            return Self::parse_options(value);
        }

        let map = value.as_object().ok_or_else(|| {
            AdapterError::validation(format!("{op} expects an object argument, got {value}"))
        })?;

        match op {
            Operation::Create => Ok(Self::new().data(map.clone())),
            Operation::Update => Err(AdapterError::validation(
                "update expects {where, data}",
            )),
            _ => Ok(Self::new().filter(WhereSpec::parse(value)?)),
        }
    }

    fn parse_options(value: &Value) -> Result<Self> {
        let mut options = Self::default();
        let Some(map) = value.as_object() else {
            return Ok(options);
        };

        if let Some(spec) = map.get("where") {
            options.filter = Some(WhereSpec::parse(spec)?);
        }
        if let Some(Value::Object(data)) = map.get("data") {
            options.data = Some(data.clone());
        }
        if let Some(include) = map.get("include") {
            options.include = Some(IncludeSpec::parse(include)?);
        }
        if let Some(order) = map.get("orderBy") {
            options.order_by = Some(OrderSpec::parse(order)?);
        }
        if let Some(take) = map.get("take").and_then(Value::as_u64) {
            options.take = Some(take as usize);
        }
        Ok(options)
    }
}

/// The one structural check separating the two call shapes: a non-empty
/// object whose keys are all option names, each carrying a value of the
/// option's shape.
fn is_options_form(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    !map.is_empty()
        && map.iter().all(|(key, value)| {
            OPTION_KEYS.contains(&key.as_str())
                && match key.as_str() {
                    "where" | "data" => value.is_object(),
                    "include" => value.is_object(),
                    "orderBy" => value.is_object() || value.is_array(),
                    "take" => value.is_u64(),
                    _ => false,
                }
        })
}
