//! Relation embedding.
//!
//! An entity declares its relations once ([`RelationDef`]); a call asks for a
//! subset of them through an [`IncludeSpec`]. The planner turns the request
//! into an embedded-selection expression and reshapes the embedded values in
//! the rows that come back.

mod planner;

pub use planner::RelationPlanner;

use crate::core::{AdapterError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Belongs-to / has-one: the caller sees an object or `null`.
    #[default]
    ToOne,
    /// Has-many: the caller sees an array.
    ToMany,
}

/// Relation declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Application-side name, also the key the related value is returned under.
    pub name: String,
    /// Related table on the storage side.
    pub table: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Foreign-key hint for disambiguating several paths to the same table
    /// (`table!hint(...)`).
    #[serde(default)]
    pub hint: Option<String>,
}

impl RelationDef {
    pub fn to_one(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            cardinality: Cardinality::ToOne,
            hint: None,
        }
    }

    pub fn to_many(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            cardinality: Cardinality::ToMany,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Which columns of a related row to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Application-side field names.
    Fields(Vec<String>),
}

/// Requested relations, in the order the caller listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeSpec {
    entries: Vec<(String, Selection)>,
}

impl IncludeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(mut self, relation: impl Into<String>) -> Self {
        self.entries.push((relation.into(), Selection::All));
        self
    }

    pub fn fields<I, S>(mut self, relation: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields.into_iter().map(Into::into).collect();
        self.entries.push((relation.into(), Selection::Fields(fields)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Selection)> {
        self.entries.iter().map(|(name, sel)| (name.as_str(), sel))
    }

    /// Parses `{rel: true, other: {select: ["a", "b"]}}`.
    ///
    /// `select` may also be a map of `field: true`. `rel: false` is skipped.
    pub fn parse(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            AdapterError::validation(format!("include must be an object, got {value}"))
        })?;

        let mut spec = IncludeSpec::new();
        for (relation, entry) in map {
            match entry {
                Value::Bool(true) => spec = spec.all(relation.clone()),
                Value::Bool(false) => {}
                Value::Object(options) => {
                    if let Some(other) = options.keys().find(|k| k.as_str() != "select") {
                        return Err(AdapterError::validation(format!(
                            "include '{relation}': option '{other}' is not supported"
                        )));
                    }
                    match options.get("select") {
                        None => spec = spec.all(relation.clone()),
                        Some(select) => {
                            let fields = parse_select(relation, select)?;
                            spec = spec.fields(relation.clone(), fields);
                        }
                    }
                }
                other => {
                    return Err(AdapterError::validation(format!(
                        "include '{relation}' must be true or {{select: [...]}}, got {other}"
                    )));
                }
            }
        }
        Ok(spec)
    }
}

fn parse_select(relation: &str, select: &Value) -> Result<Vec<String>> {
    let fields: Vec<String> = match select {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    AdapterError::validation(format!(
                        "include '{relation}': select entries must be field names, got {item}"
                    ))
                })
            })
            .collect::<Result<_>>()?,
        Value::Object(map) => map
            .iter()
            .filter(|(_, flag)| flag.as_bool() == Some(true))
            .map(|(field, _)| field.clone())
            .collect(),
        other => {
            return Err(AdapterError::validation(format!(
                "include '{relation}': select must be a list of fields, got {other}"
            )));
        }
    };

    if fields.is_empty() {
        return Err(AdapterError::validation(format!(
            "include '{relation}': select must name at least one field"
        )));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_keeps_caller_order() {
        let spec = IncludeSpec::parse(&json!({
            "tracks": {"select": ["id", "trackId"]},
            "user": true,
            "owner": false,
            "tags": {"select": {"label": true, "color": false}},
        }))
        .unwrap();

        assert_eq!(
            spec,
            IncludeSpec::new()
                .fields("tracks", ["id", "trackId"])
                .all("user")
                .fields("tags", ["label"])
        );
    }

    #[test]
    fn test_parse_rejects_unsupported_options() {
        for case in [
            json!(["user"]),
            json!({"user": "yes"}),
            json!({"user": {"where": {"id": 1}}}),
            json!({"user": {"select": []}}),
            json!({"user": {"select": [1]}}),
        ] {
            assert!(IncludeSpec::parse(&case).is_err(), "accepted {case}");
        }
    }

    #[test]
    fn test_relation_def_from_config() {
        let def: RelationDef = serde_json::from_value(json!({
            "name": "playlistTracks",
            "table": "playlist_tracks",
            "cardinality": "to_many"
        }))
        .unwrap();
        assert_eq!(def, RelationDef::to_many("playlistTracks", "playlist_tracks"));
    }
}
