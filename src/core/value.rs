use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One record, keyed by column name in insertion order.
pub type Row = serde_json::Map<String, Value>;

/// Declared storage type of a column.
///
/// Undeclared columns are untyped and compared as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Uuid,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
    Json,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Text => "TEXT",
            ColumnType::Uuid => "UUID",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Date => "DATE",
            ColumnType::Json => "JSON",
        };
        write!(f, "{name}")
    }
}

impl ColumnType {
    /// Renders `value` as an equality literal for a column of this type.
    ///
    /// Fails when the value does not parse as the column's type, so a
    /// malformed literal never reaches the transport. `Null` is not a
    /// literal; callers turn it into an IS NULL test first.
    pub fn render_literal(&self, value: &Value) -> std::result::Result<String, String> {
        match (self, value) {
            (_, Value::Null) => Err("NULL is not an equality literal".to_string()),
            (_, Value::Array(_) | Value::Object(_)) => {
                Err(format!("cannot compare {self} column against a nested value"))
            }
            (ColumnType::Json, _) => Err("equality against JSON columns is not supported".to_string()),

            (ColumnType::Text, Value::String(s)) => Ok(s.clone()),
            (ColumnType::Text, other) => Ok(other.to_string()),

            (ColumnType::Uuid, Value::String(s)) => uuid::Uuid::parse_str(s)
                .map(|u| u.hyphenated().to_string())
                .map_err(|e| format!("Invalid UUID '{s}': {e}")),

            (ColumnType::Integer, Value::Number(n)) => n
                .as_i64()
                .map(|i| i.to_string())
                .ok_or_else(|| format!("Cannot convert {n} to INTEGER")),
            (ColumnType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(|i| i.to_string())
                .map_err(|_| format!("Cannot convert '{s}' to INTEGER")),

            (ColumnType::Float, Value::Number(n)) => n
                .as_f64()
                .map(|f| f.to_string())
                .ok_or_else(|| format!("Cannot convert {n} to FLOAT")),
            (ColumnType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.to_string())
                .ok_or_else(|| format!("Cannot convert '{s}' to FLOAT")),

            (ColumnType::Boolean, Value::Bool(b)) => Ok(b.to_string()),
            (ColumnType::Boolean, Value::String(s)) => match s.as_str() {
                "true" | "false" => Ok(s.clone()),
                _ => Err(format!("Cannot convert '{s}' to BOOLEAN")),
            },

            (ColumnType::Timestamp, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|_| s.clone())
                .map_err(|e| format!("Invalid Timestamp '{s}': {e}")),

            (ColumnType::Date, Value::String(s)) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|_| s.clone())
                .map_err(|e| format!("Invalid Date '{s}': {e}")),

            (ty, other) => Err(format!("Cannot convert {other} to {ty}")),
        }
    }
}

/// Column declaration inside an entity schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnDef {
    #[serde(rename = "type", default)]
    pub ty: ColumnType,
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(ty: ColumnType) -> Self {
        Self { ty, nullable: false }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uuid_literal_is_canonicalized() {
        let lit = ColumnType::Uuid
            .render_literal(&json!("67E55044-10B1-426F-9247-BB680E5FE0C8"))
            .unwrap();
        assert_eq!(lit, "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn test_malformed_literals_fail_closed() {
        assert!(ColumnType::Uuid.render_literal(&json!("not-a-uuid")).is_err());
        assert!(ColumnType::Integer.render_literal(&json!("12abc")).is_err());
        assert!(ColumnType::Integer.render_literal(&json!(1.5)).is_err());
        assert!(ColumnType::Boolean.render_literal(&json!("yes")).is_err());
        assert!(ColumnType::Date.render_literal(&json!("2024-13-01")).is_err());
        assert!(ColumnType::Timestamp.render_literal(&json!("yesterday")).is_err());
        assert!(ColumnType::Json.render_literal(&json!("{}")).is_err());
    }

    #[test]
    fn test_text_accepts_any_scalar() {
        assert_eq!(ColumnType::Text.render_literal(&json!("PENDING")).unwrap(), "PENDING");
        assert_eq!(ColumnType::Text.render_literal(&json!(42)).unwrap(), "42");
        assert_eq!(ColumnType::Text.render_literal(&json!(true)).unwrap(), "true");
        assert!(ColumnType::Text.render_literal(&json!(null)).is_err());
        assert!(ColumnType::Text.render_literal(&json!(["a"])).is_err());
    }

    #[test]
    fn test_column_def_from_config() {
        let def: ColumnDef = serde_json::from_value(json!({"type": "uuid", "nullable": true})).unwrap();
        assert_eq!(def, ColumnDef::new(ColumnType::Uuid).nullable());

        let def: ColumnDef = serde_json::from_value(json!({})).unwrap();
        assert_eq!(def.ty, ColumnType::Text);
        assert!(!def.nullable);
    }
}
