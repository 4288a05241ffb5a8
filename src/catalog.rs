//! Live-schema metadata as read from `information_schema.columns`.

use serde::Serialize;

use serde_json::Value as JsonValue;

use crate::data::{Value, array_literal, parse_array_literal, parse_timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// `information_schema.columns.data_type`, e.g. `timestamp with time zone`.
    pub data_type: String,
    /// `udt_name`, used as the cast target for parameters (`uuid`, `int4`, ...).
    pub udt_name: String,
}

impl ColumnInfo {
    pub fn new(name: &str, data_type: &str, udt_name: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            udt_name: udt_name.to_string(),
        }
    }

    /// Character types, which receive the source text unchanged.
    pub fn is_textual(&self) -> bool {
        matches!(self.data_type.as_str(), "text" | "character varying" | "character")
            || self.udt_name == "citext"
    }

    pub fn is_array(&self) -> bool {
        self.udt_name.starts_with('_')
    }

    /// Parameter text for `value` bound to this column. Arrays headed for an
    /// array column use PostgreSQL's array literal syntax.
    pub fn param(&self, value: &Value) -> Option<String> {
        match value {
            Value::Json(JsonValue::Array(items)) if self.is_array() => Some(array_literal(items)),
            other => other.to_param(),
        }
    }

    /// Decodes a value fetched as `::text` into the value model.
    pub fn decode(&self, text: Option<&str>) -> Value {
        let Some(text) = text else {
            return Value::Null;
        };
        if self.is_array() {
            return parse_array_literal(text)
                .map(|items| Value::Json(JsonValue::Array(items)))
                .unwrap_or_else(|| Value::String(text.to_string()));
        }
        match self.data_type.as_str() {
            "boolean" => match text {
                "t" | "true" => Value::Boolean(true),
                "f" | "false" => Value::Boolean(false),
                other => Value::String(other.to_string()),
            },
            "smallint" | "integer" | "bigint" => text
                .parse::<i64>()
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::String(text.to_string())),
            "numeric" | "real" | "double precision" => text
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::String(text.to_string())),
            ty if ty.starts_with("timestamp") || ty == "date" => parse_timestamp(text)
                .map(Value::Timestamp)
                .unwrap_or_else(|_| Value::String(text.to_string())),
            "json" | "jsonb" => serde_json::from_str(text)
                .map(Value::Json)
                .unwrap_or_else(|_| Value::String(text.to_string())),
            _ => Value::String(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}
