//! Typed value model shared by every stage of a migration run.
//!
//! Raw dump fields are untyped strings; [`sniff_value`] turns them into a
//! [`Value`] with one fixed precedence (null marker, numeric, boolean,
//! timestamp, string). JSON snapshots are already typed and go through
//! [`Value::from_json`] instead.
//!
//! Documents and arrays travel as [`Value::Json`] and are compared parsed,
//! so formatting differences in what the database prints back never count
//! as a change.

use std::{fmt, sync::OnceLock};

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Null marker used by the bulk-load text format.
pub const NULL_MARKER: &str = "\\N";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    String(String),
    /// An object or array.
    Json(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, the null marker, or an empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty() || s == NULL_MARKER,
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical text form sent as a statement parameter. `None` is SQL NULL.
    pub fn to_param(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.as_display()),
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Timestamp(ts) => ts.to_rfc3339(),
            Value::String(s) => s.clone(),
            Value::Json(doc) => doc.to_string(),
        }
    }

    /// Interprets the value as an instant when it is a timestamp or a string
    /// that parses as one.
    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::String(s) if starts_with_year(s) => parse_timestamp(s).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            JsonValue::String(s) => Value::String(s.clone()),
            nested => Value::Json(nested.clone()),
        }
    }

    /// The value as a parsed document: itself when it is one, or a string
    /// holding JSON or a one-dimensional array literal.
    pub fn as_document(&self) -> Option<JsonValue> {
        match self {
            Value::Json(doc) => Some(doc.clone()),
            Value::String(s) => serde_json::from_str(s)
                .ok()
                .or_else(|| parse_array_literal(s).map(JsonValue::Array)),
            _ => None,
        }
    }
}

/// Renders a JSON array as a PostgreSQL array literal, e.g. `{"a","b",NULL}`.
/// Nested arrays become nested braces; every other element is quoted text.
pub fn array_literal(items: &[JsonValue]) -> String {
    let mut elements = items.iter().map(|item| match item {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Array(inner) => array_literal(inner),
        JsonValue::String(text) => quote_element(text),
        other => quote_element(&other.to_string()),
    });
    format!("{{{}}}", elements.join(","))
}

fn quote_element(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Parses a one-dimensional array literal as PostgreSQL prints it. Elements
/// come back as strings and an unquoted `NULL` as null. Nested arrays are
/// not handled and yield `None`.
pub fn parse_array_literal(text: &str) -> Option<Vec<JsonValue>> {
    let inner = text.strip_prefix('{')?.strip_suffix('}')?;
    let mut items = Vec::new();
    if inner.is_empty() {
        return Some(items);
    }
    let mut chars = inner.chars().peekable();
    loop {
        let mut element = String::new();
        let quoted = chars.peek() == Some(&'"');
        if quoted {
            chars.next();
            loop {
                match chars.next()? {
                    '\\' => element.push(chars.next()?),
                    '"' => break,
                    ch => element.push(ch),
                }
            }
        } else {
            while let Some(&ch) = chars.peek() {
                match ch {
                    ',' => break,
                    '{' | '}' | '"' => return None,
                    _ => {
                        element.push(ch);
                        chars.next();
                    }
                }
            }
        }
        if !quoted && element.eq_ignore_ascii_case("NULL") {
            items.push(JsonValue::Null);
        } else {
            items.push(JsonValue::String(element));
        }
        match chars.next() {
            None => return Some(items),
            Some(',') => {}
            Some(_) => return None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^-?(0|[1-9][0-9]*)$").expect("valid integer pattern"))
}

fn float_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^-?(0|[1-9][0-9]*)\.[0-9]+$").expect("valid float pattern")
    })
}

fn year_prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{4}-").expect("valid year pattern"))
}

pub fn starts_with_year(value: &str) -> bool {
    year_prefix_pattern().is_match(value)
}

/// Converts one raw dump field into a [`Value`].
///
/// Precedence: null marker, numeric, `t`/`f`, year-prefixed timestamp, string.
/// Integers with insignificant leading zeros (`007`) stay strings, and so do
/// year-prefixed strings that fail to parse as a timestamp.
pub fn sniff_value(raw: &str) -> Value {
    if raw == NULL_MARKER {
        return Value::Null;
    }
    if integer_pattern().is_match(raw) {
        if let Ok(parsed) = raw.parse::<i64>() {
            return Value::Integer(parsed);
        }
    }
    if float_pattern().is_match(raw) {
        if let Ok(parsed) = raw.parse::<f64>() {
            return Value::Float(parsed);
        }
    }
    match raw {
        "t" => return Value::Boolean(true),
        "f" => return Value::Boolean(false),
        _ => {}
    }
    if starts_with_year(raw) {
        if let Ok(ts) = parse_timestamp(raw) {
            return Value::Timestamp(ts);
        }
    }
    Value::String(raw.to_string())
}

/// Parses the timestamp shapes PostgreSQL and JavaScript emit. Values without
/// an offset are taken as UTC; bare dates are midnight UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    const OFFSET_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f%#z",
        "%Y-%m-%d %H:%M:%S%#z",
        "%Y-%m-%dT%H:%M:%S%.f%#z",
    ];
    for fmt in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(value, fmt) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(anyhow!("Failed to parse '{value}' as timestamp"))
}
