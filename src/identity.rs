//! Identifier-shape enforcement for primary and foreign keys.

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::{
    data::Value,
    policy::{KeyKind, TablePolicy, UNKNOWN_KEY_MARKER},
    record::TargetRow,
    report::{IdentifierAction, Warning},
};

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
            .expect("valid uuid pattern")
    })
}

pub fn is_uuid_shaped(value: &str) -> bool {
    uuid_pattern().is_match(value)
}

/// Canonical key text for `value`, or `None` when it is not a usable key of
/// the given kind. UUIDs come back lower-cased and hyphenated.
pub fn canonical_key(value: &Value, kind: KeyKind) -> Option<String> {
    if value.is_blank() {
        return None;
    }
    let text = value.to_param()?;
    if text.trim().eq_ignore_ascii_case(UNKNOWN_KEY_MARKER) {
        return None;
    }
    match kind {
        KeyKind::Uuid => {
            if !is_uuid_shaped(&text) {
                return None;
            }
            Uuid::parse_str(&text)
                .ok()
                .map(|parsed| parsed.hyphenated().to_string())
        }
        KeyKind::Sequence => match value {
            Value::Integer(i) => Some(i.to_string()),
            Value::String(s) => s.trim().parse::<i64>().ok().map(|i| i.to_string()),
            Value::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
            _ => None,
        },
    }
}

fn canonical_value(key: String, kind: KeyKind) -> Value {
    match kind {
        KeyKind::Uuid => Value::String(key),
        KeyKind::Sequence => key
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or(Value::String(key)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid { row: TargetRow, warnings: Vec<Warning> },
    Skip(Warning),
}

/// Checks the primary key and every foreign key the policy declares.
///
/// An unusable primary key or required foreign key skips the record. An
/// invalid nullable foreign key is set to null and reported.
pub fn validate_identifiers(mut row: TargetRow, policy: &TablePolicy) -> Validation {
    let table = policy.target_table.as_str();
    let pk = policy.primary_key.as_str();
    let raw_key = row.get(pk).cloned().unwrap_or(Value::Null);
    let Some(key) = canonical_key(&raw_key, policy.key_kind) else {
        return Validation::Skip(Warning::InvalidIdentifier {
            table: table.to_string(),
            key: None,
            column: pk.to_string(),
            value: raw_key.to_param(),
            action: IdentifierAction::Skipped,
        });
    };
    row.set(pk, canonical_value(key.clone(), policy.key_kind));

    let mut warnings = Vec::new();
    for fk in &policy.foreign_keys {
        let current = row.get(&fk.column).cloned().unwrap_or(Value::Null);
        if current.is_blank() {
            if fk.required {
                return Validation::Skip(Warning::InvalidIdentifier {
                    table: table.to_string(),
                    key: Some(key),
                    column: fk.column.clone(),
                    value: None,
                    action: IdentifierAction::Skipped,
                });
            }
            if row.contains(&fk.column) {
                row.set(fk.column.as_str(), Value::Null);
            }
            continue;
        }
        match canonical_key(&current, fk.kind) {
            Some(canonical) => row.set(fk.column.as_str(), canonical_value(canonical, fk.kind)),
            None if fk.required => {
                return Validation::Skip(Warning::InvalidIdentifier {
                    table: table.to_string(),
                    key: Some(key),
                    column: fk.column.clone(),
                    value: current.to_param(),
                    action: IdentifierAction::Skipped,
                });
            }
            None => {
                row.set(fk.column.as_str(), Value::Null);
                warnings.push(Warning::InvalidIdentifier {
                    table: table.to_string(),
                    key: Some(key.clone()),
                    column: fk.column.clone(),
                    value: current.to_param(),
                    action: IdentifierAction::Nulled,
                });
            }
        }
    }
    Validation::Valid { row, warnings }
}
