use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{data::Value, record::TargetRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Insert,
    Update,
    Skip,
}

fn is_email_field(field: &str) -> bool {
    field.to_ascii_lowercase().contains("email")
}

fn is_name_field(field: &str) -> bool {
    let lowered = field.to_ascii_lowercase();
    lowered == "name"
        || lowered.ends_with("_name")
        || (lowered.ends_with("name") && lowered.len() > 4 && !lowered.ends_with("filename"))
        || lowered.contains("title")
}

/// Field-aware equality between an incoming value and the stored one.
pub fn equivalent(field: &str, incoming: &Value, existing: &Value) -> bool {
    match (incoming.is_blank(), existing.is_blank()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        _ => {}
    }
    if matches!(incoming, Value::Json(_)) || matches!(existing, Value::Json(_)) {
        if let (Some(a), Some(b)) = (incoming.as_document(), existing.as_document()) {
            return documents_match(&a, &b);
        }
    }
    if let (Some(a), Some(b)) = (incoming.as_instant(), existing.as_instant()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (incoming.as_str(), existing.as_str()) {
        if is_email_field(field) {
            return a.to_lowercase() == b.to_lowercase();
        }
        if is_name_field(field) {
            return a.trim().to_lowercase() == b.trim().to_lowercase();
        }
        return a == b;
    }
    if let (Some(a), Some(b)) = (incoming.as_f64(), existing.as_f64()) {
        return a == b;
    }
    // Mixed representations compare on the text the database actually stores.
    incoming.to_param() == existing.to_param()
}

/// Parsed document equality. Array elements compare on their text, since an
/// array column prints every element back as a string.
fn documents_match(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Array(left), JsonValue::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| documents_match(l, r))
        }
        (JsonValue::Object(_), _) | (_, JsonValue::Object(_)) => a == b,
        _ => element_text(a) == element_text(b),
    }
}

fn element_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Insert when nothing is stored, skip when every compared field is
/// equivalent, update otherwise. Columns in `bookkeeping` are not compared.
pub fn decide(row: &TargetRow, existing: Option<&TargetRow>, bookkeeping: &[String]) -> Decision {
    let Some(existing) = existing else {
        return Decision::Insert;
    };
    let differs = row
        .iter()
        .filter(|(field, _)| !bookkeeping.iter().any(|b| b == field))
        .any(|(field, value)| {
            let stored = existing.get(field).unwrap_or(&Value::Null);
            !equivalent(field, value, stored)
        });
    if differs {
        Decision::Update
    } else {
        Decision::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_timestamp;

    fn row(pairs: &[(&str, Value)]) -> TargetRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn bookkeeping() -> Vec<String> {
        vec!["created_at".into(), "updated_at".into()]
    }

    #[test]
    fn missing_row_is_inserted() {
        let incoming = row(&[("id", Value::String("x".into()))]);
        assert_eq!(decide(&incoming, None, &bookkeeping()), Decision::Insert);
    }

    #[test]
    fn cosmetic_name_and_email_changes_are_skipped() {
        let stored = row(&[
            ("id", Value::String("x".into())),
            ("name", Value::String("Alice".into())),
            ("email", Value::String("alice@example.com".into())),
        ]);
        let incoming = row(&[
            ("id", Value::String("x".into())),
            ("name", Value::String(" ALICE ".into())),
            ("email", Value::String("Alice@Example.COM".into())),
        ]);
        assert_eq!(decide(&incoming, Some(&stored), &bookkeeping()), Decision::Skip);
    }

    #[test]
    fn trimmed_comparison_applies_only_to_name_like_fields() {
        let stored = row(&[("description", Value::String("Epic".into()))]);
        let incoming = row(&[("description", Value::String("epic".into()))]);
        assert_eq!(decide(&incoming, Some(&stored), &bookkeeping()), Decision::Update);
    }

    #[test]
    fn timestamps_compare_by_instant_and_bookkeeping_is_ignored() {
        let stored = row(&[
            (
                "published_at",
                Value::Timestamp(parse_timestamp("2024-01-15 10:30:00+00").unwrap()),
            ),
            ("created_at", Value::Timestamp(parse_timestamp("2020-01-01").unwrap())),
        ]);
        let incoming = row(&[
            ("published_at", Value::String("2024-01-15T12:30:00+02:00".into())),
            ("created_at", Value::Timestamp(parse_timestamp("2025-06-01").unwrap())),
        ]);
        assert_eq!(decide(&incoming, Some(&stored), &bookkeeping()), Decision::Skip);
    }

    #[test]
    fn null_and_empty_are_equivalent_but_null_and_value_are_not() {
        assert!(equivalent("bio", &Value::Null, &Value::String(String::new())));
        assert!(!equivalent("bio", &Value::Null, &Value::String("x".into())));
    }

    #[test]
    fn numbers_compare_numerically_and_mixed_types_by_text() {
        assert!(equivalent("rating", &Value::Integer(4), &Value::Float(4.0)));
        assert!(equivalent("isbn", &Value::Integer(1984), &Value::String("1984".into())));
        assert!(!equivalent("rating", &Value::Integer(4), &Value::Integer(5)));
        assert!(equivalent("active", &Value::Boolean(true), &Value::Boolean(true)));
    }

    #[test]
    fn documents_compare_parsed_not_by_spacing() {
        let incoming = Value::Json(serde_json::json!({"k": 1, "tags": ["a"]}));
        let printed = Value::Json(serde_json::json!({"tags": ["a"], "k": 1}));
        assert!(equivalent("metadata", &incoming, &printed));
        let spaced = Value::String("{\"k\": 1, \"tags\": [\"a\"]}".into());
        assert!(equivalent("metadata", &incoming, &spaced));
        assert!(!equivalent("metadata", &incoming, &Value::Json(serde_json::json!({"k": 2}))));
    }

    #[test]
    fn arrays_compare_elementwise_against_printed_literals() {
        let incoming = Value::Json(serde_json::json!([1, 2]));
        assert!(equivalent("ranks", &incoming, &Value::Json(serde_json::json!(["1", "2"]))));
        assert!(equivalent("ranks", &incoming, &Value::String("{1,2}".into())));
        assert!(!equivalent("ranks", &incoming, &Value::String("{2,1}".into())));
    }

    #[test]
    fn field_categories() {
        assert!(is_name_field("display_name"));
        assert!(is_name_field("firstName"));
        assert!(is_name_field("subtitle"));
        assert!(!is_name_field("filename"));
        assert!(is_email_field("contact_email"));
    }
}
