//! Projection of source records onto the live schema, plus the per-table
//! default and sensitive-field policy.

use chrono::{DateTime, Utc};
use heck::ToKebabCase;

use crate::{
    catalog::{ColumnInfo, TableSchema},
    data::Value,
    mapping::ColumnMapping,
    policy::{DefaultRule, SensitivePolicy, TablePolicy, looks_hashed},
    record::{SourceRecord, TargetRow},
};

/// Renames fields through `mapping`; blank values become null and unmapped
/// columns are dropped. Character columns take the field's original text
/// when the record has it, so `1.10` is not rewritten as `1.1`.
pub fn project(
    record: &SourceRecord,
    mapping: &ColumnMapping,
    schema: &TableSchema,
) -> TargetRow {
    mapping
        .entries
        .iter()
        .filter_map(|entry| {
            let value = record.get(&entry.source)?;
            let textual = schema.column(&entry.target).is_some_and(ColumnInfo::is_textual);
            let value = match record.text(&entry.source) {
                _ if value.is_blank() => Value::Null,
                Some(text) if textual => Value::String(text.to_string()),
                _ => value.clone(),
            };
            Some((entry.target.clone(), value))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Row(TargetRow),
    Rejected(String),
}

pub struct Normalizer<'a> {
    policy: &'a TablePolicy,
    schema: &'a TableSchema,
    now: DateTime<Utc>,
}

impl<'a> Normalizer<'a> {
    pub fn new(policy: &'a TablePolicy, schema: &'a TableSchema, now: DateTime<Utc>) -> Self {
        Self {
            policy,
            schema,
            now,
        }
    }

    /// Completes a projected row. `existing` says whether the live table
    /// already holds a row with this primary key.
    ///
    /// New rows get timestamp backfill and required-field defaults. Existing
    /// rows instead drop blank required fields, so an update never replaces
    /// live values with placeholders.
    pub fn normalize(&self, mut row: TargetRow, existing: bool) -> Normalized {
        if existing {
            for column in self.required_columns() {
                if row.contains(column) && row.is_missing(column) {
                    row.remove(column);
                }
            }
        } else {
            self.backfill_timestamps(&mut row);
            self.apply_defaults(&mut row);
        }

        if let Some(sensitive) = &self.policy.sensitive {
            if let Err(reason) = apply_sensitive_policy(&mut row, sensitive, existing) {
                return Normalized::Rejected(reason);
            }
        }
        Normalized::Row(row)
    }

    fn required_columns(&self) -> impl Iterator<Item = &str> {
        self.policy
            .timestamp_columns
            .iter()
            .map(String::as_str)
            .chain(self.policy.defaults.iter().map(|d| d.column.as_str()))
    }

    fn backfill_timestamps(&self, row: &mut TargetRow) {
        for column in &self.policy.timestamp_columns {
            if self.schema.has_column(column) && row.is_missing(column) {
                row.set(column.as_str(), Value::Timestamp(self.now));
            }
        }
    }

    fn apply_defaults(&self, row: &mut TargetRow) {
        for default in &self.policy.defaults {
            if !self.schema.has_column(&default.column) || !row.is_missing(&default.column) {
                continue;
            }
            let value = match &default.rule {
                DefaultRule::Placeholder(text) => Some(text.clone()),
                DefaultRule::SlugFrom(base) => self.synthesize_slug(row, base),
            };
            if let Some(value) = value {
                row.set(default.column.as_str(), Value::String(value));
            }
        }
    }

    /// `"{kebab(base)}-{short id}"`, or `"{table}-{short id}"` without a base.
    /// Deterministic so repeated runs produce the same slug.
    fn synthesize_slug(&self, row: &TargetRow, base: &str) -> Option<String> {
        let id = row
            .get(&self.policy.primary_key)
            .filter(|v| !v.is_blank())?
            .to_param()?;
        let short = id
            .chars()
            .filter(|c| *c != '-')
            .take(8)
            .collect::<String>()
            .to_lowercase();
        let stem = row
            .get(base)
            .and_then(Value::to_param)
            .map(|text| text.to_kebab_case())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| self.policy.target_table.to_kebab_case());
        Some(format!("{stem}-{short}"))
    }
}

fn apply_sensitive_policy(
    row: &mut TargetRow,
    policy: &SensitivePolicy,
    existing: bool,
) -> Result<(), String> {
    for field in policy.verification_fields.iter().chain(&policy.secret_fields) {
        row.remove(field);
    }
    if existing {
        row.remove(&policy.credential_field);
        return Ok(());
    }
    let credential = row
        .get(&policy.credential_field)
        .filter(|v| !v.is_blank())
        .and_then(Value::to_param);
    let Some(credential) = credential else {
        return Err(format!("missing {}", policy.credential_field));
    };
    if policy.is_insecure(&credential) {
        return Err(format!("placeholder {} is not importable", policy.credential_field));
    }
    if policy.require_hashed && !looks_hashed(&credential) {
        return Err(format!("{} is not a password hash", policy.credential_field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::ColumnInfo,
        mapping::{MappingOverrides, build_mapping},
        policy::PolicyRegistry,
    };
    use chrono::TimeZone;

    const HASH: &str = "$2b$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy";
    const ID: &str = "0b6f2a1e-9c8d-4e7f-a6b5-c4d3e2f1a0b9";

    fn users_schema() -> TableSchema {
        let text = |name: &str| ColumnInfo::new(name, "character varying", "varchar");
        TableSchema {
            name: "users".into(),
            columns: vec![
                ColumnInfo::new("id", "uuid", "uuid"),
                text("email"),
                text("name"),
                text("password_hash"),
                ColumnInfo::new("is_verified", "boolean", "bool"),
                text("verification_token"),
                ColumnInfo::new("created_at", "timestamp with time zone", "timestamptz"),
                ColumnInfo::new("updated_at", "timestamp with time zone", "timestamptz"),
            ],
        }
    }

    fn source(pairs: &[(&str, Value)]) -> SourceRecord {
        SourceRecord::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())))
    }

    fn users_mapping(record: &SourceRecord, schema: &TableSchema) -> ColumnMapping {
        let columns: Vec<String> = record.columns().map(str::to_string).collect();
        build_mapping("Users", &columns, &schema.column_names(), &MappingOverrides::builtin())
    }

    fn normalize_user(record: &SourceRecord, existing: bool) -> Normalized {
        let registry = PolicyRegistry::audiobook();
        let policy = registry.find("Users").unwrap();
        let schema = users_schema();
        let columns: Vec<String> = record.columns().map(str::to_string).collect();
        let mapping = users_mapping(record, &schema);
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let projected = project(record, &mapping, &schema);
        Normalizer::new(policy, &schema, now).normalize(projected, existing)
    }

    #[test]
    fn projection_nulls_markers_and_drops_unmapped() {
        let record = source(&[
            ("id", Value::String(ID.into())),
            ("email", Value::String("\\N".into())),
            ("fullName", Value::String(String::new())),
            ("legacyFlag", Value::Boolean(true)),
        ]);
        let schema = users_schema();
        let row = project(&record, &users_mapping(&record, &schema), &schema);
        assert_eq!(row.get("email"), Some(&Value::Null));
        assert_eq!(row.get("name"), Some(&Value::Null));
        assert!(!row.contains("legacyFlag"));
    }

    #[test]
    fn character_columns_keep_the_source_text() {
        let record = source(&[
            ("id", Value::String(ID.into())),
            ("fullName", Value::Float(1.1)),
            ("emailVerified", Value::Boolean(true)),
        ])
        .with_text([
            ("id".to_string(), ID.to_string()),
            ("fullName".to_string(), "1.10".to_string()),
            ("emailVerified".to_string(), "t".to_string()),
        ]);
        let schema = users_schema();
        let row = project(&record, &users_mapping(&record, &schema), &schema);
        assert_eq!(row.get("name"), Some(&Value::String("1.10".into())));
        assert_eq!(row.get("is_verified"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn new_user_gets_defaults_and_loses_verification_state() {
        let record = source(&[
            ("id", Value::String(ID.into())),
            ("email", Value::String("a@example.com".into())),
            ("password", Value::String(HASH.into())),
            ("emailVerified", Value::Boolean(true)),
        ]);
        let Normalized::Row(row) = normalize_user(&record, false) else {
            panic!("expected row");
        };
        assert_eq!(row.get("name"), Some(&Value::String("Unknown User".into())));
        assert!(matches!(row.get("created_at"), Some(Value::Timestamp(_))));
        assert!(!row.contains("is_verified"));
        assert_eq!(row.get("password_hash"), Some(&Value::String(HASH.into())));
    }

    #[test]
    fn new_user_with_placeholder_or_plaintext_password_is_rejected() {
        for password in ["default_password", "hunter2", ""] {
            let record = source(&[
                ("id", Value::String(ID.into())),
                ("password", Value::String(password.into())),
            ]);
            assert!(matches!(normalize_user(&record, false), Normalized::Rejected(_)));
        }
        let record = source(&[("id", Value::String(ID.into()))]);
        assert!(matches!(normalize_user(&record, false), Normalized::Rejected(_)));
    }

    #[test]
    fn existing_user_never_carries_credentials_or_placeholders() {
        let record = source(&[
            ("id", Value::String(ID.into())),
            ("password", Value::String("default_password".into())),
            ("emailVerified", Value::Boolean(false)),
            ("fullName", Value::Null),
        ]);
        let Normalized::Row(row) = normalize_user(&record, true) else {
            panic!("existing users are never rejected for credentials");
        };
        assert!(!row.contains("password_hash"));
        assert!(!row.contains("is_verified"));
        assert!(!row.contains("name"));
        assert!(!row.contains("created_at"));
    }

    #[test]
    fn slug_is_synthesized_from_title_and_id() {
        let registry = PolicyRegistry::audiobook();
        let policy = registry.find("Books").unwrap();
        let schema = TableSchema {
            name: "books".into(),
            columns: vec![
                ColumnInfo::new("id", "uuid", "uuid"),
                ColumnInfo::new("title", "text", "text"),
                ColumnInfo::new("slug", "text", "text"),
            ],
        };
        let row: TargetRow = [
            ("id".to_string(), Value::String(ID.into())),
            ("title".to_string(), Value::String("The Silent Sea".into())),
        ]
        .into_iter()
        .collect();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let normalizer = Normalizer::new(policy, &schema, now);
        let Normalized::Row(row) = normalizer.normalize(row, false) else {
            panic!("expected row");
        };
        assert_eq!(row.get("slug"), Some(&Value::String("the-silent-sea-0b6f2a1e".into())));
    }
}
