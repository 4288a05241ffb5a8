//! Source-to-target column resolution.
//!
//! Each source column is resolved by the first tier that succeeds: an explicit
//! override, then the generic matchers in [`MATCHERS`] evaluated against a
//! snapshot of the live target columns.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use heck::{ToLowerCamelCase, ToSnakeCase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchTier {
    Override,
    Exact,
    CaseInsensitive,
    CamelToSnake,
    SnakeToCamel,
}

type Matcher = fn(&str, &[String]) -> Option<String>;

/// Generic tiers, in priority order. Overrides are consulted before these.
pub const MATCHERS: &[(MatchTier, Matcher)] = &[
    (MatchTier::Exact, match_exact),
    (MatchTier::CaseInsensitive, match_case_insensitive),
    (MatchTier::CamelToSnake, match_camel_to_snake),
    (MatchTier::SnakeToCamel, match_snake_to_camel),
];

fn match_exact(source: &str, targets: &[String]) -> Option<String> {
    targets.iter().find(|t| *t == source).cloned()
}

fn match_case_insensitive(source: &str, targets: &[String]) -> Option<String> {
    targets
        .iter()
        .find(|t| t.eq_ignore_ascii_case(source))
        .cloned()
}

fn match_camel_to_snake(source: &str, targets: &[String]) -> Option<String> {
    let converted = source.to_snake_case();
    targets.iter().find(|t| **t == converted).cloned()
}

fn match_snake_to_camel(source: &str, targets: &[String]) -> Option<String> {
    if !source.contains('_') {
        return None;
    }
    let converted = source.to_lower_camel_case();
    targets.iter().find(|t| **t == converted).cloned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedColumn {
    pub source: String,
    pub target: String,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub entries: Vec<MappedColumn>,
    pub unmapped: BTreeSet<String>,
    /// Diagnostics about overrides naming missing columns or contested targets.
    pub notes: Vec<String>,
}

impl ColumnMapping {
    pub fn target_for(&self, source: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.source == source)
            .map(|entry| entry.target.as_str())
    }
}

/// Explicit renames keyed by source table, then source column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingOverrides {
    tables: BTreeMap<String, BTreeMap<String, String>>,
}

impl MappingOverrides {
    /// Deliberate renames between the legacy schema and the live one.
    pub fn builtin() -> Self {
        let mut overrides = Self::default();
        overrides.insert("Users", "password", "password_hash");
        overrides.insert("Users", "fullName", "name");
        overrides.insert("Users", "emailVerified", "is_verified");
        overrides.insert("Users", "verificationCode", "verification_token");
        overrides.insert("Books", "coverUrl", "cover_image_url");
        overrides.insert("Books", "genreId", "category_id");
        overrides.insert("Chapters", "audioUrl", "audio_key");
        overrides.insert("Chapters", "chapterNumber", "position");
        overrides.insert("Categories", "title", "name");
        overrides.insert("ListeningProgress", "lastPosition", "position_seconds");
        overrides
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Opening override file {path:?}"))?;
        serde_yaml::from_str(&raw).with_context(|| format!("Parsing override file {path:?}"))
    }

    pub fn insert(&mut self, table: &str, source: &str, target: &str) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(source.to_string(), target.to_string());
    }

    /// Merges `other` into `self`; entries in `other` win.
    pub fn merge(&mut self, other: MappingOverrides) {
        for (table, columns) in other.tables {
            self.tables.entry(table).or_default().extend(columns);
        }
    }

    pub fn lookup(&self, table: &str, source: &str) -> Option<&str> {
        self.tables
            .get(table)
            .and_then(|columns| columns.get(source))
            .map(String::as_str)
    }
}

/// Resolves every source column of `table` against `targets`.
pub fn build_mapping(
    table: &str,
    sources: &[String],
    targets: &[String],
    overrides: &MappingOverrides,
) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    let mut claimed: HashSet<String> = HashSet::new();

    for source in sources {
        let mut resolved: Option<(String, MatchTier)> = None;
        if let Some(target) = overrides.lookup(table, source) {
            if targets.iter().any(|t| t == target) {
                resolved = Some((target.to_string(), MatchTier::Override));
            } else {
                mapping.notes.push(format!(
                    "override {table}.{source} -> {target} names a column missing from the target"
                ));
            }
        }
        if resolved.is_none() {
            resolved = MATCHERS
                .iter()
                .find_map(|(tier, matcher)| matcher(source, targets).map(|t| (t, *tier)));
        }
        match resolved {
            Some((target, _)) if claimed.contains(&target) => {
                mapping
                    .notes
                    .push(format!("{table}.{source} resolves to already mapped column '{target}'"));
                mapping.unmapped.insert(source.clone());
            }
            Some((target, tier)) => {
                claimed.insert(target.clone());
                mapping.entries.push(MappedColumn {
                    source: source.clone(),
                    target,
                    tier,
                });
            }
            None => {
                mapping.unmapped.insert(source.clone());
            }
        }
    }
    mapping
}
