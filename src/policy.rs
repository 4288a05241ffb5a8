//! Declarative per-table policies for the audiobook schema.
//!
//! A [`TablePolicy`] names everything table-specific a run needs: where the
//! rows come from, where they go, which fields are identifiers, which fields
//! get defaults, and which fields are security-sensitive. The normalizer and
//! the identity validator consult the policy; neither branches on table names.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::MigrationError;

/// Literal some legacy rows carry in place of a real key.
pub const UNKNOWN_KEY_MARKER: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyKind {
    /// Canonical 8-4-4-4-12 UUID keys.
    Uuid,
    /// Integer keys drawn from a sequence.
    Sequence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub kind: KeyKind,
    /// A required foreign key that fails validation skips the whole record.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultRule {
    Placeholder(String),
    /// Slug built from another column plus the record identifier.
    SlugFrom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredDefault {
    pub column: String,
    pub rule: DefaultRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitivePolicy {
    /// The password column a new record must carry in usable form.
    pub credential_field: String,
    /// Secrets stripped from every record, new or existing.
    pub secret_fields: Vec<String>,
    pub verification_fields: Vec<String>,
    /// Lower-cased placeholder credentials that are never importable.
    pub insecure_credentials: Vec<String>,
    /// Reject credentials that do not look like a password hash.
    pub require_hashed: bool,
}

impl SensitivePolicy {
    pub fn is_insecure(&self, credential: &str) -> bool {
        let lowered = credential.trim().to_ascii_lowercase();
        self.insecure_credentials.iter().any(|c| *c == lowered)
    }
}

const HASH_PREFIXES: &[&str] = &["$2a$", "$2b$", "$2y$", "$argon2", "$scrypt$", "pbkdf2"];

pub fn looks_hashed(credential: &str) -> bool {
    HASH_PREFIXES.iter().any(|p| credential.starts_with(p))
}

#[derive(Debug, Clone)]
pub struct TablePolicy {
    pub source_table: String,
    /// File stems and document keys that also name this table in JSON snapshots.
    pub snapshot_aliases: Vec<String>,
    pub target_table: String,
    pub primary_key: String,
    pub key_kind: KeyKind,
    /// Target tables this one references by foreign key.
    pub references: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub timestamp_columns: Vec<String>,
    pub defaults: Vec<RequiredDefault>,
    pub sensitive: Option<SensitivePolicy>,
}

impl TablePolicy {
    pub fn new(source_table: &str, target_table: &str, key_kind: KeyKind) -> Self {
        Self {
            source_table: source_table.to_string(),
            snapshot_aliases: Vec::new(),
            target_table: target_table.to_string(),
            primary_key: "id".to_string(),
            key_kind,
            references: Vec::new(),
            foreign_keys: Vec::new(),
            timestamp_columns: vec!["created_at".to_string(), "updated_at".to_string()],
            defaults: Vec::new(),
            sensitive: None,
        }
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.snapshot_aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn foreign_key(mut self, column: &str, table: &str, kind: KeyKind, required: bool) -> Self {
        if !self.references.iter().any(|t| t == table) {
            self.references.push(table.to_string());
        }
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            kind,
            required,
        });
        self
    }

    pub fn placeholder(mut self, column: &str, value: &str) -> Self {
        self.defaults.push(RequiredDefault {
            column: column.to_string(),
            rule: DefaultRule::Placeholder(value.to_string()),
        });
        self
    }

    pub fn slug_from(mut self, column: &str, base: &str) -> Self {
        self.defaults.push(RequiredDefault {
            column: column.to_string(),
            rule: DefaultRule::SlugFrom(base.to_string()),
        });
        self
    }

    pub fn sensitive(mut self, policy: SensitivePolicy) -> Self {
        self.sensitive = Some(policy);
        self
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.source_table.eq_ignore_ascii_case(name)
            || self.target_table.eq_ignore_ascii_case(name)
            || self
                .snapshot_aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: Vec<TablePolicy>,
}

impl PolicyRegistry {
    /// Builds a registry, rejecting declarations whose references form a cycle.
    pub fn new(policies: Vec<TablePolicy>) -> Result<Self, MigrationError> {
        let registry = Self { policies };
        registry.dependency_order()?;
        Ok(registry)
    }

    /// Tables of the audiobook platform, in declaration order.
    pub fn audiobook() -> Self {
        let users = TablePolicy::new("Users", "users", KeyKind::Uuid)
            .aliases(&["users", "user"])
            .placeholder("name", "Unknown User")
            .sensitive(SensitivePolicy {
                credential_field: "password_hash".to_string(),
                secret_fields: vec!["reset_password_token".to_string()],
                verification_fields: vec![
                    "is_verified".to_string(),
                    "email_verified_at".to_string(),
                    "verification_token".to_string(),
                ],
                insecure_credentials: ["default_password", "password", "changeme", "123456", "temp"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                require_hashed: true,
            });
        let authors = TablePolicy::new("Authors", "authors", KeyKind::Uuid)
            .aliases(&["authors", "author"])
            .placeholder("name", "Unknown Author");
        let categories = TablePolicy::new("Categories", "categories", KeyKind::Sequence)
            .aliases(&["categories", "category", "genres"])
            .placeholder("name", "Uncategorized")
            .slug_from("slug", "name");
        let books = TablePolicy::new("Books", "books", KeyKind::Uuid)
            .aliases(&["books", "book", "audiobooks"])
            .foreign_key("author_id", "authors", KeyKind::Uuid, true)
            .foreign_key("category_id", "categories", KeyKind::Sequence, false)
            .placeholder("title", "Untitled")
            .slug_from("slug", "title");
        let chapters = TablePolicy::new("Chapters", "chapters", KeyKind::Uuid)
            .aliases(&["chapters", "chapter"])
            .foreign_key("book_id", "books", KeyKind::Uuid, true)
            .placeholder("title", "Untitled Chapter");
        let subscriptions = TablePolicy::new("Subscriptions", "subscriptions", KeyKind::Uuid)
            .aliases(&["subscriptions", "subscription"])
            .foreign_key("user_id", "users", KeyKind::Uuid, true);
        let reviews = TablePolicy::new("Reviews", "reviews", KeyKind::Uuid)
            .aliases(&["reviews", "review"])
            .foreign_key("user_id", "users", KeyKind::Uuid, false)
            .foreign_key("book_id", "books", KeyKind::Uuid, true);
        let progress = TablePolicy::new("ListeningProgress", "listening_progress", KeyKind::Uuid)
            .aliases(&["listening_progress", "progress", "listeningProgress"])
            .foreign_key("user_id", "users", KeyKind::Uuid, true)
            .foreign_key("book_id", "books", KeyKind::Uuid, true)
            .foreign_key("chapter_id", "chapters", KeyKind::Uuid, false);

        Self {
            policies: vec![
                users,
                authors,
                categories,
                books,
                chapters,
                subscriptions,
                reviews,
                progress,
            ],
        }
    }

    pub fn policies(&self) -> &[TablePolicy] {
        &self.policies
    }

    pub fn find(&self, name: &str) -> Option<&TablePolicy> {
        self.policies.iter().find(|p| p.matches_name(name))
    }

    /// Topological order over `references`, stable with respect to declaration
    /// order. References to tables outside the registry are ignored.
    pub fn dependency_order(&self) -> Result<Vec<&TablePolicy>, MigrationError> {
        let known: HashSet<&str> = self
            .policies
            .iter()
            .map(|p| p.target_table.as_str())
            .collect();
        let mut pending: HashMap<&str, usize> = self
            .policies
            .iter()
            .map(|p| {
                let deps = p
                    .references
                    .iter()
                    .filter(|r| known.contains(r.as_str()) && **r != p.target_table)
                    .count();
                (p.target_table.as_str(), deps)
            })
            .collect();
        let mut ordered: Vec<&TablePolicy> = Vec::with_capacity(self.policies.len());
        let mut placed: HashSet<&str> = HashSet::new();

        while ordered.len() < self.policies.len() {
            let next = self.policies.iter().find(|p| {
                let name = p.target_table.as_str();
                !placed.contains(name) && pending[name] == 0
            });
            let Some(policy) = next else {
                let stuck = self
                    .policies
                    .iter()
                    .filter(|p| !placed.contains(p.target_table.as_str()))
                    .map(|p| p.target_table.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(MigrationError::DependencyCycle(stuck));
            };
            placed.insert(policy.target_table.as_str());
            ordered.push(policy);
            for dependent in &self.policies {
                if dependent.references.iter().any(|r| *r == policy.target_table)
                    && dependent.target_table != policy.target_table
                {
                    if let Some(count) = pending.get_mut(dependent.target_table.as_str()) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[&TablePolicy], table: &str) -> usize {
        order.iter().position(|p| p.target_table == table).unwrap()
    }

    #[test]
    fn audiobook_order_visits_referents_first() {
        let registry = PolicyRegistry::audiobook();
        let order = registry.dependency_order().unwrap();
        assert_eq!(order.len(), registry.policies().len());
        for policy in &order {
            for referenced in &policy.references {
                assert!(
                    position(&order, referenced) < position(&order, &policy.target_table),
                    "{referenced} must precede {}",
                    policy.target_table
                );
            }
        }
    }

    #[test]
    fn dependency_order_reorders_out_of_order_declarations() {
        let chapters = TablePolicy::new("Chapters", "chapters", KeyKind::Uuid).foreign_key(
            "book_id",
            "books",
            KeyKind::Uuid,
            true,
        );
        let books = TablePolicy::new("Books", "books", KeyKind::Uuid);
        let registry = PolicyRegistry::new(vec![chapters, books]).unwrap();
        let order = registry.dependency_order().unwrap();
        assert_eq!(order[0].target_table, "books");
        assert_eq!(order[1].target_table, "chapters");
    }

    #[test]
    fn dependency_cycles_are_rejected() {
        let a = TablePolicy::new("A", "a", KeyKind::Uuid)
            .foreign_key("b_id", "b", KeyKind::Uuid, false);
        let b = TablePolicy::new("B", "b", KeyKind::Uuid)
            .foreign_key("a_id", "a", KeyKind::Uuid, false);
        let err = PolicyRegistry::new(vec![a, b]).unwrap_err();
        assert!(matches!(err, MigrationError::DependencyCycle(_)));
    }

    #[test]
    fn find_accepts_source_target_and_alias_names() {
        let registry = PolicyRegistry::audiobook();
        assert_eq!(registry.find("Users").unwrap().target_table, "users");
        assert_eq!(registry.find("listening_progress").unwrap().source_table, "ListeningProgress");
        assert_eq!(registry.find("audiobooks").unwrap().target_table, "books");
        assert!(registry.find("payments").is_none());
    }

    #[test]
    fn insecure_credentials_match_case_insensitively() {
        let registry = PolicyRegistry::audiobook();
        let sensitive = registry.find("users").unwrap().sensitive.as_ref().unwrap();
        assert!(sensitive.is_insecure("Default_Password"));
        assert!(!sensitive.is_insecure("$2b$10$abcdefghijklmnopqrstuv"));
        assert!(looks_hashed("$2b$10$abcdefghijklmnopqrstuv"));
        assert!(!looks_hashed("hunter2"));
    }
}
