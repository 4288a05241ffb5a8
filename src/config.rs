use std::{fmt, path::Path};

use anyhow::Result;
use log::debug;

use crate::{cli::DbArgs, mapping::MappingOverrides};

/// Connection parameters for the target database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub schema: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "audiobooks".to_string(),
            schema: "public".to_string(),
        }
    }
}

impl From<&DbArgs> for DbConfig {
    fn from(args: &DbArgs) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            user: args.user.clone(),
            password: args.password.clone(),
            database: args.database.clone(),
            schema: args.schema.clone(),
        }
    }
}

impl DbConfig {
    pub fn to_pg_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.database)
            .application_name("backup-reconciler");
        config
    }
}

// The password is never rendered.
impl fmt::Display for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postgres://{}@{}:{}/{} (schema {})",
            self.user, self.host, self.port, self.database, self.schema
        )
    }
}

/// Built-in overrides, extended by an optional YAML file.
pub fn load_overrides(path: Option<&Path>) -> Result<MappingOverrides> {
    let mut overrides = MappingOverrides::builtin();
    if let Some(path) = path {
        debug!("Loading column overrides from {path:?}");
        overrides.merge(MappingOverrides::load(path)?);
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn display_hides_password() {
        let config = DbConfig {
            password: "s3cret".into(),
            ..DbConfig::default()
        };
        let rendered = config.to_string();
        assert_eq!(rendered, "postgres://postgres@localhost:5432/audiobooks (schema public)");
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn override_file_extends_builtins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Books:\n  isbn13: isbn").unwrap();
        let overrides = load_overrides(Some(file.path())).unwrap();
        assert_eq!(overrides.lookup("Books", "isbn13"), Some("isbn"));
        assert_eq!(overrides.lookup("Users", "password"), Some("password_hash"));
    }
}
