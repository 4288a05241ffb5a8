use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use log::{debug, info};
use regex::Regex;

use crate::error::MigrationError;

/// File names the search accepts, as shown in diagnostics.
pub const BACKUP_PATTERN: &str = "*backup*.sql, *.dump or *backup*.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupLocation {
    Dump(PathBuf),
    SnapshotDirectory(PathBuf),
    SnapshotDocument(PathBuf),
}

impl BackupLocation {
    pub fn path(&self) -> &Path {
        match self {
            BackupLocation::Dump(p)
            | BackupLocation::SnapshotDirectory(p)
            | BackupLocation::SnapshotDocument(p) => p,
        }
    }

    fn classify(path: PathBuf) -> Self {
        if path.is_dir() {
            return BackupLocation::SnapshotDirectory(path);
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => BackupLocation::SnapshotDocument(path),
            _ => BackupLocation::Dump(path),
        }
    }
}

fn backup_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(.*backup.*\.(sql|json)|.*\.dump)$").expect("valid backup name pattern")
    })
}

pub fn matches_backup_name(name: &str) -> bool {
    backup_name_pattern().is_match(name)
}

/// Resolves where the backup lives. An explicit path wins; otherwise the
/// lexicographically last matching file in `search_dir` is used.
pub fn locate(explicit: Option<&Path>, search_dir: &Path) -> Result<BackupLocation> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(MigrationError::SourceNotFound(path.to_path_buf()).into());
        }
        let location = BackupLocation::classify(path.to_path_buf());
        info!("Using backup source {:?}", location.path());
        return Ok(location);
    }

    let entries = match fs::read_dir(search_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(missing(search_dir));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Scanning {search_dir:?} for backups"));
        }
    };
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Scanning {search_dir:?} for backups"))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && matches_backup_name(name) {
            debug!("Backup candidate {path:?}");
            candidates.push(path);
        }
    }
    candidates.sort();
    let chosen = candidates.pop().ok_or_else(|| missing(search_dir))?;
    info!("Found backup {chosen:?}");
    Ok(BackupLocation::classify(chosen))
}

fn missing(search_dir: &Path) -> anyhow::Error {
    MigrationError::MissingSource {
        searched: search_dir.to_path_buf(),
        pattern: BACKUP_PATTERN,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn name_pattern_accepts_known_shapes() {
        assert!(matches_backup_name("audiobooks_backup_2024-01-15.sql"));
        assert!(matches_backup_name("Backup.SQL"));
        assert!(matches_backup_name("prod.dump"));
        assert!(matches_backup_name("backup-tables.json"));
        assert!(!matches_backup_name("schema.sql"));
        assert!(!matches_backup_name("backup.sql.gz"));
    }

    #[test]
    fn search_picks_latest_matching_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("backup_2024-01-01.sql"), "").unwrap();
        fs::write(dir.path().join("backup_2024-03-01.sql"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        let location = locate(None, dir.path()).unwrap();
        assert_eq!(
            location,
            BackupLocation::Dump(dir.path().join("backup_2024-03-01.sql"))
        );
    }

    #[test]
    fn explicit_paths_are_classified() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("export.json");
        fs::write(&doc, "{}").unwrap();
        assert_eq!(
            locate(Some(doc.as_path()), Path::new("/nonexistent")).unwrap(),
            BackupLocation::SnapshotDocument(doc)
        );
        assert_eq!(
            locate(Some(dir.path()), Path::new("/nonexistent")).unwrap(),
            BackupLocation::SnapshotDirectory(dir.path().to_path_buf())
        );
    }

    #[test]
    fn nothing_found_is_missing_source() {
        let dir = tempdir().unwrap();
        let err = locate(None, dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::MissingSource { .. })
        ));
    }
}
