#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use backup_reconciler::{
    catalog::{ColumnInfo, TableSchema},
    data::Value,
    record::TargetRow,
    store::MemoryStore,
};
use tempfile::{TempDir, tempdir};

pub const ALICE: &str = "11111111-1111-4111-8111-111111111111";
pub const BOB: &str = "22222222-2222-4222-8222-222222222222";
pub const CAROL: &str = "33333333-3333-4333-8333-333333333333";
pub const ALICE_TWIN: &str = "44444444-4444-4444-8444-444444444444";
pub const AUTHOR: &str = "aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa";
pub const BOOK: &str = "bbbbbbbb-bbbb-4bbb-8bbb-bbbbbbbbbbbb";
pub const ORPHAN_BOOK: &str = "b2b2b2b2-b2b2-4b2b-8b2b-b2b2b2b2b2b2";
pub const CHAPTER: &str = "cccccccc-cccc-4ccc-8ccc-cccccccccccc";
pub const REVIEW: &str = "dddddddd-dddd-4ddd-8ddd-dddddddddddd";

pub const STORED_HASH: &str = "$2b$12$KIXQJ1p7bW0oYq3ZqQ2uUe0mD5n7ZC9k8lqfZ0H7T0m0b1n2c3d4e";

pub const BACKUP_FIXTURE: &str = "audiobooks_backup_2024-01-15.sql";

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Copies a fixture from `tests/data` into the workspace.
    pub fn copy_fixture(&self, name: &str) -> PathBuf {
        let target = self.temp_dir.path().join(name);
        std::fs::copy(fixture_path(name), &target).expect("copy fixture");
        target
    }
}

fn uuid(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, "uuid", "uuid")
}

fn text(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, "character varying", "varchar")
}

fn int(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, "integer", "int4")
}

fn flag(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, "boolean", "bool")
}

fn instant(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, "timestamp with time zone", "timestamptz")
}

fn document(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, "jsonb", "jsonb")
}

fn text_array(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, "ARRAY", "_text")
}

fn table(name: &str, mut columns: Vec<ColumnInfo>) -> TableSchema {
    columns.push(instant("created_at"));
    columns.push(instant("updated_at"));
    TableSchema {
        name: name.to_string(),
        columns,
    }
}

/// The live audiobook schema, empty.
pub fn audiobook_store() -> MemoryStore {
    MemoryStore::new()
        .with_table(
            table(
                "users",
                vec![
                    uuid("id"),
                    text("email"),
                    text("name"),
                    text("password_hash"),
                    flag("is_verified"),
                    instant("email_verified_at"),
                    text("verification_token"),
                    text("reset_password_token"),
                ],
            ),
            "id",
            &["email"],
        )
        .with_table(
            table("authors", vec![uuid("id"), text("name"), text("bio")]),
            "id",
            &[],
        )
        .with_table(
            table("categories", vec![int("id"), text("name"), text("slug")]),
            "id",
            &["slug"],
        )
        .with_table(
            table(
                "books",
                vec![
                    uuid("id"),
                    text("title"),
                    text("slug"),
                    uuid("author_id"),
                    int("category_id"),
                    text("cover_image_url"),
                    int("duration_seconds"),
                    text_array("tags"),
                    document("metadata"),
                ],
            ),
            "id",
            &["slug"],
        )
        .with_table(
            table(
                "chapters",
                vec![
                    uuid("id"),
                    uuid("book_id"),
                    text("title"),
                    int("position"),
                    text("audio_key"),
                ],
            ),
            "id",
            &[],
        )
        .with_table(
            table(
                "subscriptions",
                vec![uuid("id"), uuid("user_id"), text("plan"), text("status")],
            ),
            "id",
            &[],
        )
        .with_table(
            table(
                "reviews",
                vec![
                    uuid("id"),
                    uuid("user_id"),
                    uuid("book_id"),
                    int("rating"),
                    text("comment"),
                ],
            ),
            "id",
            &[],
        )
        .with_table(
            table(
                "listening_progress",
                vec![
                    uuid("id"),
                    uuid("user_id"),
                    uuid("book_id"),
                    uuid("chapter_id"),
                    int("position_seconds"),
                ],
            ),
            "id",
            &[],
        )
}

/// The live schema holding one verified user, Alice.
pub fn store_with_alice() -> MemoryStore {
    let mut store = audiobook_store();
    let alice: TargetRow = [
        ("id", Value::String(ALICE.into())),
        ("email", Value::String("alice@example.com".into())),
        ("name", Value::String("Alice".into())),
        ("password_hash", Value::String(STORED_HASH.into())),
        ("is_verified", Value::Boolean(true)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    store.seed("users", alice).expect("seed alice");
    store
}
