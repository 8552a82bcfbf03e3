use rusqlite::{params, Connection};

use crate::prelude::*;
use crate::store::SqliteStore;

/// One row for the seeded test store, mirroring the trimmed on-disk schema.
pub struct TestRelease {
    name: &'static str,
    version: &'static str,
    requires_dist: Vec<&'static str>,
    requires_python: Option<&'static str>,
    yanked: bool,
}

impl TestRelease {
    pub fn new(name: &'static str, version: &'static str) -> TestRelease {
        TestRelease {
            name,
            version,
            requires_dist: Vec::new(),
            requires_python: None,
            yanked: false,
        }
    }

    pub fn dep(mut self, requirement: &'static str) -> TestRelease {
        self.requires_dist.push(requirement);
        self
    }

    pub fn python(mut self, specifiers: &'static str) -> TestRelease {
        self.requires_python = Some(specifiers);
        self
    }

    pub fn yanked(mut self) -> TestRelease {
        self.yanked = true;
        self
    }
}

pub fn blank_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    create_schema(&conn);
    conn
}

fn create_schema(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE projects (
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            requires_dist TEXT,
            requires_python TEXT,
            yanked INTEGER NOT NULL DEFAULT 0,
            name_canonical TEXT NOT NULL
        );
        CREATE INDEX projects_name_canonical_idx ON projects (name_canonical);",
    )
    .unwrap();
}

pub fn insert_raw(
    conn: &Connection,
    name: &str,
    version: &str,
    requires_dist: Option<&str>,
    requires_python: Option<&str>,
    yanked: i64,
) {
    let canonical_name: PackageName = name.try_into().unwrap();
    conn.execute(
        "INSERT INTO projects (name, version, requires_dist, requires_python, yanked, name_canonical)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            name,
            version,
            requires_dist,
            requires_python,
            yanked,
            canonical_name.canonical()
        ],
    )
    .unwrap();
}

fn seed(conn: &Connection, releases: &[TestRelease]) {
    for release in releases {
        let requires_dist = if release.requires_dist.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&release.requires_dist).unwrap())
        };
        insert_raw(
            conn,
            release.name,
            release.version,
            requires_dist.as_deref(),
            release.requires_python,
            release.yanked as i64,
        );
    }
}

/// An in-memory store seeded with the given releases.
pub fn store_with(releases: Vec<TestRelease>) -> SqliteStore {
    let conn = blank_connection();
    seed(&conn, &releases);
    SqliteStore::from_connection(conn)
}

/// An on-disk store for paths that open the database by filename (the
/// service config). Keep the handle alive for as long as the file is needed.
pub fn db_file(releases: Vec<TestRelease>) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    create_schema(&conn);
    seed(&conn, &releases);
    conn.close().map_err(|(_, err)| err).unwrap();
    file
}
