use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

use super::MetadataStore;
use crate::error::StoreError;
use crate::prelude::*;

/// Metadata store over the trimmed `projects` table produced by `setup`.
/// Lookups go through the precomputed `name_canonical` column.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<SqliteStore, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(SqliteStore { conn })
    }

    #[cfg(test)]
    pub fn from_connection(conn: Connection) -> SqliteStore {
        SqliteStore { conn }
    }

    fn cell(
        &self,
        column: &str,
        name: &PackageName,
        version: &str,
    ) -> Result<Option<SqlValue>, StoreError> {
        let sql = format!(
            "SELECT {} FROM projects WHERE name_canonical = ?1 AND version = ?2",
            column
        );
        let value = self
            .conn
            .query_row(&sql, params![name.canonical(), version], |row| row.get(0))
            .optional()?;
        Ok(value)
    }
}

/// Scraped snapshots are messy: "absent" shows up as NULL, as an empty
/// string, or as the literal text "null".
fn text_or_absent(value: Option<SqlValue>) -> Option<String> {
    match value {
        Some(SqlValue::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == "null" {
                None
            } else {
                Some(text)
            }
        }
        _ => None,
    }
}

impl MetadataStore for SqliteStore {
    fn available_versions(&self, name: &PackageName) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT version FROM projects WHERE name_canonical = ?1")?;
        let rows = stmt.query_map([name.canonical()], |row| row.get::<_, String>(0))?;
        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        Ok(versions)
    }

    fn dependencies(
        &self,
        name: &PackageName,
        version: &str,
    ) -> Result<Vec<String>, StoreError> {
        let text = match text_or_absent(self.cell("requires_dist", name, version)?) {
            Some(text) => text,
            None => return Ok(Vec::new()),
        };
        // usually a JSON array; some rows hold a single raw requirement
        match serde_json::from_str::<Vec<String>>(&text) {
            Ok(requirements) => Ok(requirements),
            Err(_) => Ok(vec![text]),
        }
    }

    fn requires_python(
        &self,
        name: &PackageName,
        version: &str,
    ) -> Result<Option<Specifiers>, StoreError> {
        let text = match text_or_absent(self.cell("requires_python", name, version)?) {
            Some(text) => text,
            None => return Ok(None),
        };
        match Specifiers::try_from(text.as_str()) {
            Ok(specifiers) => Ok(Some(specifiers)),
            Err(err) => {
                warn!(
                    "ignoring unparseable requires_python {:?} on {} {}: {:#}",
                    text,
                    name.canonical(),
                    version,
                    err
                );
                Ok(None)
            }
        }
    }

    fn yanked(&self, name: &PackageName, version: &str) -> Result<bool, StoreError> {
        Ok(match self.cell("yanked", name, version)? {
            Some(SqlValue::Integer(flag)) => flag != 0,
            Some(SqlValue::Real(flag)) => flag != 0.0,
            Some(SqlValue::Text(text)) => {
                !matches!(text.trim(), "" | "0" | "false" | "null")
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{blank_connection, insert_raw, store_with, TestRelease};

    fn name(raw: &str) -> PackageName {
        raw.try_into().unwrap()
    }

    #[test]
    fn test_available_versions() {
        let store = store_with(vec![
            TestRelease::new("Flask", "1.0"),
            TestRelease::new("Flask", "2.0"),
            TestRelease::new("other", "0.1"),
        ]);
        let mut versions = store.available_versions(&name("flask")).unwrap();
        versions.sort();
        assert_eq!(versions, vec!["1.0", "2.0"]);
        assert!(store.available_versions(&name("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_is_canonical() {
        let store = store_with(vec![TestRelease::new("Typing_Extensions", "4.0")]);
        assert_eq!(
            store.available_versions(&name("typing-extensions")).unwrap(),
            vec!["4.0"]
        );
    }

    #[test]
    fn test_dependencies_json_array() {
        let store = store_with(vec![
            TestRelease::new("a", "1.0").dep("b >= 2").dep("c; python_version < '3'"),
        ]);
        assert_eq!(
            store.dependencies(&name("a"), "1.0").unwrap(),
            vec!["b >= 2", "c; python_version < '3'"]
        );
        // absent release: empty, not an error
        assert!(store.dependencies(&name("a"), "9.9").unwrap().is_empty());
    }

    #[test]
    fn test_dependencies_raw_string_and_absent_tokens() {
        let conn = blank_connection();
        insert_raw(&conn, "a", "1.0", Some("b >= 2"), None, 0);
        insert_raw(&conn, "a", "2.0", Some("null"), None, 0);
        insert_raw(&conn, "a", "3.0", Some(""), None, 0);
        let store = SqliteStore::from_connection(conn);
        assert_eq!(store.dependencies(&name("a"), "1.0").unwrap(), vec!["b >= 2"]);
        assert!(store.dependencies(&name("a"), "2.0").unwrap().is_empty());
        assert!(store.dependencies(&name("a"), "3.0").unwrap().is_empty());
    }

    #[test]
    fn test_requires_python() {
        let conn = blank_connection();
        insert_raw(&conn, "a", "1.0", None, Some(">=3.8"), 0);
        insert_raw(&conn, "a", "2.0", None, Some("null"), 0);
        insert_raw(&conn, "a", "3.0", None, Some("not a specifier"), 0);
        let store = SqliteStore::from_connection(conn);
        let specifiers = store.requires_python(&name("a"), "1.0").unwrap().unwrap();
        assert!(specifiers
            .satisfied_by(&"3.10".try_into().unwrap())
            .unwrap());
        assert!(store.requires_python(&name("a"), "2.0").unwrap().is_none());
        // unparseable cells degrade to "absent", they don't abort
        assert!(store.requires_python(&name("a"), "3.0").unwrap().is_none());
    }

    #[test]
    fn test_yanked() {
        let store = store_with(vec![
            TestRelease::new("a", "1.0").yanked(),
            TestRelease::new("a", "2.0"),
        ]);
        assert!(store.yanked(&name("a"), "1.0").unwrap());
        assert!(!store.yanked(&name("a"), "2.0").unwrap());
        assert!(!store.yanked(&name("a"), "9.9").unwrap());
    }

    #[test]
    fn test_exists() {
        let store = store_with(vec![
            TestRelease::new("a", "1.0"),
            TestRelease::new("a", "2.0"),
        ]);
        let any = Specifiers::any();
        assert!(store.exists(&name("a"), &any).unwrap());
        assert!(!store.exists(&name("b"), &any).unwrap());
        assert!(store
            .exists(&name("a"), &">= 2".try_into().unwrap())
            .unwrap());
        assert!(!store
            .exists(&name("a"), &"> 2.0".try_into().unwrap())
            .unwrap());
    }

    #[test]
    fn test_exists_skips_unparseable_versions() {
        let conn = blank_connection();
        insert_raw(&conn, "a", "not.a(version", None, None, 0);
        insert_raw(&conn, "a", "1.0", None, None, 0);
        let store = SqliteStore::from_connection(conn);
        assert!(store.exists(&name("a"), &"== 1.0".try_into().unwrap()).unwrap());
        // the empty set matches on existence alone
        assert!(store.exists(&name("a"), &Specifiers::any()).unwrap());
    }
}
