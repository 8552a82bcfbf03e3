use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use rusqlite::Connection;
use url::Url;

use crate::prelude::*;

/// Columns the resolver never reads. Dropping them takes the snapshot from
/// gigabytes to something a laptop is happy with.
const DROP_COLUMNS: &[&str] = &[
    "id",
    "description",
    "summary",
    "author",
    "author_email",
    "maintainer",
    "maintainer_email",
    "package_url",
    "license",
    "home_page",
    "project_url",
    "platform",
];

/// One-time bootstrap: fetch the gzipped SQLite snapshot, then trim it down
/// to the columns and indexes the resolver actually uses.
pub fn run(db_path: &Path, url: &Url, force: bool) -> Result<()> {
    if db_path.exists() && !force {
        if database_ok(db_path) {
            info!("healthy database already present at {}", db_path.display());
            return Ok(());
        }
        warn!(
            "existing database at {} failed the integrity probe, refetching",
            db_path.display()
        );
        std::fs::remove_file(db_path)?;
    }
    download_and_extract(url, db_path)?;
    trim_database(db_path)
}

fn database_ok(path: &Path) -> bool {
    Connection::open(path)
        .and_then(|conn| conn.prepare("SELECT 1 FROM projects LIMIT 1").map(|_| ()))
        .is_ok()
}

/// Streams socket -> gunzip -> temp file, and only renames into place once
/// the whole download succeeded, so an interrupted fetch never leaves a
/// truncated database behind.
fn download_and_extract(url: &Url, dest: &Path) -> Result<()> {
    info!("downloading {}", url);
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(30))
        .build();
    let response = agent.request_url("GET", url).call()?;

    let mut decoder = GzDecoder::new(response.into_reader());
    let mut staging = tempfile::NamedTempFile::new_in(parent)?;
    let started = Instant::now();
    let bytes = io::copy(&mut decoder, &mut staging)?;
    staging.persist(dest)?;

    info!(
        "downloaded and extracted {} MB in {:.1?}",
        bytes / (1024 * 1024),
        started.elapsed()
    );
    Ok(())
}

fn trim_database(path: &Path) -> Result<()> {
    info!("trimming metadata database at {}", path.display());
    let conn = Connection::open(path)?;
    // bulk-rewrite settings for a one-time offline pass
    let _: String = conn.query_row("PRAGMA journal_mode = OFF", [], |row| row.get(0))?;
    conn.execute_batch("PRAGMA synchronous = 0; PRAGMA cache_size = 100000;")?;

    conn.execute("DROP TABLE IF EXISTS urls", [])?;

    let columns = table_columns(&conn, "projects")?;
    ensure!(
        !columns.is_empty(),
        "no projects table in the downloaded database"
    );
    for column in DROP_COLUMNS {
        if columns.iter().any(|present| present == column) {
            info!("dropping column {}", column);
            // some snapshots make e.g. `id` a primary key, which SQLite
            // refuses to drop; keeping it only costs a little space
            if let Err(err) =
                conn.execute(&format!("ALTER TABLE projects DROP COLUMN {}", column), [])
            {
                warn!("could not drop column {}: {}", column, err);
            }
        }
    }

    if !columns.iter().any(|present| present == "name_canonical") {
        info!("computing canonical name column");
        conn.execute("ALTER TABLE projects ADD COLUMN name_canonical TEXT", [])?;
        conn.execute(
            "UPDATE projects SET name_canonical = \
             LOWER(REPLACE(REPLACE(name, '_', '-'), '.', '-'))",
            [],
        )?;
        // collapse runs of separators to a single dash
        loop {
            let changed = conn.execute(
                "UPDATE projects SET name_canonical = REPLACE(name_canonical, '--', '-') \
                 WHERE name_canonical LIKE '%--%'",
                [],
            )?;
            if changed == 0 {
                break;
            }
        }
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS projects_name_canonical_idx \
         ON projects (name_canonical)",
        [],
    )?;

    info!("vacuuming");
    conn.execute("VACUUM", [])?;
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
