//! Pull-mark cache for the worklog reporter.
//!
//! Reflog entries expire and local clones come and go, so pull marks are
//! persisted with `rusqlite` once observed. Each project keeps a set of
//! marks; recording the same mark twice is a no-op.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not
//! `Sync`. Move it between threads freely, but wrap it in a `Mutex` to share.
//!
//! # Schema
//!
//! Instants are stored as TEXT in RFC 3339 UTC with millisecond precision
//! (e.g. `2025-10-20T09:00:00.000Z`), so lexicographic order matches
//! chronological order.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use thiserror::Error;
use wl_core::{ProjectId, PullMark, PullMarkSource, ValidationError};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored instant could not be parsed.
    #[error("invalid pull mark instant for {project}: {instant}")]
    InstantParse {
        project: String,
        instant: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored project name is not a valid identifier.
    #[error("invalid project name in cache: {0}")]
    InvalidProject(#[from] ValidationError),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database, destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the schema. Idempotent.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- instant: RFC 3339 UTC, millisecond precision
            CREATE TABLE IF NOT EXISTS pull_marks (
                project TEXT NOT NULL,
                instant TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                UNIQUE (project, instant)
            );

            CREATE INDEX IF NOT EXISTS idx_pull_marks_project ON pull_marks(project, instant);
            ",
        )?;
        Ok(())
    }

    /// Stores marks for a project, ignoring ones already recorded.
    ///
    /// Returns how many marks were new.
    pub fn record_pull_marks(
        &mut self,
        project: &ProjectId,
        marks: &[PullMark],
    ) -> Result<usize, DbError> {
        if marks.is_empty() {
            return Ok(0);
        }
        let recorded_at = format_instant(Utc::now());
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO pull_marks (project, instant, recorded_at) VALUES (?, ?, ?)",
            )?;
            for mark in marks {
                inserted += stmt.execute(params![
                    project.as_str(),
                    format_instant(mark.instant),
                    recorded_at,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(project = %project, inserted, total = marks.len(), "recorded pull marks");
        Ok(inserted)
    }

    /// All marks for a project in chronological order.
    pub fn pull_marks_for(&self, project: &ProjectId) -> Result<Vec<PullMark>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT instant FROM pull_marks WHERE project = ? ORDER BY instant ASC")?;
        let rows = stmt.query_map([project.as_str()], |row| row.get::<_, String>(0))?;
        let mut marks = Vec::new();
        for row in rows {
            let instant = parse_instant(&row?, project.as_str())?;
            marks.push(PullMark::new(instant));
        }
        Ok(marks)
    }

    /// Marks for each requested project; projects with none map to an empty list.
    pub fn snapshot<'a>(
        &self,
        projects: impl IntoIterator<Item = &'a ProjectId>,
    ) -> Result<BTreeMap<ProjectId, Vec<PullMark>>, DbError> {
        let mut snapshot = BTreeMap::new();
        for project in projects {
            snapshot.insert(project.clone(), self.pull_marks_for(project)?);
        }
        Ok(snapshot)
    }

    /// Projects with at least one recorded mark, with their mark counts.
    pub fn projects(&self) -> Result<Vec<(ProjectId, usize)>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT project, COUNT(*) FROM pull_marks GROUP BY project ORDER BY project ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut projects = Vec::new();
        for row in rows {
            let (name, count) = row?;
            projects.push((
                ProjectId::new(name)?,
                usize::try_from(count).unwrap_or_default(),
            ));
        }
        Ok(projects)
    }
}

impl PullMarkSource for Database {
    type Error = DbError;

    fn pull_marks(&self, project: &ProjectId) -> Result<Vec<PullMark>, Self::Error> {
        self.pull_marks_for(project)
    }
}

fn parse_instant(instant: &str, project: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(instant)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::InstantParse {
            project: project.to_string(),
            instant: instant.to_string(),
            source,
        })
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mark(h: u32, m: u32) -> PullMark {
        PullMark::new(Utc.with_ymd_and_hms(2025, 10, 20, h, m, 0).unwrap())
    }

    fn project(name: &str) -> ProjectId {
        ProjectId::new(name).unwrap()
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_has_pull_marks_table() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert_eq!(
            table_columns(&db.conn, "pull_marks"),
            vec!["project", "instant", "recorded_at"]
        );
    }

    #[test]
    fn init_is_idempotent() {
        let db = Database::open_in_memory().expect("open in-memory db");
        db.init().expect("second init");
    }

    #[test]
    fn record_pull_marks_is_idempotent() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let alpha = project("alpha");

        let inserted = db
            .record_pull_marks(&alpha, &[mark(9, 0), mark(9, 0), mark(8, 0)])
            .unwrap();
        assert_eq!(inserted, 2);

        let again = db.record_pull_marks(&alpha, &[mark(8, 0)]).unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn pull_marks_for_is_chronological_and_scoped() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.record_pull_marks(&project("alpha"), &[mark(14, 0), mark(9, 30)])
            .unwrap();
        db.record_pull_marks(&project("beta"), &[mark(10, 0)]).unwrap();

        assert_eq!(
            db.pull_marks_for(&project("alpha")).unwrap(),
            vec![mark(9, 30), mark(14, 0)]
        );
        assert_eq!(db.pull_marks_for(&project("beta")).unwrap(), vec![mark(10, 0)]);
        assert!(db.pull_marks_for(&project("gamma")).unwrap().is_empty());
    }

    #[test]
    fn snapshot_includes_projects_without_marks() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.record_pull_marks(&project("alpha"), &[mark(9, 0)]).unwrap();

        let wanted = [project("alpha"), project("beta")];
        let snapshot = db.snapshot(&wanted).unwrap();
        assert_eq!(snapshot[&project("alpha")], vec![mark(9, 0)]);
        assert!(snapshot[&project("beta")].is_empty());
    }

    #[test]
    fn projects_lists_counts() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.record_pull_marks(&project("beta"), &[mark(9, 0)]).unwrap();
        db.record_pull_marks(&project("alpha"), &[mark(9, 0), mark(10, 0)])
            .unwrap();

        assert_eq!(
            db.projects().unwrap(),
            vec![(project("alpha"), 2), (project("beta"), 1)]
        );
    }

    #[test]
    fn corrupt_instant_is_reported() {
        let db = Database::open_in_memory().expect("open in-memory db");
        db.conn
            .execute(
                "INSERT INTO pull_marks (project, instant, recorded_at) VALUES ('alpha', 'yesterday', 'now')",
                [],
            )
            .unwrap();
        let err = db.pull_marks_for(&project("alpha")).unwrap_err();
        assert!(matches!(err, DbError::InstantParse { .. }));
    }

    #[test]
    fn serves_as_pull_mark_source() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.record_pull_marks(&project("alpha"), &[mark(9, 0)]).unwrap();
        let marks = PullMarkSource::pull_marks(&db, &project("alpha")).unwrap();
        assert_eq!(marks, vec![mark(9, 0)]);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wl.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.record_pull_marks(&project("alpha"), &[mark(9, 0)]).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.pull_marks_for(&project("alpha")).unwrap(), vec![mark(9, 0)]);
    }
}
