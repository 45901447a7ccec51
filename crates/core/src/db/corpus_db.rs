use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::{BuildRunRecord, BuildRunStatus, CorpusStats};
use crate::model::{ExtractedFunction, Label, LabeledFunction, Provenance};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Error type for corpus database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite store for build-run history and the labeled function corpus.
///
/// A `(binary_path, address, name)` triple is stored at most once; relabeling a binary
/// replaces its earlier rows.
#[derive(Debug)]
pub struct CorpusDb {
    conn: Connection,
}

impl CorpusDb {
    /// Open (or create) a corpus database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> DbResult<i32> {
        current_schema_version(&self.conn)
    }

    /// Insert a build run record and return its row id.
    pub fn insert_build_run(&self, record: &BuildRunRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO build_runs (config_hash, status, attempted, succeeded, failed, libraries_built, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.config_hash,
                record.status.as_str(),
                record.attempted as i64,
                record.succeeded as i64,
                record.failed as i64,
                record.libraries_built as i64,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List build runs, oldest first.
    pub fn list_build_runs(&self) -> DbResult<Vec<BuildRunRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT config_hash, status, attempted, succeeded, failed, libraries_built, started_at, finished_at
            FROM build_runs
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(1)?;
            Ok(BuildRunRecord {
                config_hash: row.get(0)?,
                status: status.parse::<BuildRunStatus>()?,
                attempted: row.get::<_, i64>(2)? as u64,
                succeeded: row.get::<_, i64>(3)? as u64,
                failed: row.get::<_, i64>(4)? as u64,
                libraries_built: row.get::<_, i64>(5)? as u64,
                started_at: row.get(6)?,
                finished_at: row.get(7)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Store labeled functions in one transaction. Returns the number of rows written.
    pub fn insert_labeled_functions(&self, functions: &[LabeledFunction]) -> DbResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let written = insert_labeled_rows(&tx, functions)?;
        tx.commit()?;
        Ok(written)
    }

    /// Replace everything stored for `binaries` with `functions`, atomically.
    ///
    /// Functions that no longer show up in a relabeled binary do not linger.
    pub fn replace_labeled_functions(
        &self,
        binaries: &[&Path],
        functions: &[LabeledFunction],
    ) -> DbResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for binary in binaries {
            self.delete_binary(binary)?;
        }
        let written = insert_labeled_rows(&tx, functions)?;
        tx.commit()?;
        Ok(written)
    }

    /// List labeled functions ordered by binary then address, optionally for one binary.
    pub fn list_labeled_functions(&self, binary: Option<&Path>) -> DbResult<Vec<LabeledFunction>> {
        fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LabeledFunction> {
            let binary_path: String = row.get(0)?;
            let provenance: String = row.get(4)?;
            Ok(LabeledFunction {
                function: ExtractedFunction {
                    binary_path: PathBuf::from(binary_path),
                    address: row.get::<_, i64>(1)? as u64,
                    size: row.get::<_, Option<i64>>(2)?.map(|s| s as u64),
                    name: row.get(3)?,
                    provenance: Provenance::parse(&provenance)
                        .ok_or(rusqlite::Error::InvalidQuery)?,
                },
                label: Label {
                    algorithm: row.get(5)?,
                    library: row.get(6)?,
                    architecture: row.get(7)?,
                    optimization: row.get(8)?,
                    function_name: row.get(9)?,
                    is_crypto: row.get(10)?,
                },
            })
        }

        let select = r#"
            SELECT binary_path, address, size, name, provenance, algorithm, library, architecture, optimization, function_name, is_crypto
            FROM labeled_functions
        "#;

        let mut out = Vec::new();
        if let Some(bin) = binary {
            let mut stmt = self.conn.prepare(&format!(
                "{select} WHERE binary_path = ?1 ORDER BY binary_path, address, name"
            ))?;
            for row in stmt.query_map(params![bin.to_string_lossy().to_string()], map_row)? {
                out.push(row?);
            }
        } else {
            let mut stmt =
                self.conn.prepare(&format!("{select} ORDER BY binary_path, address, name"))?;
            for row in stmt.query_map([], map_row)? {
                out.push(row?);
            }
        }
        Ok(out)
    }

    /// Drop stored functions for one binary. Returns the number of rows removed.
    pub fn delete_binary(&self, binary: &Path) -> DbResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM labeled_functions WHERE binary_path = ?1",
            params![binary.to_string_lossy().to_string()],
        )?)
    }

    pub fn stats(&self) -> DbResult<CorpusStats> {
        let (functions, crypto_functions, binaries) = self.conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(is_crypto), 0), COUNT(DISTINCT binary_path)
            FROM labeled_functions
            "#,
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
        )?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT algorithm, COUNT(*)
            FROM labeled_functions
            GROUP BY algorithm
            ORDER BY algorithm
            "#,
        )?;
        let rows =
            stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?;
        let mut by_algorithm = Vec::new();
        for row in rows {
            by_algorithm.push(row?);
        }

        Ok(CorpusStats {
            functions: functions as u64,
            crypto_functions: crypto_functions as u64,
            binaries: binaries as u64,
            by_algorithm,
        })
    }
}

fn insert_labeled_rows(conn: &Connection, functions: &[LabeledFunction]) -> DbResult<usize> {
    let mut stmt = conn.prepare(
        r#"
        INSERT OR REPLACE INTO labeled_functions
            (binary_path, address, size, name, provenance, algorithm, library, architecture, optimization, function_name, is_crypto)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )?;
    let mut written = 0;
    for f in functions {
        let label = &f.label;
        written += stmt.execute(params![
            f.function.binary_path.to_string_lossy().to_string(),
            f.function.address as i64,
            f.function.size.map(|s| s as i64),
            f.function.name,
            f.function.provenance.as_str(),
            label.algorithm,
            label.library,
            label.architecture,
            label.optimization,
            label.function_name,
            label.is_crypto
        ])?;
    }
    Ok(written)
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: build_runs table
/// - 2: labeled_functions table
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS build_runs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                config_hash     TEXT,
                status          TEXT NOT NULL,
                attempted       INTEGER NOT NULL,
                succeeded       INTEGER NOT NULL,
                failed          INTEGER NOT NULL,
                libraries_built INTEGER NOT NULL,
                started_at      TEXT NOT NULL,
                finished_at     TEXT NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS labeled_functions (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                binary_path   TEXT NOT NULL,
                address       INTEGER NOT NULL,
                size          INTEGER,
                name          TEXT NOT NULL,
                provenance    TEXT NOT NULL,
                algorithm     TEXT NOT NULL,
                library       TEXT,
                architecture  TEXT,
                optimization  TEXT,
                function_name TEXT,
                is_crypto     INTEGER NOT NULL,
                UNIQUE (binary_path, address, name)
            );
            CREATE INDEX IF NOT EXISTS idx_labeled_functions_algorithm
                ON labeled_functions (algorithm);

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
