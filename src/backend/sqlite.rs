// ABOUTME: SQLite backend: rusqlite for SQL, sqlite3 CLI subprocess for schema dump
// ABOUTME: A single connection per file; BEGIN IMMEDIATE takes the write-reserved lock

use super::{Backend, ForeignKey, Row};
use crate::errors::SnapdumpError;
use crate::request::{ConnParams, Engine};
use crate::utils::{quote_ident, validate_table_name};
use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const ALLOWED_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// Canonicalize and sanity-check a SQLite file path before opening it.
///
/// Unlike the read-only introspection path elsewhere in this codebase, the
/// dump backend needs a *writable* connection so it can `BEGIN IMMEDIATE`
/// and hold the reserved write lock for the duration of the snapshot.
fn validate_sqlite_path(path: &Path) -> Result<PathBuf> {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if !ALLOWED_EXTENSIONS.contains(&ext) {
            anyhow::bail!(
                "refusing to open '{}': extension '.{}' is not one of {:?}",
                path.display(),
                ext,
                ALLOWED_EXTENSIONS
            );
        }
    }

    if path.exists() {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize '{}'", path.display()))?;
        if !canonical.is_file() {
            anyhow::bail!("'{}' is not a regular file", path.display());
        }
        Ok(canonical)
    } else {
        Ok(path.to_path_buf())
    }
}

pub struct SqliteBackend {
    path: PathBuf,
    conn: Connection,
}

fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Some(hex::encode(b)),
    }
}

impl SqliteBackend {
    pub async fn open(conn_params: &ConnParams) -> Result<Self> {
        let ConnParams::Sqlite { path } = conn_params else {
            anyhow::bail!("SqliteBackend::open called with non-sqlite connection params");
        };
        let canonical = validate_sqlite_path(path)?;
        let conn = Connection::open(&canonical)
            .map_err(|e| SnapdumpError::ConnectError(e.to_string()))?;
        Ok(SqliteBackend {
            path: canonical,
            conn,
        })
    }

    fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SnapdumpError::QueryError {
                sql: sql.to_string(),
                message: e.to_string(),
            })?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        if column_names.is_empty() {
            return Ok(Vec::new());
        }
        let rows = stmt
            .query_map([], |r| {
                let columns = column_names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| Ok((name.clone(), value_to_string(r.get_ref(i)?))))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(Row { columns })
            })
            .map_err(|e| SnapdumpError::QueryError {
                sql: sql.to_string(),
                message: e.to_string(),
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| SnapdumpError::QueryError {
                sql: sql.to_string(),
                message: e.to_string(),
            })?;
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl Backend for SqliteBackend {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("failed to acquire reserved write lock with BEGIN IMMEDIATE")?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    async fn run(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.query_rows(sql)
    }

    async fn run_many(&mut self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| SnapdumpError::QueryError {
                sql: sql.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn dump_schema(&self) -> Result<Vec<u8>> {
        let output = Command::new("sqlite3")
            .arg(&self.path)
            .arg(".schema")
            .output()
            .await
            .context("failed to spawn `sqlite3`")?;
        if !output.status.success() {
            return Err(SnapdumpError::SubprocessError {
                command: format!("sqlite3 {} .schema", self.path.display()),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }
            .into());
        }
        Ok(output.stdout)
    }

    async fn copy_to_csv(&mut self, sql: &str) -> Result<Vec<u8>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SnapdumpError::QueryError {
                sql: sql.to_string(),
                message: e.to_string(),
            })?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&column_names)?;

        let mut rows = stmt
            .query([])
            .map_err(|e| SnapdumpError::QueryError {
                sql: sql.to_string(),
                message: e.to_string(),
            })?;
        while let Some(row) = rows.next()? {
            let record: Vec<String> = (0..column_names.len())
                .map(|i| value_to_string(row.get_ref(i).unwrap()).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(writer.into_inner()?)
    }

    async fn copy_from_csv(&mut self, table: &str, data: &[u8]) -> Result<()> {
        validate_table_name(table)?;
        let mut reader = csv::ReaderBuilder::new().from_reader(data);
        let headers = reader.headers()?.clone();
        let fields = headers.iter().collect::<Vec<_>>().join(", ");
        let placeholders = vec!["?"; headers.len()].join(", ");
        let insert_sql = format!(
            "INSERT INTO {} ({fields}) VALUES ({placeholders})",
            quote_ident(table)
        );

        // The load orchestrator already holds the transaction opened by
        // `begin()` (BEGIN IMMEDIATE); starting another one here would be a
        // nested BEGIN, which SQLite rejects.
        let mut stmt = self.conn.prepare(&insert_sql)?;
        for record in reader.records() {
            let record = record?;
            let values: Vec<rusqlite::types::Value> = record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        rusqlite::types::Value::Null
                    } else {
                        rusqlite::types::Value::Text(field.to_string())
                    }
                })
                .collect();
            let params: Vec<&dyn rusqlite::ToSql> =
                values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
            stmt.execute(params.as_slice())
                .with_context(|| format!("failed to insert row into '{table}'"))?;
        }
        Ok(())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self.query_rows(
            "SELECT name FROM sqlite_master WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("name").map(str::to_string))
            .collect())
    }

    async fn list_foreign_keys(
        &mut self,
        table: &str,
        full_tables: &[String],
        recursive: bool,
    ) -> Result<Vec<ForeignKey>> {
        validate_table_name(table)?;
        let rows = self.query_rows(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))?;

        let mut out = Vec::new();
        for row in rows {
            let foreign_table = row.get("table").unwrap_or_default().to_string();
            let from = row.get("from").unwrap_or_default().to_string();
            let to = row.get("to").unwrap_or_default().to_string();

            if full_tables.iter().any(|t| t == &foreign_table) {
                continue;
            }
            let is_self_loop = foreign_table == table;
            if is_self_loop && !recursive {
                continue;
            }
            if !is_self_loop && recursive {
                continue;
            }
            out.push(ForeignKey {
                table: table.to_string(),
                column: from,
                foreign_table,
                foreign_column: to,
            });
        }
        Ok(out)
    }

    async fn recreate_database(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("failed to remove existing SQLite file"),
        }
        self.conn = Connection::open(&self.path)
            .map_err(|e| SnapdumpError::ConnectError(e.to_string()))?;
        Ok(())
    }

    async fn truncate_all(&mut self) -> Result<()> {
        let tables = self.list_tables().await?;
        for table in &tables {
            validate_table_name(table)?;
            self.conn
                .execute_batch(&format!("DELETE FROM {}", quote_ident(table)))?;
        }
        // sqlite_sequence only exists if an AUTOINCREMENT column is present.
        let _ = self.conn.execute_batch("UPDATE sqlite_sequence SET seq=0");
        Ok(())
    }
}
</content>
