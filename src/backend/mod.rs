// ABOUTME: Capability interface shared by the PostgreSQL and SQLite drivers
// ABOUTME: One trait, two implementations, per the engine-registry re-architecture

pub mod postgres;
pub mod sqlite;

use crate::request::Engine;
use anyhow::Result;
use async_trait::async_trait;

/// A foreign key edge discovered by introspecting the source database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

/// One row of a result set: ordered column name / value pairs. Values are
/// carried as their textual representation — CSV serialization doesn't need
/// anything richer, and it keeps the trait engine-agnostic.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub columns: Vec<(String, Option<String>)>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(c, _)| c == name)
            .and_then(|(_, v)| v.as_deref())
    }
}

/// Engine-specific adapter: connect, execute, stream CSV in/out, run the
/// engine's native schema dumper, drop/create/truncate, introspect foreign
/// keys (SPEC_FULL.md §4.1).
///
/// Implementations own exactly one *default* connection; PostgreSQL opens a
/// second *maintenance* connection lazily for drop/create/terminate.
#[async_trait]
pub trait Backend: Send {
    fn engine(&self) -> Engine;

    /// Begin the dump/load transaction: REPEATABLE READ on PostgreSQL,
    /// `BEGIN IMMEDIATE` on SQLite.
    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;

    /// Execute a single statement on the *default* connection.
    async fn run(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Execute a multi-statement script (schema/sequence replay).
    async fn run_many(&mut self, sql: &str) -> Result<()>;

    /// Invoke the engine's native schema dumper in a subprocess.
    async fn dump_schema(&self) -> Result<Vec<u8>>;

    /// PostgreSQL-only; other engines return an empty script.
    async fn dump_sequences(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Run `sql` on the dump transaction and serialize the result as CSV
    /// with a header row. NULLs are the empty field.
    async fn copy_to_csv(&mut self, sql: &str) -> Result<Vec<u8>>;

    /// Load CSV `data` into `table`.
    async fn copy_from_csv(&mut self, table: &str, data: &[u8]) -> Result<()>;

    /// All user tables, excluding system schemas.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Foreign keys owned by `table`. When `recursive` is true, only
    /// self-referencing edges (`table == foreign_table`) are returned;
    /// otherwise self-loops are excluded. Edges whose foreign table is in
    /// `full_tables` are never returned — those tables already export
    /// everything (SPEC_FULL.md §4.3 edge policy).
    async fn list_foreign_keys(
        &mut self,
        table: &str,
        full_tables: &[String],
        recursive: bool,
    ) -> Result<Vec<ForeignKey>>;

    async fn recreate_database(&mut self) -> Result<()>;

    /// PostgreSQL: `TRUNCATE ... RESTART IDENTITY CASCADE` across all user
    /// tables. SQLite: `DELETE FROM` each table, then reset `sqlite_sequence`.
    async fn truncate_all(&mut self) -> Result<()>;
}
</content>
