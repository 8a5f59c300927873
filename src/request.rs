// ABOUTME: Request types that cross the boundary from CLI/config into the core
// ABOUTME: DumpRequest/LoadRequest validation enforces the full/partial disjointness invariant

use crate::errors::SnapdumpError;
use anyhow::Result;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Which engine a connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Postgres,
    Sqlite,
}

/// Connection parameters for one engine. `Postgres` carries the usual
/// host/port/user shape; `Sqlite` is just a file path.
#[derive(Debug, Clone)]
pub enum ConnParams {
    Postgres {
        host: String,
        port: u16,
        user: String,
        password: Option<String>,
        dbname: String,
    },
    Sqlite { path: PathBuf },
}

impl ConnParams {
    pub fn engine(&self) -> Engine {
        match self {
            ConnParams::Postgres { .. } => Engine::Postgres,
            ConnParams::Sqlite { .. } => Engine::Sqlite,
        }
    }
}

/// Archive compression method. `Zstd` stands in for the spec's `lzma`
/// option — the `zip` crate has no LZMA encoder, see SPEC_FULL.md §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Stored,
    Deflated,
    Bzip2,
    Zstd,
}

impl FromStr for Compression {
    type Err = SnapdumpError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "stored" => Ok(Compression::Stored),
            "deflated" => Ok(Compression::Deflated),
            "bzip2" => Ok(Compression::Bzip2),
            "lzma" => Ok(Compression::Zstd),
            other => Err(SnapdumpError::InvalidRequest(format!(
                "unknown compression method '{other}' (expected stored, deflated, bzip2, or lzma)"
            ))),
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Deflated
    }
}

/// Target cleanup strategy for a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    Recreate,
    Truncate,
    Skip,
}

impl FromStr for Cleanup {
    type Err = SnapdumpError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "recreate" => Ok(Cleanup::Recreate),
            "truncate" => Ok(Cleanup::Truncate),
            other => Err(SnapdumpError::InvalidRequest(format!(
                "unknown cleanup mode '{other}' (expected recreate or truncate)"
            ))),
        }
    }
}

/// A single `-p table:SQL` argument, parsed and validated.
///
/// Per SPEC_FULL.md §6, the separator is the *first* `:` in the argument;
/// both sides are trimmed. An empty left side is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSpec {
    pub table: String,
    pub sql: String,
}

impl FromStr for PartialSpec {
    type Err = SnapdumpError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (table, sql) = s.split_once(':').ok_or_else(|| {
            SnapdumpError::InvalidRequest(format!(
                "malformed -p argument '{s}': expected 'table:SQL'"
            ))
        })?;
        let table = table.trim();
        let sql = sql.trim();
        if table.is_empty() {
            return Err(SnapdumpError::InvalidRequest(format!(
                "malformed -p argument '{s}': table name is empty"
            )));
        }
        Ok(PartialSpec {
            table: table.to_string(),
            sql: sql.to_string(),
        })
    }
}

/// Fully validated description of one dump operation.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    pub conn_params: ConnParams,
    pub output_path: PathBuf,
    pub full_tables: Vec<String>,
    pub partial_tables: IndexMap<String, String>,
    pub compression: Compression,
    pub include_schema: bool,
    pub include_data: bool,
}

impl DumpRequest {
    /// Validate the full/partial disjointness invariant (SPEC_FULL.md §3).
    pub fn validate(&self) -> Result<()> {
        for table in &self.full_tables {
            if self.partial_tables.contains_key(table) {
                return Err(SnapdumpError::InvalidRequest(format!(
                    "table '{table}' appears in both full_tables and partial_tables"
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Fully validated description of one load operation.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub conn_params: ConnParams,
    pub input_path: PathBuf,
    pub cleanup: Cleanup,
}

impl LoadRequest {
    /// `skip` is mandatory when the archive has no schema file; the caller
    /// passes that fact in since it requires peeking at the archive.
    pub fn validate(&self, archive_has_schema: bool) -> Result<()> {
        if !archive_has_schema && self.cleanup != Cleanup::Skip {
            return Err(SnapdumpError::InvalidRequest(
                "archive has no schema.sql; cleanup mode must be 'skip'".into(),
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_spec_splits_on_first_colon() {
        let spec: PartialSpec = "employees:SELECT * FROM employees WHERE id = 1"
            .parse()
            .unwrap();
        assert_eq!(spec.table, "employees");
        assert_eq!(spec.sql, "SELECT * FROM employees WHERE id = 1");
    }

    #[test]
    fn partial_spec_trims_both_sides() {
        let spec: PartialSpec = "  employees  :  SELECT 1  ".parse().unwrap();
        assert_eq!(spec.table, "employees");
        assert_eq!(spec.sql, "SELECT 1");
    }

    #[test]
    fn partial_spec_keeps_extra_colons_on_sql_side() {
        let spec: PartialSpec = "tickets:SELECT * FROM t WHERE ts > '12:00:00'"
            .parse()
            .unwrap();
        assert_eq!(spec.table, "tickets");
        assert_eq!(spec.sql, "SELECT * FROM t WHERE ts > '12:00:00'");
    }

    #[test]
    fn partial_spec_rejects_missing_colon() {
        let result: std::result::Result<PartialSpec, _> = "employees".parse();
        assert!(result.is_err());
    }

    #[test]
    fn partial_spec_rejects_empty_table() {
        let result: std::result::Result<PartialSpec, _> = ":SELECT 1".parse();
        assert!(result.is_err());
    }

    #[test]
    fn dump_request_rejects_overlapping_full_and_partial() {
        let mut partial_tables = IndexMap::new();
        partial_tables.insert("employees".to_string(), "SELECT 1".to_string());
        let req = DumpRequest {
            conn_params: ConnParams::Sqlite { path: "x.db".into() },
            output_path: "out.zip".into(),
            full_tables: vec!["employees".to_string()],
            partial_tables,
            compression: Compression::default(),
            include_schema: true,
            include_data: true,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn load_request_requires_skip_when_schema_absent() {
        let req = LoadRequest {
            conn_params: ConnParams::Sqlite { path: "x.db".into() },
            input_path: "in.zip".into(),
            cleanup: Cleanup::Recreate,
        };
        assert!(req.validate(false).is_err());
        assert!(req.validate(true).is_ok());
    }

    #[test]
    fn compression_parses_lzma_as_zstd() {
        assert_eq!("lzma".parse::<Compression>().unwrap(), Compression::Zstd);
    }
}
</content>
