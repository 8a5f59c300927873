// ABOUTME: Error taxonomy for dump/load operations
// ABOUTME: Maps each variant to the CLI exit code it should produce

use std::fmt;

/// The core error taxonomy. Orchestrators and backends return these wrapped
/// in `anyhow::Error`; the CLI downcasts to pick an exit code.
#[derive(Debug)]
pub enum SnapdumpError {
    /// Bad request shape: overlapping full/partial tables, malformed `-p`,
    /// a cleanup mode that can't apply to the given archive, conflicting
    /// engine flags.
    InvalidRequest(String),
    /// Could not open a database connection or locate a SQLite file.
    ConnectError(String),
    /// The engine rejected a statement mid-transaction.
    QueryError { sql: String, message: String },
    /// `pg_dump` / `pg_dumpall` / `sqlite3` exited non-zero.
    SubprocessError { command: String, stderr: String },
    /// A foreign-key or unique violation surfaced at COMMIT on load.
    IntegrityError(String),
    /// The operation was cancelled; rollback has already run.
    Cancelled,
}

impl SnapdumpError {
    /// Exit code the CLI should use when this error escapes to `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            SnapdumpError::InvalidRequest(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for SnapdumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapdumpError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            SnapdumpError::ConnectError(msg) => write!(f, "connection failed: {msg}"),
            SnapdumpError::QueryError { sql, message } => {
                write!(f, "query failed: {message}\n  sql: {sql}")
            }
            SnapdumpError::SubprocessError { command, stderr } => {
                write!(f, "subprocess `{command}` failed:\n{stderr}")
            }
            SnapdumpError::IntegrityError(msg) => write!(f, "integrity violation: {msg}"),
            SnapdumpError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for SnapdumpError {}

/// Inspect an `anyhow::Error` chain for a `SnapdumpError` and return the
/// exit code it implies, falling back to 1 for anything uncategorized.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<SnapdumpError>()
        .map(|e| e.exit_code())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_exit_2() {
        let err: anyhow::Error = SnapdumpError::InvalidRequest("bad".into()).into();
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn other_variants_map_to_exit_1() {
        let err: anyhow::Error = SnapdumpError::ConnectError("bad".into()).into();
        assert_eq!(exit_code_for(&err), 1);
        let err: anyhow::Error = SnapdumpError::Cancelled.into();
        assert_eq!(exit_code_for(&err), 1);
    }

    #[test]
    fn uncategorized_error_defaults_to_exit_1() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&err), 1);
    }
}
</content>
