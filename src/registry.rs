// ABOUTME: Engine Registry — maps a connection's engine to the backend constructor that opens it
// ABOUTME: the single place new engines are wired in, per the source's BACKENDS/get_backend() pattern

use crate::backend::postgres::PostgresBackend;
use crate::backend::sqlite::SqliteBackend;
use crate::backend::Backend;
use crate::request::ConnParams;
use anyhow::Result;

/// Open the backend matching `conn_params`'s engine. Adding a third engine
/// means adding one arm here and nowhere else.
pub async fn open_backend(conn_params: &ConnParams) -> Result<Box<dyn Backend>> {
    match conn_params {
        ConnParams::Postgres { .. } => {
            Ok(Box::new(PostgresBackend::open(conn_params).await?))
        }
        ConnParams::Sqlite { .. } => Ok(Box::new(SqliteBackend::open(conn_params).await?)),
    }
}
