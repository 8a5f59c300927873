// ABOUTME: PostgreSQL backend: tokio-postgres for SQL, subprocess pg_dump/pg_dumpall for schema
// ABOUTME: Maintains two logical connections (default REPEATABLE READ, maintenance AUTOCOMMIT)

use super::{Backend, ForeignKey, Row};
use crate::errors::SnapdumpError;
use crate::request::{ConnParams, Engine};
use crate::utils::{self, quote_ident, validate_connection_string, validate_postgres_identifier};
use anyhow::{Context, Result};
use futures::{pin_mut, StreamExt};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio::process::Command;
use tokio_postgres::Client;

const SELECTABLE_TABLES_SQL: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
     AND table_schema NOT LIKE 'pg_toast%' ORDER BY table_name";

const SEQUENCES_SQL: &str = "SELECT relname FROM pg_class WHERE relkind = 'S' ORDER BY relname";

/// Foreign keys owned by a single table, resolved from `information_schema`
/// rather than `pg_constraint` directly — this sidesteps the ACL-filtering
/// surprises the distilled spec calls out for the standard view while
/// staying portable across PostgreSQL versions.
const TABLE_FOREIGN_KEYS_SQL: &str = "
SELECT
    kcu.column_name       AS column_name,
    ccu.table_name        AS foreign_table_name,
    ccu.column_name       AS foreign_column_name
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
    ON tc.constraint_name = kcu.constraint_name
    AND tc.table_schema = kcu.table_schema
JOIN information_schema.constraint_column_usage ccu
    ON tc.constraint_name = ccu.constraint_name
    AND tc.table_schema = ccu.table_schema
WHERE tc.constraint_type = 'FOREIGN KEY'
    AND tc.table_name = $1
ORDER BY kcu.column_name";

#[derive(Debug, Clone)]
struct PgParams {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    dbname: String,
}

impl PgParams {
    fn url(&self, dbname: &str) -> String {
        let mut url = format!("postgresql://{}", self.user);
        if let Some(password) = &self.password {
            url.push(':');
            url.push_str(password);
        }
        url.push('@');
        url.push_str(&self.host);
        url.push(':');
        url.push_str(&self.port.to_string());
        url.push('/');
        url.push_str(dbname);
        url
    }
}

pub struct PostgresBackend {
    params: PgParams,
    default: Client,
    maintenance: Option<Client>,
}

async fn connect(url: &str) -> Result<Client> {
    validate_connection_string(url)?;
    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .context("failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(tls_connector);

    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .map_err(|e| SnapdumpError::ConnectError(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("postgres connection error: {}", e);
        }
    });

    Ok(client)
}

impl PostgresBackend {
    pub async fn open(conn_params: &ConnParams) -> Result<Self> {
        let ConnParams::Postgres {
            host,
            port,
            user,
            password,
            dbname,
        } = conn_params
        else {
            anyhow::bail!("PostgresBackend::open called with non-postgres connection params");
        };
        let params = PgParams {
            host: host.clone(),
            port: *port,
            user: user.clone(),
            password: password.clone(),
            dbname: dbname.clone(),
        };

        let default = utils::retry_with_backoff(
            || connect(&params.url(&params.dbname)),
            3,
            Duration::from_secs(1),
        )
        .await
        .context("failed to connect to source/target database after retries")?;

        Ok(PostgresBackend {
            params,
            default,
            maintenance: None,
        })
    }

    async fn maintenance_client(&mut self) -> Result<&Client> {
        if self.maintenance.is_none() {
            let client = connect(&self.params.url("postgres")).await?;
            self.maintenance = Some(client);
        }
        Ok(self.maintenance.as_ref().unwrap())
    }

    fn pg_dump_environment(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = std::env::vars().collect();
        if let Some(password) = &self.params.password {
            env.push(("PGPASSWORD".to_string(), password.clone()));
        }
        env
    }

    async fn run_subprocess(&self, command: &str, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(command)
            .args(args)
            .envs(self.pg_dump_environment())
            .output()
            .await
            .with_context(|| format!("failed to spawn `{command}`"))?;

        if !output.status.success() {
            return Err(SnapdumpError::SubprocessError {
                command: format!("{command} {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }
            .into());
        }
        Ok(output.stdout)
    }

    async fn selectable_tables(&self) -> Result<Vec<String>> {
        let rows = self.default.query(SELECTABLE_TABLES_SQL, &[]).await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn sequences(&self) -> Result<Vec<String>> {
        let rows = self.default.query(SEQUENCES_SQL, &[]).await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    fn row_from_pg(pg_row: &tokio_postgres::Row) -> Row {
        let columns = pg_row
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let value: Option<String> = pg_row.try_get::<_, Option<String>>(i).unwrap_or(None);
                (col.name().to_string(), value)
            })
            .collect();
        Row { columns }
    }
}

#[async_trait::async_trait]
impl Backend for PostgresBackend {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    async fn begin(&mut self) -> Result<()> {
        self.default
            .batch_execute("BEGIN ISOLATION LEVEL REPEATABLE READ")
            .await
            .context("failed to begin REPEATABLE READ transaction")?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.default.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.default.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn run(&mut self, sql: &str) -> Result<Vec<Row>> {
        match self.default.query(sql, &[]).await {
            Ok(rows) => Ok(rows.iter().map(Self::row_from_pg).collect()),
            Err(e) => {
                // PostgreSQL's "no results to fetch" after a non-returning
                // statement is swallowed and returns empty (SPEC_FULL.md §4.1).
                if e.to_string().contains("no results to fetch") {
                    Ok(Vec::new())
                } else {
                    Err(SnapdumpError::QueryError {
                        sql: sql.to_string(),
                        message: e.to_string(),
                    }
                    .into())
                }
            }
        }
    }

    async fn run_many(&mut self, sql: &str) -> Result<()> {
        self.default
            .batch_execute(sql)
            .await
            .map_err(|e| SnapdumpError::QueryError {
                sql: sql.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn dump_schema(&self) -> Result<Vec<u8>> {
        let tables = self.selectable_tables().await?;
        let mut args = vec![
            "-h".to_string(),
            self.params.host.clone(),
            "-p".to_string(),
            self.params.port.to_string(),
            "-U".to_string(),
            self.params.user.clone(),
            "-d".to_string(),
            self.params.dbname.clone(),
            "-s".to_string(), // schema only
            "-x".to_string(), // no privileges
        ];
        for table in &tables {
            args.push("-t".to_string());
            args.push(table.clone());
        }
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_subprocess("pg_dump", &args_ref).await
    }

    async fn dump_sequences(&self) -> Result<Vec<u8>> {
        let sequences = self.sequences().await?;
        if sequences.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec![
            "-h".to_string(),
            self.params.host.clone(),
            "-p".to_string(),
            self.params.port.to_string(),
            "-U".to_string(),
            self.params.user.clone(),
            "-d".to_string(),
            self.params.dbname.clone(),
            "-a".to_string(), // data only
        ];
        for seq in &sequences {
            args.push("-t".to_string());
            args.push(seq.clone());
        }
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_subprocess("pg_dump", &args_ref).await
    }

    async fn copy_to_csv(&mut self, sql: &str) -> Result<Vec<u8>> {
        let copy_sql = format!("COPY ({sql}) TO STDOUT WITH CSV HEADER");
        let stream = self
            .default
            .copy_out(&copy_sql)
            .await
            .map_err(|e| SnapdumpError::QueryError {
                sql: copy_sql.clone(),
                message: e.to_string(),
            })?;
        pin_mut!(stream);
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SnapdumpError::QueryError {
                sql: copy_sql.clone(),
                message: e.to_string(),
            })?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    async fn copy_from_csv(&mut self, table: &str, data: &[u8]) -> Result<()> {
        validate_postgres_identifier(table)?;
        let copy_sql = format!("COPY {} FROM STDIN WITH CSV HEADER", quote_ident(table));
        let sink = self
            .default
            .copy_in(&copy_sql)
            .await
            .map_err(|e| SnapdumpError::QueryError {
                sql: copy_sql.clone(),
                message: e.to_string(),
            })?;
        pin_mut!(sink);
        use futures::SinkExt;
        sink.send(bytes::Bytes::copy_from_slice(data))
            .await
            .map_err(|e| SnapdumpError::QueryError {
                sql: copy_sql.clone(),
                message: e.to_string(),
            })?;
        sink.close().await.map_err(|e| SnapdumpError::QueryError {
            sql: copy_sql,
            message: e.to_string(),
        })?;
        Ok(())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        self.selectable_tables().await
    }

    async fn list_foreign_keys(
        &mut self,
        table: &str,
        full_tables: &[String],
        recursive: bool,
    ) -> Result<Vec<ForeignKey>> {
        validate_postgres_identifier(table)?;
        let rows = self
            .default
            .query(TABLE_FOREIGN_KEYS_SQL, &[&table])
            .await
            .map_err(|e| SnapdumpError::QueryError {
                sql: TABLE_FOREIGN_KEYS_SQL.to_string(),
                message: e.to_string(),
            })?;

        let mut out = Vec::new();
        for row in rows {
            let column: String = row.get(0);
            let foreign_table: String = row.get(1);
            let foreign_column: String = row.get(2);

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
                column,
                foreign_table,
                foreign_column,
            });
        }
        Ok(out)
    }

    async fn recreate_database(&mut self) -> Result<()> {
        validate_postgres_identifier(&self.params.dbname)?;
        let dbname = self.params.dbname.clone();
        let owner = self.params.user.clone();

        let maintenance = self.maintenance_client().await?;
        maintenance
            .execute(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1",
                &[&dbname],
            )
            .await
            .context("failed to terminate existing connections")?;
        maintenance
            .batch_execute(&format!("DROP DATABASE IF EXISTS {}", quote_ident(&dbname)))
            .await
            .context("failed to drop database")?;
        maintenance
            .batch_execute(&format!(
                "CREATE DATABASE {} WITH OWNER {}",
                quote_ident(&dbname),
                quote_ident(&owner)
            ))
            .await
            .context("failed to create database")?;

        // Cached handles referred to the now-dropped database; reconnect.
        self.default = connect(&self.params.url(&dbname)).await?;
        Ok(())
    }

    async fn truncate_all(&mut self) -> Result<()> {
        let tables = self.list_tables().await?;
        if tables.is_empty() {
            return Ok(());
        }
        for table in &tables {
            validate_postgres_identifier(table)?;
        }
        let quoted = tables
            .iter()
            .map(|t| quote_ident(t))
            .collect::<Vec<_>>()
            .join(", ");
        self.run_many(&format!("TRUNCATE {quoted} RESTART IDENTITY CASCADE"))
            .await
    }
}
</content>
