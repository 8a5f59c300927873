// ABOUTME: CLI entry point for snapdump
// ABOUTME: Parses commands, merges config file + flags into a request, and routes to dump/load

mod cli;

use clap::Parser;
use cli::{Cli, Commands, ConnArgs};
use snapdump::config::SnapdumpConfig;
use snapdump::errors::{exit_code_for, SnapdumpError};
use snapdump::request::{Cleanup, Compression, ConnParams, DumpRequest, LoadRequest, PartialSpec};
use std::path::PathBuf;
use std::str::FromStr;

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SNAPDUMP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

/// Build `ConnParams` from CLI connection flags, falling back to the config
/// document's `[source]` or `[target]` table for any field the CLI left
/// unset. `--sqlite` and the PostgreSQL flags are mutually exclusive.
fn resolve_conn_params(
    conn: &ConnArgs,
    config_conn: Option<&snapdump::config::ConnConfig>,
) -> anyhow::Result<ConnParams> {
    let sqlite = conn
        .sqlite
        .clone()
        .or_else(|| config_conn.and_then(|c| c.sqlite.clone()));
    let dbname = conn
        .dbname
        .clone()
        .or_else(|| config_conn.and_then(|c| c.dbname.clone()));

    if sqlite.is_some() && dbname.is_some() {
        return Err(SnapdumpError::InvalidRequest(
            "--sqlite and PostgreSQL connection flags are mutually exclusive".into(),
        )
        .into());
    }

    if let Some(path) = sqlite {
        return Ok(ConnParams::Sqlite { path: PathBuf::from(path) });
    }

    let dbname = dbname.ok_or_else(|| {
        SnapdumpError::InvalidRequest("one of -D/--dbname or --sqlite is required".into())
    })?;
    // clap fills in the `-H`/`-P` defaults unconditionally, so there's no way
    // to tell "flag omitted" from "flag explicitly set to the default" here;
    // the config file only wins when the CLI value still equals that default.
    Ok(ConnParams::Postgres {
        host: if conn.host == "localhost" {
            config_conn.and_then(|c| c.host.clone()).unwrap_or_else(|| conn.host.clone())
        } else {
            conn.host.clone()
        },
        port: if conn.port == 5432 {
            config_conn.and_then(|c| c.port).unwrap_or(conn.port)
        } else {
            conn.port
        },
        user: conn
            .user
            .clone()
            .or_else(|| config_conn.and_then(|c| c.user.clone()))
            .ok_or_else(|| SnapdumpError::InvalidRequest("-U/--user is required".into()))?,
        password: conn
            .password
            .clone()
            .or_else(|| config_conn.and_then(|c| c.password.clone())),
        dbname,
    })
}

fn load_config(path: &Option<String>) -> anyhow::Result<Option<SnapdumpConfig>> {
    match path {
        Some(p) => Ok(Some(SnapdumpConfig::load(std::path::Path::new(p))?)),
        None => Ok(None),
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Dump {
            conn,
            output,
            full_tables,
            partial_tables,
            compression,
            schema: _,
            no_schema,
            data: _,
            no_data,
            config,
            verbose,
        } => {
            init_tracing(verbose);
            snapdump::utils::check_required_tools()?;
            let config = load_config(&config)?;
            let conn_params = resolve_conn_params(&conn, config.as_ref().map(|c| &c.source))?;

            let mut full: Vec<String> = full_tables;
            let mut partial = indexmap::IndexMap::new();
            for raw in &partial_tables {
                let spec = PartialSpec::from_str(raw)?;
                partial.insert(spec.table, spec.sql);
            }
            if let Some(cfg) = &config {
                if full.is_empty() {
                    full = cfg.full_tables.clone();
                }
                if partial.is_empty() {
                    for entry in &cfg.partial_tables {
                        // `entry.predicate` is a bare WHERE-clause fragment
                        // (e.g. "department = 'eng'"), unlike `-p table:SQL`
                        // CLI args, whose SQL is already a full statement.
                        let sql = format!("SELECT * FROM {} WHERE {}", entry.table, entry.predicate);
                        partial.insert(entry.table.clone(), sql);
                    }
                }
            }

            let compression = Compression::from_str(&compression)?;

            let request = DumpRequest {
                conn_params,
                output_path: PathBuf::from(output),
                full_tables: full,
                partial_tables: partial,
                compression,
                include_schema: !no_schema,
                include_data: !no_data,
            };
            snapdump::dump::run(&request).await
        }
        Commands::Load {
            conn,
            input,
            cleanup,
            config,
            verbose,
        } => {
            init_tracing(verbose);
            snapdump::utils::check_required_tools()?;
            let config = load_config(&config)?;
            let conn_params = resolve_conn_params(&conn, config.as_ref().map(|c| &c.target))?;

            let cleanup = match cleanup.or_else(|| config.as_ref().and_then(|c| c.cleanup.clone())) {
                Some(mode) => Cleanup::from_str(&mode)?,
                None => Cleanup::Skip,
            };

            let request = LoadRequest {
                conn_params,
                input_path: PathBuf::from(input),
                cleanup,
            };
            snapdump::load::run(&request).await
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!("{e:#}");
        std::process::exit(exit_code_for(&e));
    }
}
