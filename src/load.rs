// ABOUTME: Load Orchestrator — replays an archive onto a live database
// ABOUTME: open archive -> cleanup -> begin -> schema/sequences (search_path saved, PostgreSQL only) -> per-table CSV -> commit

use crate::archive;
use crate::backend::Backend;
use crate::errors::SnapdumpError;
use crate::registry;
use crate::request::{Cleanup, Engine, LoadRequest};
use anyhow::{Context, Result};

pub async fn run(request: &LoadRequest) -> Result<()> {
    let mut reader = archive::open_reader(&request.input_path)?;
    request.validate(reader.has_schema())?;

    let mut backend = registry::open_backend(&request.conn_params).await?;

    match request.cleanup {
        Cleanup::Recreate => {
            tracing::info!("recreating target database");
            backend.recreate_database().await?;
        }
        Cleanup::Truncate => {
            tracing::info!("truncating target tables");
            backend.truncate_all().await?;
        }
        Cleanup::Skip => {}
    }

    backend.begin().await.context("failed to start load transaction")?;

    match run_inner(backend.as_mut(), &mut reader).await {
        Ok(()) => backend.commit().await.map_err(|e| {
            // A failure at COMMIT is almost always a deferred foreign-key or
            // unique-constraint violation surfacing once the engine checks
            // it, not an ordinary query error.
            SnapdumpError::IntegrityError(e.to_string()).into()
        }),
        Err(e) => {
            let _ = backend.rollback().await;
            Err(e)
        }
    }
}

async fn run_inner(
    backend: &mut dyn Backend,
    reader: &mut archive::ArchiveReader<std::io::BufReader<std::fs::File>>,
) -> Result<()> {
    // PostgreSQL's schema/sequence replay scripts assume whatever
    // `search_path` was in effect when `pg_dump` ran; save and restore it so
    // replaying a dump doesn't leak a changed path into the rest of the load.
    let saved_search_path = if backend.engine() == Engine::Postgres {
        let rows = backend.run("SHOW search_path").await?;
        rows.first().and_then(|r| r.get("search_path")).map(str::to_string)
    } else {
        None
    };

    if let Some(schema) = reader.read_schema()? {
        tracing::info!("replaying schema");
        backend.run_many(&String::from_utf8_lossy(&schema)).await?;
    }
    if let Some(sequences) = reader.read_sequences()? {
        tracing::info!("replaying sequences");
        backend.run_many(&String::from_utf8_lossy(&sequences)).await?;
    }

    if let Some(search_path) = saved_search_path {
        backend
            .run(&format!("SET search_path = {search_path}"))
            .await?;
    }

    for table in reader.data_tables() {
        tracing::info!(table = %table, "loading table");
        let csv = reader.read_table_csv(&table)?;
        backend.copy_from_csv(&table, &csv).await?;
    }

    Ok(())
}
