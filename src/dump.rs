// ABOUTME: Dump Orchestrator — drives one snapshot from a live database to an archive file
// ABOUTME: validate -> begin -> schema/sequences -> resolve -> per-table CSV -> commit, roll back on any failure

use crate::archive::ArchiveWriter;
use crate::backend::Backend;
use crate::registry;
use crate::request::DumpRequest;
use crate::resolver;
use anyhow::{Context, Result};
use std::io::Cursor;

/// Run a dump end to end. On any failure after `begin`, the transaction is
/// rolled back and the (incomplete) output file is removed — a dump never
/// leaves a partial archive behind to be mistaken for a complete one.
pub async fn run(request: &DumpRequest) -> Result<()> {
    request.validate()?;

    let mut backend = registry::open_backend(&request.conn_params).await?;
    backend.begin().await.context("failed to start dump transaction")?;

    match run_inner(backend.as_mut(), request).await {
        Ok(()) => {
            backend.commit().await.context("failed to commit dump transaction")?;
            Ok(())
        }
        Err(e) => {
            let _ = backend.rollback().await;
            let _ = std::fs::remove_file(&request.output_path);
            Err(e)
        }
    }
}

async fn run_inner(backend: &mut dyn Backend, request: &DumpRequest) -> Result<()> {
    let buf = Cursor::new(Vec::new());
    let mut writer = ArchiveWriter::new(buf, request.compression);

    if request.include_schema {
        tracing::info!("dumping schema");
        let schema = backend.dump_schema().await?;
        writer.write_schema(&schema)?;
        let sequences = backend.dump_sequences().await?;
        if !sequences.is_empty() {
            writer.write_sequences(&sequences)?;
        }
    }

    if request.include_data {
        let expanded = resolver::resolve(backend, &request.full_tables, &request.partial_tables).await?;

        for table in &request.full_tables {
            tracing::info!(table = %table, "exporting full table");
            let csv = backend.copy_to_csv(&format!("SELECT * FROM {table}")).await?;
            writer.write_table_csv(table, &csv)?;
        }
        // Discovery order depends on FK introspection order, which isn't
        // guaranteed stable across runs (SPEC_FULL.md §4.2/§4.3 require
        // expanded tables sorted by name for byte-for-byte reproducibility).
        let mut expanded_tables: Vec<&String> = expanded.keys().collect();
        expanded_tables.sort();
        for table in expanded_tables {
            tracing::info!(table = %table, "exporting expanded partial table");
            let sql = &expanded[table];
            let csv = backend.copy_to_csv(sql).await?;
            writer.write_table_csv(table, &csv)?;
        }
    }

    let buf = writer.finish()?;
    std::fs::write(&request.output_path, buf.into_inner())
        .with_context(|| format!("failed to write archive '{}'", request.output_path.display()))?;
    Ok(())
}
