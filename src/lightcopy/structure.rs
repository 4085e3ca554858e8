// dblocalsync/src/lightcopy/structure.rs
use anyhow::{Context, Result};

use crate::engine::{Engine, EngineConnection, TableStructure};

// Engine-internal system tables and temporary objects are never the main
// table.
const SYSTEM_TABLE_PREFIX: &str = "MSys";
const TEMP_TABLE_PREFIX: &str = "~";

/// Reads the main table's structure from a source database: the first
/// user table, with its columns in native order. Returns `None` when the
/// database has no user table at all.
pub fn analyze_table_structure(
    engine: &dyn Engine,
    source_path: &str,
    password: &str,
) -> Result<Option<TableStructure>> {
    let mut conn = engine
        .connect(source_path, password)
        .with_context(|| format!("Failed to connect to source database {source_path}"))?;

    let Some(table_name) = find_main_table(conn.as_mut())? else {
        return Ok(None);
    };

    let columns = conn
        .columns(&table_name)
        .with_context(|| format!("Failed to enumerate columns of table {table_name}"))?;

    Ok(Some(TableStructure {
        table_name,
        columns,
    }))
}

/// First table that is neither an engine-internal system table nor a
/// temporary object.
pub(crate) fn find_main_table(conn: &mut dyn EngineConnection) -> Result<Option<String>> {
    let tables = conn.table_names().context("Failed to enumerate tables")?;
    Ok(tables.into_iter().find(|name| {
        !name.starts_with(SYSTEM_TABLE_PREFIX) && !name.starts_with(TEMP_TABLE_PREFIX)
    }))
}
