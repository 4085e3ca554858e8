// dblocalsync/src/lightcopy/sample.rs
use anyhow::{Context, Result};

use crate::engine::{Engine, Record, TableStructure};

pub const SAMPLE_LIMIT: usize = 5;

// Candidate recency columns, tried in order. The first one present in the
// source table drives the ORDER BY; none matching (or none yielding rows)
// falls back to an unordered sample.
const ORDER_CANDIDATES: &[&str] = &[
    "ID",
    "Id",
    "id",
    "Fecha",
    "fecha",
    "FechaCreacion",
    "Timestamp",
];

/// Copies up to `limit` most recent rows from the source's main table into
/// the replicated table. Per-row insert failures are logged and skipped;
/// an empty source is success with zero rows copied. Returns the number of
/// rows actually inserted.
pub fn copy_latest_records(
    engine: &dyn Engine,
    source_path: &str,
    target_path: &str,
    password: &str,
    structure: &TableStructure,
    limit: usize,
) -> Result<usize> {
    let mut source = engine
        .connect(source_path, password)
        .with_context(|| format!("Failed to connect to source database {source_path}"))?;

    // Column names are re-read from the live table rather than taken from
    // `structure`, in case the source drifted between analysis and sampling.
    let table = &structure.table_name;
    let columns = source
        .columns(table)
        .with_context(|| format!("Failed to enumerate columns of table {table}"))?;
    let column_names: Vec<String> = columns.into_iter().map(|c| c.name).collect();

    let mut records: Vec<Record> = Vec::new();
    for candidate in ORDER_CANDIDATES {
        if !column_names.iter().any(|c| c == candidate) {
            continue;
        }
        let sql = format!("SELECT TOP {limit} * FROM [{table}] ORDER BY [{candidate}] DESC");
        match source.query(&sql) {
            Ok(rows) if !rows.is_empty() => {
                records = rows;
                break;
            }
            // Column unusable for ordering, or no rows; try the next one.
            Ok(_) | Err(_) => continue,
        }
    }

    if records.is_empty() {
        let sql = format!("SELECT TOP {limit} * FROM [{table}]");
        if let Ok(rows) = source.query(&sql) {
            records = rows;
        }
    }
    drop(source);

    if records.is_empty() {
        println!("  ✓ No records to copy");
        return Ok(0);
    }

    let mut target = engine
        .connect(target_path, password)
        .with_context(|| format!("Failed to connect to target database {target_path}"))?;

    let quoted: Vec<String> = column_names.iter().map(|c| format!("[{c}]")).collect();
    let placeholders = vec!["?"; column_names.len()].join(", ");
    let insert_sql = format!(
        "INSERT INTO [{table}] ({}) VALUES ({placeholders})",
        quoted.join(", ")
    );

    let mut inserted = 0usize;
    for record in &records {
        match target.execute_with_params(&insert_sql, record) {
            Ok(()) => inserted += 1,
            Err(e) => eprintln!("    ⚠ Skipping record that failed to insert: {e:#}"),
        }
    }
    target.commit().context("Failed to commit sampled records")?;

    Ok(inserted)
}
