// dblocalsync/src/lightcopy/replicate.rs
use anyhow::{Context, Result};

use crate::engine::{ColumnDescriptor, Engine, TableStructure};

const DEFAULT_TEXT_WIDTH: i32 = 255;

/// Maps a driver-reported type name to the engine's DDL vocabulary.
/// Text-family types are sized from the reported column size; anything
/// unrecognized degrades to a default-width text column instead of failing.
pub(crate) fn map_driver_type(driver_type: &str, size: Option<i32>) -> String {
    match driver_type.to_uppercase().as_str() {
        "VARCHAR" | "CHAR" | "TEXT" => match size {
            Some(n) if n > 0 => format!("TEXT({n})"),
            _ => format!("TEXT({DEFAULT_TEXT_WIDTH})"),
        },
        "COUNTER" => "AUTOINCREMENT".to_string(),
        "INTEGER" => "INTEGER".to_string(),
        "LONG" => "LONG".to_string(),
        "SINGLE" => "SINGLE".to_string(),
        "DOUBLE" => "DOUBLE".to_string(),
        "CURRENCY" => "CURRENCY".to_string(),
        "DATETIME" => "DATETIME".to_string(),
        "BIT" => "YESNO".to_string(),
        "BYTE" => "BYTE".to_string(),
        "LONGBINARY" => "LONGBINARY".to_string(),
        "LONGTEXT" => "MEMO".to_string(),
        _ => format!("TEXT({DEFAULT_TEXT_WIDTH})"),
    }
}

fn column_definition(col: &ColumnDescriptor) -> String {
    let mut def = format!(
        "[{}] {}",
        col.name,
        map_driver_type(&col.driver_type, col.size)
    );
    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    def
}

/// Identifiers are bracket-quoted to tolerate embedded spaces and reserved
/// words.
pub(crate) fn create_table_sql(structure: &TableStructure) -> String {
    let defs: Vec<String> = structure.columns.iter().map(column_definition).collect();
    format!(
        "CREATE TABLE [{}] ({})",
        structure.table_name,
        defs.join(", ")
    )
}

/// Replicates the analyzed table structure into a freshly created, empty
/// target database.
pub fn create_table(
    engine: &dyn Engine,
    target_path: &str,
    password: &str,
    structure: &TableStructure,
) -> Result<()> {
    let mut conn = engine
        .connect(target_path, password)
        .with_context(|| format!("Failed to connect to target database {target_path}"))?;

    let sql = create_table_sql(structure);
    conn.execute(&sql)
        .with_context(|| format!("Failed to create table {}", structure.table_name))?;
    conn.commit().context("Failed to commit table creation")?;
    Ok(())
}
