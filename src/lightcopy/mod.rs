// dblocalsync/src/lightcopy/mod.rs
pub(crate) mod replicate;
pub(crate) mod sample;
pub(crate) mod structure;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::{AppConfig, file_name_of};
use crate::engine::{Engine, TableStructure};

/// Rebuilds a local database as a light replica of the remote one: the
/// main table's structure plus its most recent rows, nothing else.
pub fn setup_light_database(
    engine: &dyn Engine,
    config: &AppConfig,
    remote_path: &str,
    local_path: &str,
) -> Result<()> {
    println!("  📧 Setting up light copy...");

    if Path::new(local_path).exists() {
        println!("  🗑 Removing stale local copy...");
        fs::remove_file(local_path)
            .with_context(|| format!("Failed to remove stale local database {local_path}"))?;
    }

    let structure = create_database_from_scratch(engine, config, remote_path, local_path)?;

    let inserted = sample::copy_latest_records(
        engine,
        remote_path,
        local_path,
        &config.db_password,
        &structure,
        sample::SAMPLE_LIMIT,
    )?;
    if inserted > 0 {
        println!("  ✓ Inserted {inserted} record(s)");
    }
    Ok(())
}

/// Creates an empty database at `local_path`, protects it with the shared
/// password, and replicates the remote main table's structure into it.
/// Three sequential exclusive open/close cycles on the new file: creation,
/// password assignment, table creation. Each must fully release its handle
/// before the next begins.
fn create_database_from_scratch(
    engine: &dyn Engine,
    config: &AppConfig,
    remote_path: &str,
    local_path: &str,
) -> Result<TableStructure> {
    println!(
        "  🔨 Creating database {} from scratch...",
        file_name_of(local_path)
    );

    {
        let mut session = engine
            .open_session()
            .context("Failed to open automation session")?;
        session
            .create_database(local_path)
            .with_context(|| format!("Failed to create empty database {local_path}"))?;
    }

    if !config.db_password.is_empty() {
        println!("  🔒 Applying password...");
        let mut session = engine
            .open_session()
            .context("Failed to open automation session")?;
        session
            .open_database(local_path, true, "")
            .with_context(|| format!("Failed to open new database {local_path}"))?;
        session
            .set_database_password("", &config.db_password)
            .context("Failed to set database password")?;
        session
            .close_database()
            .context("Failed to close new database")?;
    }

    let structure = structure::analyze_table_structure(engine, remote_path, &config.db_password)
        .context("Failed to analyze remote table structure")?
        .with_context(|| format!("No user table found in {remote_path}; nothing to replicate"))?;

    replicate::create_table(engine, local_path, &config.db_password, &structure)?;

    println!("  ✓ Database {} created", file_name_of(local_path));
    Ok(structure)
}
