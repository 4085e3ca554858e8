// dblocalsync/src/links/rewrite.rs
use anyhow::{Context, Result};

use crate::config::{AppConfig, path_exists};
use crate::engine::Engine;

/// Per-table counts from one relink pass over a database.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RelinkReport {
    /// Tables carrying a connection string.
    pub linked: usize,
    pub rewritten: usize,
    pub failed: usize,
    /// Linked tables left untouched: no DATABASE= entry, or the mapped
    /// local file does not exist yet.
    pub skipped: usize,
}

/// Extracts the value of the (case-insensitive) `DATABASE=` entry from a
/// semicolon-delimited connection string.
pub(crate) fn database_path_from_connect(connect: &str) -> Option<&str> {
    connect.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if key.eq_ignore_ascii_case("DATABASE") {
            Some(value)
        } else {
            None
        }
    })
}

/// Rewrites every linked table in `local_db_path` to reference the local
/// copy of its external database. A table is only rewritten when its mapped
/// local file already exists on disk.
///
/// Success means the open/iterate/close sequence completed; per-table
/// rewrite failures are reported in the counts, not the result. Kept that
/// way on purpose, callers rely on it.
pub fn relink_database(
    engine: &dyn Engine,
    config: &AppConfig,
    local_db_path: &str,
) -> Result<RelinkReport> {
    let mut session = engine
        .open_session()
        .context("Failed to open automation session")?;
    session
        .open_database(local_db_path, false, &config.db_password)
        .with_context(|| format!("Failed to open database {local_db_path}"))?;

    let defs = session
        .table_defs()
        .context("Failed to enumerate table definitions")?;

    let mut report = RelinkReport::default();
    for def in &defs {
        // Native tables carry no connection string.
        let Some(connect) = def.connect.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        report.linked += 1;

        let Some(current_path) = database_path_from_connect(connect) else {
            report.skipped += 1;
            continue;
        };

        let new_local_path = config.to_local_path(current_path);
        if !path_exists(&new_local_path) {
            // Target not copied (yet); leave the link untouched.
            report.skipped += 1;
            continue;
        }

        // Substitute only the path; every other key=value pair stays as-is.
        let new_connect = connect.replace(current_path, &new_local_path);
        let result = session
            .update_table_connect(&def.name, &new_connect)
            .and_then(|()| session.refresh_link(&def.name));
        match result {
            Ok(()) => {
                println!("    ✓ Relinked table {}", def.name);
                report.rewritten += 1;
            }
            Err(e) => {
                eprintln!("    ⚠ Failed to relink table {}: {e:#}", def.name);
                report.failed += 1;
            }
        }
    }

    session
        .close_database()
        .with_context(|| format!("Failed to close database {local_db_path}"))?;

    println!(
        "  ✓ {}/{} linked table(s) relinked",
        report.rewritten, report.linked
    );
    Ok(report)
}
