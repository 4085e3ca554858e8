// dblocalsync/src/sync/logic.rs
use anyhow::{Context, Result};
use std::fs;

use crate::config::{AppConfig, file_name_of, network_root, path_exists};
use crate::engine::Engine;
use crate::lightcopy;
use crate::links;

/// Attempt counts for one phase of the run.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PhaseOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl PhaseOutcome {
    pub fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Prints the discovered configuration, with per-side existence markers
/// for every entry.
pub fn show_configuration(config: &AppConfig) {
    println!("=== DISCOVERED CONFIGURATION ===");
    println!("Local directory: {}", config.local_db_dir);
    println!(
        "Password configured: {}",
        if config.db_password.is_empty() {
            "no"
        } else {
            "yes"
        }
    );

    if config.databases.is_empty() {
        println!("⚠ No databases configured");
        return;
    }

    for entry in &config.databases {
        println!();
        println!("📦 {}:", entry.name);
        println!("  File: {}", file_name_of(&entry.remote_path));
        println!("  Remote: {}", entry.remote_path);
        println!("  Local: {}", entry.local_path);
        println!("  Remote present: {}", exists_marker(&entry.remote_path));
        println!("  Local present: {}", exists_marker(&entry.local_path));
    }
    println!("{}", "=".repeat(50));
}

fn exists_marker(path: &str) -> &'static str {
    if path_exists(path) { "✓" } else { "✗" }
}

/// Checks every distinct `\\server\share` root referenced by the
/// configured remote paths. Remote paths outside UNC shares are assumed
/// reachable.
pub fn check_network_accessibility(config: &AppConfig) -> bool {
    let mut roots: Vec<String> = config
        .databases
        .iter()
        .filter_map(|e| network_root(&e.remote_path))
        .collect();
    roots.sort();
    roots.dedup();

    if roots.is_empty() {
        println!("No network locations to verify");
        return true;
    }

    println!("🌐 Verifying network location accessibility...");
    let mut all_accessible = true;
    for root in &roots {
        if path_exists(root) {
            println!("  ✓ {root} - accessible");
        } else {
            eprintln!("  ✗ {root} - not accessible");
            all_accessible = false;
        }
    }
    if !all_accessible {
        eprintln!("⚠ Some network locations are not accessible; check the office network connection");
    }
    all_accessible
}

/// Copy phase: every configured database is copied remote → local, either
/// verbatim or as a light replica when its file name carries the light
/// marker. A failing entry is counted and the loop continues.
pub fn copy_databases(engine: &dyn Engine, config: &AppConfig) -> PhaseOutcome {
    println!("=== Copying databases ===");
    let mut outcome = PhaseOutcome::default();

    for entry in &config.databases {
        let filename = file_name_of(&entry.remote_path);
        println!("📥 Processing {} ({filename})...", entry.name);

        if !path_exists(&entry.remote_path) {
            eprintln!("  ✗ Remote file not found: {}", entry.remote_path);
            outcome.record(false);
            continue;
        }

        let result: Result<()> = if config.is_light_entry(entry) {
            lightcopy::setup_light_database(engine, config, &entry.remote_path, &entry.local_path)
        } else {
            copy_preserving_mtime(&entry.remote_path, &entry.local_path)
        };

        match result {
            Ok(()) => {
                println!("  ✓ {} copied successfully", entry.name);
                outcome.record(true);
            }
            Err(e) => {
                eprintln!("  ✗ Error processing {}: {e:#}", entry.name);
                outcome.record(false);
            }
        }
    }

    println!(
        "=== Copy finished: {}/{} succeeded ===",
        outcome.succeeded, outcome.attempted
    );
    outcome
}

/// Copies a file and carries the source's modification time over to the
/// copy, so a local database still tells when its remote original was last
/// written.
fn copy_preserving_mtime(from: &str, to: &str) -> Result<()> {
    fs::copy(from, to).with_context(|| format!("Failed to copy {from}"))?;
    let modified = fs::metadata(from)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time of {from}"))?;
    fs::File::options()
        .write(true)
        .open(to)
        .and_then(|f| f.set_modified(modified))
        .with_context(|| format!("Failed to set modification time of {to}"))
}

/// Relink phase: every local database that exists on disk gets its linked
/// tables repointed at the local copies. Entries without a local file are
/// skipped and not counted as attempted.
pub fn relink_all_databases(engine: &dyn Engine, config: &AppConfig) -> PhaseOutcome {
    println!("=== Updating table links ===");
    let mut outcome = PhaseOutcome::default();

    for entry in &config.databases {
        if !path_exists(&entry.local_path) {
            println!(
                "⏭ {} - local database missing, skipping: {}",
                entry.name, entry.local_path
            );
            continue;
        }

        println!("🔗 Updating links in {}...", entry.name);
        match links::relink_database(engine, config, &entry.local_path) {
            Ok(report) => {
                println!(
                    "  ✓ Links updated in {} ({} rewritten, {} failed, {} skipped)",
                    entry.name, report.rewritten, report.failed, report.skipped
                );
                outcome.record(true);
            }
            Err(e) => {
                eprintln!("  ✗ Error updating links in {}: {e:#}", entry.name);
                outcome.record(false);
            }
        }
    }

    println!(
        "=== Link update finished: {}/{} succeeded ===",
        outcome.succeeded, outcome.attempted
    );
    outcome
}

/// Full run: configuration report, reachability check, copy phase, relink
/// phase. `links_only` skips the network check and the copy phase.
/// Returns whether every attempted phase fully succeeded.
pub fn perform_sync_orchestration(
    engine: &dyn Engine,
    config: &AppConfig,
    links_only: bool,
) -> Result<bool> {
    println!("🚀 Starting local database import");

    show_configuration(config);

    let copy_ok = if links_only {
        println!("🔗 Links-only mode - skipping copy phase");
        true
    } else {
        if !check_network_accessibility(config) {
            eprintln!("✗ Remote network locations are unreachable");
            eprintln!("  Either run from the office network, or use links-only mode with existing local copies");
            return Ok(false);
        }

        let copy = copy_databases(engine, config);
        if !copy.all_succeeded() {
            eprintln!("⚠ Some copies failed; continuing with link updates...");
        }
        copy.all_succeeded()
    };

    let relink = relink_all_databases(engine, config);

    if copy_ok && relink.all_succeeded() {
        println!("✓ Import completed successfully");
        Ok(true)
    } else {
        eprintln!("⚠ Import completed with errors");
        Ok(false)
    }
}
