//! DB Local Sync
//!
//! Copies desktop databases from their office network locations to a local
//! working directory, keeping the original file names, and repoints linked
//! tables inside the copies at the local files. One configured database is
//! reduced to a light replica (structure plus the latest records) instead
//! of being copied wholesale.

mod config;
mod engine;
mod lightcopy;
mod links;
mod sync;

use anyhow::{Context, Result};
use chrono::Local;
use config::AppConfig;
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("{}", "=".repeat(60));
    println!("DB LOCAL SYNC");
    println!("{}", "=".repeat(60));
    println!("Run started: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!();

    match run_app() {
        Ok(summary) => {
            println!();
            println!("{}", "=".repeat(60));
            println!("{}", summary.verdict());
            println!("{}", "=".repeat(60));
            if summary.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("❌ Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

/// How the run ended, per mode. The network check gets its own verdict
/// instead of the generic sync banner.
#[derive(Debug, PartialEq)]
enum RunSummary {
    Sync { ok: bool },
    NetworkCheck { reachable: bool },
}

impl RunSummary {
    fn succeeded(&self) -> bool {
        match self {
            RunSummary::Sync { ok } => *ok,
            RunSummary::NetworkCheck { reachable } => *reachable,
        }
    }

    fn verdict(&self) -> &'static str {
        match self {
            RunSummary::Sync { ok: true } => "✅ PROCESS COMPLETED SUCCESSFULLY",
            RunSummary::Sync { ok: false } => "⚠ PROCESS COMPLETED WITH ERRORS",
            RunSummary::NetworkCheck { reachable: true } => {
                "✅ NETWORK CHECK PASSED - remote locations are reachable"
            }
            RunSummary::NetworkCheck { reachable: false } => {
                "❌ NETWORK CHECK FAILED - some remote locations are not reachable"
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Mode {
    Full,
    LinksOnly,
    CheckNetwork,
}

fn parse_mode(args: &[String]) -> Result<Mode> {
    match args.get(1).map(String::as_str) {
        None => Ok(Mode::Full),
        Some("--links-only") | Some("links-only") => Ok(Mode::LinksOnly),
        Some("--check-network") | Some("check-network") => Ok(Mode::CheckNetwork),
        Some(other) => anyhow::bail!(
            "Unknown mode {other:?}. Run without arguments for a full sync, \
             or pass --links-only / --check-network."
        ),
    }
}

fn run_app() -> Result<RunSummary> {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let mode = parse_mode(&args)?;

    let config =
        AppConfig::load_from_env().context("Failed to load configuration from environment")?;

    if mode == Mode::CheckNetwork {
        return Ok(RunSummary::NetworkCheck {
            reachable: sync::run_network_check(&config),
        });
    }

    config
        .ensure_local_dir()
        .context("Failed to prepare local database directory")?;

    let engine = build_engine()?;
    let ok = sync::run_sync_flow(engine.as_ref(), &config, mode == Mode::LinksOnly)?;
    Ok(RunSummary::Sync { ok })
}

#[cfg(windows)]
fn build_engine() -> Result<Box<dyn engine::Engine>> {
    Ok(Box::new(engine::access::AccessEngine::new()?))
}

#[cfg(not(windows))]
fn build_engine() -> Result<Box<dyn engine::Engine>> {
    anyhow::bail!("The database driver and automation interfaces are only available on Windows")
}
