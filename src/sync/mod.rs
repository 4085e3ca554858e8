// dblocalsync/src/sync/mod.rs
pub(crate) mod logic;

use anyhow::Result;

use crate::config::AppConfig;
use crate::engine::Engine;

/// Public entry point for the sync process. Returns whether every
/// attempted phase fully succeeded.
pub fn run_sync_flow(engine: &dyn Engine, config: &AppConfig, links_only: bool) -> Result<bool> {
    logic::perform_sync_orchestration(engine, config, links_only)
}

/// Reports the discovered configuration and checks the remote network
/// locations. Mutates nothing.
pub fn run_network_check(config: &AppConfig) -> bool {
    logic::show_configuration(config);
    logic::check_network_accessibility(config)
}
