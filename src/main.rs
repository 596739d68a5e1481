//! Standalone engine daemon.
//!
//! Runs the ticker loop against the local database with dry-run providers.
//! Production deployments construct `EngineState` with real email/calendar
//! adapters and embed the ticker instead.

use std::sync::Arc;

use meetgate::config;
use meetgate::db::TriageDb;
use meetgate::providers::{DryRunCalendar, DryRunMailer};
use meetgate::scheduler::Ticker;
use meetgate::state::EngineState;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let db = match TriageDb::open() {
        Ok(db) => db,
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(EngineState::new(
        config,
        db,
        Arc::new(DryRunMailer),
        Arc::new(DryRunCalendar),
    ));

    log::info!("meetgate engine started (dry-run providers)");
    Ticker::new(state).run().await;
}
