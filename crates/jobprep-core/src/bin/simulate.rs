//! Two-tab session simulation
//!
//! Usage: `jobprep-simulate [config.json]`
//!
//! Opens two contexts over one store, logs in from the first and logs out
//! from the second, printing every `sessionChange` each tab observes.

use std::time::Duration;

use jobprep_core::{App, Config, EndReason, SessionManager, UserProfile};

fn watch(name: &'static str, manager: &SessionManager) {
    manager.subscribe(move |change| match serde_json::to_string(change) {
        Ok(json) => println!("[{name}] sessionChange {json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to encode session change"),
    });
}

#[tokio::main]
async fn main() -> jobprep_core::Result<()> {
    jobprep_core::init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::in_memory(),
    };
    let app = App::new(config)?;

    let first = app.open_context()?;
    let second = app.open_context()?;
    watch("tab-1", &first);
    watch("tab-2", &second);
    first.spawn_background()?;
    second.spawn_background()?;

    first.start(&UserProfile::new("alice"), "demo-token")?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    second.record_activity_event("keydown")?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    second.end(EndReason::Logout)?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    tracing::info!(
        tab1 = %first.state(),
        tab2 = %second.state(),
        "Simulation finished"
    );

    first.shutdown();
    second.shutdown();
    Ok(())
}
