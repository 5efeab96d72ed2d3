//! Background runner standing in for the platform's background-sync
//! wake-up. Opens the same database a `restsync` invocation would, then
//! drains on a fixed poll interval for as long as the process lives —
//! the native analogue of a service worker's `sync` event handler.

use restsync_config::MediatorConfig;
use restsync_mediator::{Mediator, MediatorOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(path) => MediatorConfig::from_json5(&std::fs::read_to_string(path)?)?,
        None => MediatorConfig::default(),
    };
    if let Ok(db_path) = std::env::var("RESTSYNC_DB_PATH") {
        config.db_path = db_path;
    }

    let poll_interval = config.background_poll_interval;
    tracing::info!(
        db_path = %config.db_path,
        poll_interval = ?poll_interval,
        "starting restsync background runner"
    );

    let mediator = Mediator::new(config, MediatorOptions::default()).await?;

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut events = mediator.subscribe();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::debug!("poll interval elapsed, attempting a drain");
                mediator.sync_now().await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received shutdown signal, exiting");
                break;
            }
            event = events.recv() => {
                // A reachability transition already triggers its own drain
                // inside the mediator; this just keeps the subscription
                // alive and logs what happened for operators.
                if let Ok(event) = event {
                    tracing::debug!(?event, "observed mediator event");
                }
            }
        }
    }

    Ok(())
}
