use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use netpulse::api::{self, AppState};
use netpulse::journal::Journal;
use netpulse::probe::{DnsResolver, NetProbeFactory};
use netpulse::{utils, MonitorConfig, MonitorController};

#[tokio::main]
async fn main() -> Result<()> {
    utils::setup_console();
    utils::init_tracing();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".into());
    let config = MonitorConfig::load(&config_path)?;
    config.validate()?;

    let resolver = Arc::new(DnsResolver::new(config.dns)?);
    let factory = Arc::new(NetProbeFactory::new(resolver));
    let (controller, monitor) = MonitorController::new(&config, factory);

    let cancel = CancellationToken::new();
    let journal = Journal::new(config.journal_lines);

    let journal_task = tokio::spawn(journal.clone().follow(monitor.subscribe(), cancel.clone()));
    let controller_task = tokio::spawn(controller.run(cancel.clone()));

    let api_state = AppState {
        monitor: monitor.clone(),
        journal: journal.clone(),
        log_file: config.log_file.clone(),
    };
    let api_port = config.api_port;
    let api_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = api::start_server(api_port, api_state, api_cancel).await {
            error!("{:#}", e);
        }
    });

    if config.autostart {
        monitor.start()?;
        journal.append(format!("Auto-monitoring started (every {} s).", config.interval_sec));
    }

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Closing NetPulse...");
    cancel.cancel();
    let _ = controller_task.await;
    let _ = journal_task.await;

    if let Some(path) = &config.log_file {
        // Outcome is already recorded in the journal
        let _ = journal.save(path);
    }

    Ok(())
}
