//! promo-daemon: the promo-code redemption service.
//!
//! Single OS process running a Tokio async runtime. The game host talks to
//! the daemon via JSON-RPC over a Unix socket: it reports player sessions,
//! forwards redemption requests and receives the commands to execute as
//! event notifications.

mod commands;
mod config;
mod events;
mod host;
mod rpc;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use promo_core::{
    BackgroundTasks, CommandRevoker, DefinitionStore, ExpirySweeper, PromoService, SweepReport,
    TaskHooks,
};
use promo_types::{Clock, SystemClock};

use crate::config::{ConfigSink, DaemonConfig};
use crate::events::{Event, EventBus};
use crate::host::HostBridge;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Where the configuration is read from and saved to.
    pub config_path: PathBuf,
    /// Configuration.
    pub config: RwLock<DaemonConfig>,
    /// Catalog, ledgers and activation logic.
    pub service: Arc<PromoService>,
    /// Revokes expired temporary grants.
    pub sweeper: Arc<ExpirySweeper>,
    /// Connected game host.
    pub host: Arc<HostBridge>,
    /// Saves the catalog back into the configuration file.
    pub definition_sink: Arc<ConfigSink>,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    /// Open the ledgers in the configured data directory and wire the
    /// service together.
    pub fn build(config: DaemonConfig, config_path: PathBuf, clock: Arc<dyn Clock>) -> Arc<Self> {
        let data_dir = config.data_dir();
        let ledgers = promo_db::open(&data_dir, clock.clone());
        let definitions = Arc::new(DefinitionStore::from_configs(&config.codes, clock.clone()));

        let event_bus = EventBus::new(1000);
        let host = Arc::new(HostBridge::new(event_bus.clone()));
        let service = Arc::new(PromoService::new(
            definitions.clone(),
            ledgers.activations,
            ledgers.grants.clone(),
            host.clone(),
            host.clone(),
            clock,
        ));
        let revoker = Arc::new(CommandRevoker::new(definitions, host.clone(), host.clone()));
        let sweeper = Arc::new(ExpirySweeper::new(ledgers.grants, revoker));
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Arc::new(Self {
            definition_sink: Arc::new(ConfigSink::new(config_path.clone())),
            config_path,
            config: RwLock::new(config),
            service,
            sweeper,
            host,
            event_bus,
            shutdown_tx,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config_path = DaemonConfig::config_path();
    let config = DaemonConfig::load_from(&config_path)?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("promo={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("Promo daemon starting");

    // Ensure data directory exists
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save_to(&config_path)?;
        info!("Wrote default configuration to {:?}", config_path);
    }

    let intervals = config.task_intervals();
    let retention_days = config.ledger.revoked_retention_days;

    // 2. Open ledgers and build daemon state
    let state = DaemonState::build(config, config_path, Arc::new(SystemClock));

    // 3. Startup maintenance
    let orphans = state.service.prune_orphans();
    let purged = state.service.purge_old_revoked(retention_days);
    if !state.service.flush() {
        warn!("Startup maintenance could not be persisted");
    }
    info!(orphans, purged, "Startup maintenance finished");

    // 4. Start background tasks
    let bus = state.event_bus.clone();
    let hooks = TaskHooks {
        on_sweep: Some(Arc::new(move |report: &SweepReport| {
            bus.emit(Event::now(
                "GrantsRevoked",
                serde_json::json!({
                    "due": report.due,
                    "revoked": report.revoked,
                    "failed": report.failed,
                }),
            ));
        })),
        definition_sink: Some(state.definition_sink.clone()),
    };
    let tasks = BackgroundTasks::start(
        state.service.clone(),
        state.sweeper.clone(),
        intervals,
        hooks,
    );

    // 5. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    // 6. Emit DaemonStarted event
    state.event_bus.emit(Event::now(
        "DaemonStarted",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "codes": state.service.definitions().len(),
        }),
    ));

    // 7. Run the RPC server until shutdown
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown: stop the periodic tasks, then flush the ledgers.
    info!("Daemon shutting down gracefully");
    if !tasks.shutdown().await {
        warn!("Final flush failed, unsaved changes were lost");
    }

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
