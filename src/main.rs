//! meos-live - Main entry point
//!
//! Wires the selected producer (live MeOS upstream or simulation) to
//! the shared state store, hooks the state store's change callback to
//! the SSE hub, and serves the event stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meos_live::adapter::SourceAdapter;
use meos_live::config::{MeosConfig, SimulationConfig};
use meos_live::meos::MeosAdapter;
use meos_live::server::{self, AppState};
use meos_live::simulation::SimulationAdapter;
use meos_live::sse::Hub;
use meos_live::state::State;

/// Command-line arguments for meos-live
#[derive(Parser, Debug)]
#[command(name = "meos-live")]
#[command(about = "Live results relay for MeOS competition data")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8090", env = "MEOS_LIVE_PORT")]
    port: u16,

    /// Run in simulation mode instead of polling a MeOS server
    #[arg(long, env = "MEOS_LIVE_SIMULATION")]
    simulation: bool,

    /// MeOS server hostname or IP address
    #[arg(long, default_value = "localhost", env = "MEOS_LIVE_MEOS_HOST")]
    meos_host: String,

    /// MeOS server port ("none" to omit the port from the URL)
    #[arg(long, default_value = "2009", env = "MEOS_LIVE_MEOS_PORT")]
    meos_port: String,

    /// Use HTTPS towards the MeOS server
    #[arg(long, env = "MEOS_LIVE_MEOS_HTTPS")]
    meos_https: bool,

    /// Poll interval for MeOS data updates, in milliseconds
    #[arg(long, default_value = "1000", env = "MEOS_LIVE_POLL_INTERVAL_MS")]
    poll_interval_ms: u64,

    /// Total simulation cycle duration in seconds
    #[arg(long, default_value = "900")]
    simulation_duration_secs: u64,

    /// Duration of the start list phase in seconds
    #[arg(long, default_value = "180")]
    simulation_phase_start_secs: u64,

    /// Duration of the running phase in seconds
    #[arg(long, default_value = "420")]
    simulation_phase_running_secs: u64,

    /// Duration of the results phase in seconds
    #[arg(long, default_value = "300")]
    simulation_phase_results_secs: u64,

    /// Use a mass start instead of staggered starts
    #[arg(long)]
    simulation_mass_start: bool,

    /// Number of competition classes to generate
    #[arg(long, default_value = "3")]
    simulation_classes: usize,

    /// Number of competitors per class
    #[arg(long, default_value = "20")]
    simulation_runners: usize,

    /// Number of radio controls per class
    #[arg(long, default_value = "3")]
    simulation_controls: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meos_live=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting meos-live on port {}", args.port);
    if args.simulation {
        info!("Running in SIMULATION MODE");
    }

    let state = Arc::new(State::new());

    let (hub, coordinator) = Hub::new();
    tokio::spawn(coordinator.run());

    // Every materially-different generation becomes one advisory
    // "refresh now" notice to all connected viewers.
    {
        let hub = hub.clone();
        state.on_update(move || {
            hub.broadcast_update("update", json!({ "time": Utc::now().to_rfc3339() }));
        });
    }

    let mut simulation: Option<Arc<SimulationAdapter>> = None;
    let adapter: Arc<dyn SourceAdapter> = if args.simulation {
        let config = SimulationConfig {
            duration: Duration::from_secs(args.simulation_duration_secs),
            phase_start: Duration::from_secs(args.simulation_phase_start_secs),
            phase_running: Duration::from_secs(args.simulation_phase_running_secs),
            phase_results: Duration::from_secs(args.simulation_phase_results_secs),
            mass_start: args.simulation_mass_start,
            num_classes: args.simulation_classes,
            runners_per_class: args.simulation_runners,
            radio_controls: args.simulation_controls,
        };
        let sim = Arc::new(SimulationAdapter::new(config, state.clone()));
        simulation = Some(sim.clone());
        sim
    } else {
        let port = match args.meos_port.as_str() {
            "none" => None,
            port => Some(port.parse().context("invalid MeOS port")?),
        };
        let config = MeosConfig {
            hostname: args.meos_host.clone(),
            port,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            https: args.meos_https,
        };
        config
            .validate()
            .context("invalid MeOS configuration")?;
        info!(
            "MeOS configuration: {}, poll interval {:?}",
            config.endpoint(),
            config.poll_interval
        );
        Arc::new(MeosAdapter::new(config, state.clone()).context("building MeOS client")?)
    };

    match adapter.connect().await {
        Ok(()) => {
            info!("Connected successfully");
            if let Err(e) = adapter.start_polling() {
                error!("Failed to start polling: {e}");
                error!("Continuing without polling");
            } else {
                info!("Started polling for updates");
            }
        }
        Err(e) => {
            error!("Failed to connect: {e}");
            if !args.simulation {
                warn!("Starting in offline mode - MeOS server not available");
            }
        }
    }

    let app_state = AppState {
        state: state.clone(),
        hub,
        simulation,
    };
    let app = server::create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    adapter.stop();
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
