//! plugwatch service binary.
//!
//! Run with: `cargo run -p plugwatch-service`

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use plugwatch_service::sensors::SystemSensors;
use plugwatch_service::{
    api, AppState, ChargeController, ChargeSettings, Config, ConnectivityMonitor, DeviceHandle,
    MonitorSettings,
};

/// Smart-plug supervisor: charge controller, connectivity monitor and HTTP API.
#[derive(Parser, Debug)]
#[command(name = "plugwatch-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Disable the charge control loop.
    #[arg(long, global = true)]
    no_charge: bool,

    /// Disable the connectivity monitor.
    #[arg(long, global = true)]
    no_monitor: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Print the device status and connectivity, then exit.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Status) => run_status(args).await,
        Some(Command::Run) | None => run_server(args).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    config.apply_env();

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }

    config.validate()?;
    Ok(config)
}

/// One-shot debug check of the device, bypassing the loops.
async fn run_status(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let device = DeviceHandle::from_config(&config)?;
    let backend = device.backend();

    println!(
        "--- Checking {} ({}) ---",
        config.device.name, config.device.id
    );

    match backend.status().await {
        Ok(points) => println!("status: {}", serde_json::to_string_pretty(&points)?),
        Err(e) => println!("status: error: {e}"),
    }

    match backend.connect_status().await {
        Ok(true) => println!("connectivity: ONLINE"),
        Ok(false) => println!("connectivity: OFFLINE"),
        Err(e) => println!("connectivity: error: {e}"),
    }

    Ok(())
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("plugwatch_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    info!(
        "plugwatch starting for {} ({})",
        config.device.name, config.device.id
    );

    // Backend construction is startup-fatal: a per-tick rebuild would pay
    // the session setup cost on every poll.
    let device = DeviceHandle::from_config(&config)?;
    let state = AppState::new(config, device);

    if state.config.charge.enabled && !args.no_charge {
        let controller = ChargeController::new(
            ChargeSettings::from_config(&state.config),
            state.device.backend(),
            Arc::new(SystemSensors::new()),
            Arc::clone(&state.telemetry),
            state.notifier.clone(),
        );
        state.loops.set_charge_running(true);
        tokio::spawn(controller.run(state.loops.subscribe_stop()));
    } else {
        info!("charge controller disabled");
    }

    if state.config.monitor.enabled && !args.no_monitor {
        let monitor = ConnectivityMonitor::new(
            MonitorSettings::from_config(&state.config),
            state.device.backend(),
            Arc::clone(&state.telemetry),
            state.notifier.clone(),
        );
        state.loops.set_monitor_running(true);
        tokio::spawn(monitor.run(state.loops.subscribe_stop()));
    } else {
        info!("connectivity monitor disabled");
    }

    // Build the router
    let app = api::router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::clone(&state));

    info!("starting server on {}", state.config.server.bind);
    let listener = tokio::net::TcpListener::bind(state.config.server.bind.as_str()).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await?;

    info!("plugwatch shutdown complete");
    Ok(())
}

/// Wait for ctrl-c, then stop the background loops.
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        return;
    }
    info!("received shutdown signal");
    state.loops.signal_stop();
}
