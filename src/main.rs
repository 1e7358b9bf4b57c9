// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::time::{Duration, timeout};
use tracing::{error, info, warn};

use sector_alarm_bridge::mqtt::{self, Topics, command::command_channel};
use sector_alarm_bridge::{Bridge, ConfigStore, PasswordCipher, Reconciler, web};

/// Upper bound for an in-flight tick to finish during teardown.
const RECONCILER_STOP_TIMEOUT: Duration = Duration::from_secs(90);
/// Time given to the event loop to flush the offline message.
const MQTT_STOP_TIMEOUT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "sector2mqtt")]
#[command(about = "Bridge between the Sector Alarm cloud and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "CONFIG_PATH", default_value = "sector2mqtt.toml")]
    config: PathBuf,

    /// Key used to seal the stored password; created on first start
    #[arg(long, env = "SECRETS_KEY_PATH", default_value = "secrets.key")]
    key_file: PathBuf,

    /// Address for the web UI and status API
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

/// Why a connection generation ended.
enum Restart {
    Stop,
    Reload,
    Reconnect,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=sector_alarm_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let cipher = PasswordCipher::load_or_generate(&cli.key_file)
        .with_context(|| format!("Failed to load key file {}", cli.key_file.display()))?;
    let store = ConfigStore::new(&cli.config, cipher);
    let bridge = Arc::new(Bridge::load(store).context("Failed to load config file")?);

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to bind web UI on {}", cli.listen))?;
    info!("Web UI listening on http://{}", cli.listen);
    let app = web::router(Arc::clone(&bridge));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Web server failed: {e}");
        }
    });

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut reconnect = bridge.subscribe_reconnect();

    loop {
        let config = bridge.config();
        let prefix = config.mqtt.prefix.clone();
        info!("Connecting to MQTT broker at {}:{}", config.mqtt.broker, config.mqtt.port);

        let (publisher, eventloop) = mqtt::connect(&config.mqtt);
        // Without a panel id there is nothing to subscribe to yet; saving the
        // configuration starts a new generation.
        let topics = config
            .is_complete()
            .then(|| Topics::new(&config.mqtt, &config.cloud.panel_id));
        let (command_tx, command_rx) = command_channel();

        let mut mqtt_handle = tokio::spawn(mqtt::run_event_loop(
            eventloop,
            publisher.clone(),
            prefix.clone(),
            topics,
            command_tx,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconciler = Reconciler::new(Arc::clone(&bridge), publisher.clone(), command_rx);
        let mut reconciler_handle = tokio::spawn(reconciler.run(shutdown_rx));

        info!("MQTT bridge running. Send SIGHUP to reload, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                Restart::Stop
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                Restart::Stop
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                Restart::Reload
            }
            _ = reconnect.changed() => {
                info!("Configuration saved, restarting connections...");
                Restart::Reconnect
            }
        };

        // Let the current tick finish before the client goes away.
        let _ = shutdown_tx.send(true);
        if timeout(RECONCILER_STOP_TIMEOUT, &mut reconciler_handle).await.is_err() {
            warn!("Reconciler did not stop in time, aborting it");
            reconciler_handle.abort();
        }

        publisher.publish_availability(&prefix, false).await;
        if let Err(e) = publisher.publisher().try_disconnect() {
            warn!("Error disconnecting from MQTT: {e}");
        }
        if timeout(MQTT_STOP_TIMEOUT, &mut mqtt_handle).await.is_err() {
            mqtt_handle.abort();
        }

        match restart {
            Restart::Stop => break,
            Restart::Reconnect => continue,
            Restart::Reload => {
                info!("Reloading config from {}", cli.config.display());
                match bridge.reload_configuration().await {
                    Ok(()) => info!("Config reloaded successfully"),
                    Err(e) => warn!("Failed to reload config, keeping previous: {e}"),
                }
            }
        }
    }

    bridge.close().await;
    info!("Shutdown complete");
    Ok(())
}
