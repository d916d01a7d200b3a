//! phoenix-daemon: interaction-mode and speech service for the Phoenix
//! voice assistant
//!
//! This daemon runs alongside the UI host and provides:
//! - The voice/manual interaction mode, persisted across restarts
//! - Wake-word detection and voice-command listening over the host's
//!   speech recognizers
//! - IPC server for the UI host and any other local client

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use phoenix_daemon::config::Config;
use phoenix_daemon::daemon::Daemon;
use phoenix_daemon::events::VoiceEvent;
use phoenix_daemon::ipc::Server;
use phoenix_daemon::lifecycle::ShutdownSignal;
use phoenix_daemon::mode::{ControlSurface, FileModeStore, ModeManager};
use phoenix_daemon::speech::{Environment, RelaySpeechApi};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "phoenix-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.data_dir, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Components -> IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<VoiceEvent>(64);

    // The UI host runs the recognizers on our behalf
    let relay = Arc::new(RelaySpeechApi::new());
    let env = Environment::new().with_browser_speech(Arc::clone(&relay) as _);

    let mut mode = ModeManager::new(
        Box::new(FileModeStore::new(config.mode_store_path())),
        ControlSurface::new(),
    );
    mode.add_listener(|mode, previous| {
        info!(%previous, %mode, "interaction mode switched");
        Ok(())
    });

    let daemon = Daemon::new(mode, env, relay, &config.settings, event_tx.clone());
    if daemon.resume_wake_word() {
        info!("wake word detection running");
    } else if config.settings.wake_word_enabled {
        warn!("wake word detection unavailable");
    }

    let server = Server::new(&config.socket_path, Arc::clone(&daemon), event_tx)?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to listen for shutdown signals"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    daemon.shutdown().await;
    server.shutdown().await;

    info!("phoenix-daemon stopped");

    Ok(())
}
