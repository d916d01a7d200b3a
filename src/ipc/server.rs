//! Unix domain socket server for IPC
//!
//! Provides request-response communication, push notifications of voice
//! events, and the recognizer command stream for subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::daemon::Daemon;
use crate::events::VoiceEvent;
use crate::speech::RecognizerCommand;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    daemon: Arc<Daemon>,
    event_tx: broadcast::Sender<VoiceEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket. Subscribed clients receive events sent on `event_tx`.
    pub fn new(
        socket_path: &Path,
        daemon: Arc<Daemon>,
        event_tx: broadcast::Sender<VoiceEvent>,
    ) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            daemon,
            event_tx,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let daemon = Arc::clone(&self.daemon);
                    let event_tx = self.event_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, daemon, event_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Read one length-prefixed frame. `None` on a clean disconnect.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large: {len} bytes");
    }

    let mut msg_buf = vec![0u8; len];
    reader
        .read_exact(&mut msg_buf)
        .await
        .context("truncated message")?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
pub async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = u32::try_from(msg_bytes.len())
        .context("message too large")?
        .to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// Forward raw frames until the client goes away
async fn read_frames(mut reader: OwnedReadHalf, frames: mpsc::Sender<Vec<u8>>) {
    loop {
        match read_message(&mut reader).await {
            Ok(Some(frame)) => {
                if frames.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("client disconnected");
                break;
            }
            Err(e) => {
                warn!(?e, "failed to read from client, disconnecting");
                break;
            }
        }
    }
}

/// Receive from an optional subscription; pends forever when absent
async fn recv_subscribed<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> std::result::Result<T, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle a single client connection
async fn handle_client(
    stream: UnixStream,
    daemon: Arc<Daemon>,
    event_tx: broadcast::Sender<VoiceEvent>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let (frame_tx, mut frame_rx) = mpsc::channel(16);
    tokio::spawn(read_frames(reader, frame_tx));

    let mut events: Option<broadcast::Receiver<VoiceEvent>> = None;
    let mut commands: Option<broadcast::Receiver<RecognizerCommand>> = None;

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                let (response, subscribe) = match serde_json::from_slice::<Request>(&frame) {
                    Ok(request) => {
                        debug!(?request, "received request");
                        process_request(request, &daemon).await
                    }
                    Err(e) => {
                        warn!(%e, "malformed request");
                        (Response::error("bad_request", e.to_string()), false)
                    }
                };
                send_message(&mut writer, &response).await?;

                if subscribe && events.is_none() {
                    debug!("client subscribed to notifications");
                    events = Some(event_tx.subscribe());
                    commands = Some(daemon.relay().subscribe());
                    for command in daemon.relay().pending_starts() {
                        send_message(&mut writer, &Notification::RecognizerCommand(command)).await?;
                    }
                }
            }

            event = recv_subscribed(&mut events) => match event {
                Ok(event) => send_message(&mut writer, &Notification::Event(event)).await?,
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event subscriber lagged"),
                Err(RecvError::Closed) => events = None,
            },

            command = recv_subscribed(&mut commands) => match command {
                Ok(command) => {
                    send_message(&mut writer, &Notification::RecognizerCommand(command)).await?
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "recognizer command subscriber lagged")
                }
                Err(RecvError::Closed) => commands = None,
            },
        }
    }
}

/// Process a request and return a response
/// Returns (Response, should_subscribe)
async fn process_request(request: Request, daemon: &Daemon) -> (Response, bool) {
    let response = match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => {
            let mode = daemon.mode().lock().await.mode();
            Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                mode,
                platform: daemon.speech().capability().platform,
                is_listening: daemon.speech().is_listening().await,
                wake_word_active: daemon.wake().is_active(),
                uptime_secs: daemon.uptime_secs(),
            })
        }

        Request::GetMode => Response::Mode {
            mode: daemon.mode().lock().await.mode(),
            changed: false,
        },

        Request::SetMode { mode } => {
            let mut manager = daemon.mode().lock().await;
            let before = manager.mode();
            if manager.request_mode(&mode) {
                info!(from = %before, to = %manager.mode(), "mode set via IPC");
                Response::Mode {
                    mode: manager.mode(),
                    changed: manager.mode() != before,
                }
            } else {
                Response::error("invalid_mode", format!("invalid mode: {mode:?}"))
            }
        }

        Request::ToggleMode => {
            let mut manager = daemon.mode().lock().await;
            let changed = manager.toggle_mode();
            Response::Mode {
                mode: manager.mode(),
                changed,
            }
        }

        Request::StartListening { options } => match daemon.start_listening(options).await {
            Ok(session) => Response::Listening(session),
            Err(e) => Response::error(e.code(), e.to_string()),
        },

        Request::StopListening => Response::Listening(daemon.stop_listening().await),

        Request::GetPlatformInfo => Response::Platform(daemon.speech().platform_info()),

        Request::GetWakeStats => Response::WakeStats(daemon.wake().stats()),

        Request::RestartWakeWord => {
            daemon.wake().restart().await;
            Response::WakeStats(daemon.wake().stats())
        }

        Request::RecognizerEvent { recognizer, event } => {
            if daemon.relay().deliver(recognizer, event) {
                Response::Ack
            } else {
                Response::error("unknown_recognizer", format!("no recognizer {recognizer}"))
            }
        }

        Request::Subscribe => return (Response::Subscribed, true),
    };
    (response, false)
}
