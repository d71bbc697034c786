//! IDE WebSocket server
//!
//! Serves `/ws` for editor-extension links and `/health` for discovery
//! checks, bound to loopback on the workspace rendezvous port. Each upgraded
//! socket becomes one hub link: a writer task forwards hub frames to the
//! socket, the read loop feeds inbound frames to the hub.

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use eyre::{Context, Result, eyre};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::IdeConfig;

use super::hub::{Hub, HubHandle, LINK_BUFFER};
use super::port::workspace_port;

/// Fixed token printed to stdout so extensions can detect the server
pub const HANDSHAKE_TOKEN: &str = "###QUORUM_IDE_HANDSHAKE###";

/// Service name reported by the health endpoint
const SERVICE_NAME: &str = "quorum-ide";

/// The IDE integration server
pub struct IdeServer {
    config: IdeConfig,
    port: u16,
}

#[derive(Clone)]
struct AppState {
    hub: HubHandle,
    port: u16,
}

impl IdeServer {
    /// Create a server for one workspace
    ///
    /// An explicit configured port wins; otherwise the port is derived from
    /// the workspace path so the extension can compute it independently.
    pub fn new(config: IdeConfig, workspace_path: &str) -> Self {
        let port = if config.port != 0 {
            config.port
        } else {
            workspace_port(workspace_path)
        };
        Self { config, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the server until ctrl-c
    ///
    /// Spawns the hub actor, binds loopback, and prints the discovery
    /// side-channel (handshake token, then port) to stdout.
    pub async fn serve(self, hub: Hub, handle: HubHandle) -> Result<()> {
        if !self.config.enable {
            return Err(eyre!("IDE integration is disabled"));
        }

        tokio::spawn(hub.run());

        let state = AppState {
            hub: handle,
            port: self.port,
        };
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", self.port))
            .await
            .context(format!("Failed to bind IDE server to port {}", self.port))?;

        println!("{HANDSHAKE_TOKEN}");
        println!("{}", self.port);
        info!(port = self.port, "IDE server listening on ws://127.0.0.1:{}/ws", self.port);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("IDE server error")?;

        info!("IDE server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "port": state.port,
    }))
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Drive one editor link for the lifetime of its socket
async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(LINK_BUFFER);

    if hub.register(id, tx).await.is_err() {
        return;
    }
    info!(link = %id, "editor connected");

    // Writer: hub frames out to the socket. Ends when the hub drops this
    // link's sender (unregister or eviction).
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader: socket frames in to the hub
    while let Some(received) = ws_rx.next().await {
        match received {
            Ok(Message::Text(text)) => {
                if hub.inbound(text.to_string()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    debug!(link = %id, "editor disconnected");
    let _ = hub.unregister(id).await;
    let _ = writer.await;
}
