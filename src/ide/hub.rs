//! Editor link hub
//!
//! One actor task owns the set of connected editor links. Registration,
//! unregistration, broadcast and inbound processing all flow through its
//! mailbox, so membership is mutated by exactly one logical owner and the
//! shared [`EditorContext`] has a single write path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::context::EditorContext;
use super::messages::{ClientMessage, DiffResult, ServerMessage, ServerPayload};

/// Mailbox depth for hub commands
const COMMAND_BUFFER: usize = 64;

/// Outbound frame buffer per link
pub(crate) const LINK_BUFFER: usize = 32;

/// A link that cannot accept a frame within this window is evicted
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Marks the beginning of a diff block on stdout
pub const DIFF_START_MARKER: &str = "<<<QUORUM_DIFF_START>>>";

/// Marks the end of a diff block on stdout
pub const DIFF_END_MARKER: &str = "<<<QUORUM_DIFF_END>>>";

/// Hub operations, serialized through the actor mailbox
pub(crate) enum HubCommand {
    Register { id: Uuid, tx: mpsc::Sender<String> },
    Unregister { id: Uuid },
    Broadcast { frame: String },
    Inbound { text: String },
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("editor hub is not running")]
    Closed,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The hub actor; run it with [`Hub::run`]
pub struct Hub {
    rx: mpsc::Receiver<HubCommand>,
    links: HashMap<Uuid, mpsc::Sender<String>>,
    context: Arc<RwLock<EditorContext>>,
    connected: Arc<AtomicUsize>,
}

impl Hub {
    /// Create a hub and the handle used to talk to it
    pub fn new() -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let context = Arc::new(RwLock::new(EditorContext::default()));
        let connected = Arc::new(AtomicUsize::new(0));

        let hub = Self {
            rx,
            links: HashMap::new(),
            context: Arc::clone(&context),
            connected: Arc::clone(&connected),
        };
        let handle = HubHandle { tx, context, connected };

        (hub, handle)
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self) {
        info!("editor hub started");
        while let Some(command) = self.rx.recv().await {
            self.handle_command(command).await;
        }
        info!("editor hub stopped");
    }

    async fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { id, tx } => {
                debug!(link = %id, "link registered");
                self.links.insert(id, tx);
                self.connected.store(self.links.len(), Ordering::SeqCst);
            }
            HubCommand::Unregister { id } => {
                // Dropping the sender closes the link's writer task
                if self.links.remove(&id).is_some() {
                    debug!(link = %id, "link unregistered");
                }
                self.connected.store(self.links.len(), Ordering::SeqCst);
            }
            HubCommand::Broadcast { frame } => self.broadcast(frame).await,
            HubCommand::Inbound { text } => self.process_inbound(&text).await,
        }
    }

    /// Attempt delivery to every registered link
    ///
    /// Each attempt is bounded; a link that times out or errors is evicted
    /// and closed so one stuck editor cannot stall the hub forever.
    async fn broadcast(&mut self, frame: String) {
        let mut dead = Vec::new();

        for (id, tx) in &self.links {
            let delivered = tokio::time::timeout(SEND_TIMEOUT, tx.send(frame.clone())).await;
            if !matches!(delivered, Ok(Ok(()))) {
                dead.push(*id);
            }
        }

        for id in dead {
            warn!(link = %id, "evicting unresponsive editor link");
            self.links.remove(&id);
        }
        self.connected.store(self.links.len(), Ordering::SeqCst);
    }

    /// The single write path for the shared editor context
    async fn process_inbound(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => {
                let mut context = self.context.write().await;
                context.apply(message.payload);
            }
            Err(err) => {
                // Unknown or malformed payloads are logged and ignored
                let tag = serde_json::from_str::<serde_json::Value>(text)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string));
                warn!(tag = tag.as_deref().unwrap_or("?"), error = %err, "ignoring unrecognized editor message");
            }
        }
    }
}

/// Cloneable handle to a running [`Hub`]
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    context: Arc<RwLock<EditorContext>>,
    connected: Arc<AtomicUsize>,
}

impl HubHandle {
    /// Deep copy of the current editor context, never a live alias
    pub async fn snapshot(&self) -> EditorContext {
        self.context.read().await.clone()
    }

    /// Whether at least one editor link is currently registered
    ///
    /// Callers use this to decide whether enriching a prompt with editor
    /// context is worth doing.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) > 0
    }

    pub(crate) async fn register(&self, id: Uuid, tx: mpsc::Sender<String>) -> Result<(), HubError> {
        self.tx
            .send(HubCommand::Register { id, tx })
            .await
            .map_err(|_| HubError::Closed)
    }

    pub(crate) async fn unregister(&self, id: Uuid) -> Result<(), HubError> {
        self.tx
            .send(HubCommand::Unregister { id })
            .await
            .map_err(|_| HubError::Closed)
    }

    pub(crate) async fn inbound(&self, text: String) -> Result<(), HubError> {
        self.tx
            .send(HubCommand::Inbound { text })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Send a message to every connected link
    pub async fn broadcast(&self, message: &ServerMessage) -> Result<(), HubError> {
        let frame = message.to_json()?;
        self.tx
            .send(HubCommand::Broadcast { frame })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Push a proposed diff to the editor
    ///
    /// Also prints the diff between stdout markers, for extensions that
    /// watch the process output instead of holding a socket.
    pub async fn send_diff(&self, diff: DiffResult) -> Result<(), HubError> {
        println!("{DIFF_START_MARKER}");
        println!("{}", diff.patch);
        println!("{DIFF_END_MARKER}");

        self.broadcast(&ServerMessage::new(ServerPayload::Diff(diff))).await
    }

    /// Push a status line to the editor
    pub async fn send_status(&self, message: impl Into<String>) -> Result<(), HubError> {
        self.broadcast(&ServerMessage::new(ServerPayload::Status {
            message: message.into(),
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn started_hub() -> HubHandle {
        let (hub, handle) = Hub::new();
        tokio::spawn(hub.run());
        handle
    }

    /// Drive a no-op command through the mailbox so prior commands are done
    async fn settle(handle: &HubHandle) {
        let _ = handle.inbound("{}".to_string()).await;
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_register_and_broadcast() {
        let handle = started_hub().await;
        let (tx_a, mut rx_a) = mpsc::channel(LINK_BUFFER);
        let (tx_b, mut rx_b) = mpsc::channel(LINK_BUFFER);

        handle.register(Uuid::new_v4(), tx_a).await.unwrap();
        handle.register(Uuid::new_v4(), tx_b).await.unwrap();
        settle(&handle).await;
        assert!(handle.is_connected());

        handle.send_status("hello").await.unwrap();

        let frame_a = rx_a.recv().await.unwrap();
        let frame_b = rx_b.recv().await.unwrap();
        assert!(frame_a.contains(r#""type":"status"#));
        assert_eq!(frame_a, frame_b);
    }

    #[tokio::test]
    async fn test_dead_link_is_evicted_on_broadcast() {
        let handle = started_hub().await;
        let (tx, rx) = mpsc::channel(LINK_BUFFER);
        drop(rx);

        handle.register(Uuid::new_v4(), tx).await.unwrap();
        settle(&handle).await;
        assert!(handle.is_connected());

        handle.send_status("anyone there?").await.unwrap();
        settle(&handle).await;
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_unregister_clears_connected_flag() {
        let handle = started_hub().await;
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(LINK_BUFFER);

        handle.register(id, tx).await.unwrap();
        settle(&handle).await;
        assert!(handle.is_connected());

        handle.unregister(id).await.unwrap();
        settle(&handle).await;
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_inbound_updates_snapshot() {
        let handle = started_hub().await;

        handle
            .inbound(r#"{"type":"selection","data":{"file":"src/a.rs","text":"x","start_line":1,"end_line":2}}"#.to_string())
            .await
            .unwrap();
        settle(&handle).await;

        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.active_file.as_deref(), Some("src/a.rs"));

        handle
            .inbound(r#"{"type":"fileChange","data":{"file":"src/b.rs"}}"#.to_string())
            .await
            .unwrap();
        settle(&handle).await;

        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.active_file.as_deref(), Some("src/b.rs"));
        assert!(snapshot.selection.is_none());
    }

    #[tokio::test]
    async fn test_unknown_inbound_type_is_ignored() {
        let handle = started_hub().await;

        handle
            .inbound(r#"{"type":"cursorBlink","data":{"rate":2}}"#.to_string())
            .await
            .unwrap();
        handle
            .inbound(r#"{"type":"workspace","data":{"root":"/repo","open_files":[]}}"#.to_string())
            .await
            .unwrap();
        settle(&handle).await;

        // The bad frame changed nothing; the good frame still applied
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.workspace_root.as_deref(), Some("/repo"));
    }

    #[tokio::test]
    async fn test_snapshot_is_a_deep_copy() {
        let handle = started_hub().await;

        handle
            .inbound(r#"{"type":"workspace","data":{"root":"/repo","open_files":["a.rs"]}}"#.to_string())
            .await
            .unwrap();
        settle(&handle).await;

        let mut snapshot = handle.snapshot().await;
        snapshot.open_files.push("mutated.rs".to_string());

        // Mutating the copy must not leak back into the shared context
        assert_eq!(handle.snapshot().await.open_files, vec!["a.rs"]);
    }
}
