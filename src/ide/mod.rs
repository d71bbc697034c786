//! IDE integration
//!
//! Maintains a live, shared snapshot of an external editor's state (active
//! file, selection, diagnostics, open files) and can push results back.
//! Editor extensions connect over WebSocket; the hub merges their updates
//! into one [`EditorContext`] that prompt building consumes as a read-only
//! copy.

mod context;
mod hub;
mod messages;
mod port;
mod server;

pub use context::{EditorContext, MAX_DIAGNOSTICS};
pub use hub::{DIFF_END_MARKER, DIFF_START_MARKER, Hub, HubError, HubHandle};
pub use messages::{ClientMessage, ClientPayload, Diagnostic, DiffResult, Selection, ServerMessage, ServerPayload};
pub use port::{BASE_PORT, PORT_SPAN, workspace_port};
pub use server::{HANDSHAKE_TOKEN, IdeServer};
