//! Editor link wire messages
//!
//! One tagged JSON object per WebSocket frame: `{type, timestamp, data}`.
//! Client payloads decode into a closed set of variants at the boundary;
//! unknown types are logged and ignored by the hub rather than treated as
//! fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A text selection in the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub file: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A diagnostic (error/warning) reported by the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub message: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    /// error, warning, info
    #[serde(default)]
    pub severity: String,
}

/// Client-to-server payload kinds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientPayload {
    Selection(Selection),
    Diagnostic(Diagnostic),
    FileChange {
        file: String,
        #[serde(default)]
        language: Option<String>,
    },
    Workspace {
        #[serde(default)]
        root: Option<String>,
        #[serde(default)]
        open_files: Vec<String>,
    },
}

/// Envelope for inbound frames
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    #[serde(flatten)]
    pub payload: ClientPayload,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A proposed code change pushed to the editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    pub file: String,
    pub patch: String,
    pub orig_content: String,
    pub new_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Server-to-client payload kinds
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerPayload {
    Diff(DiffResult),
    Status { message: String },
}

/// Envelope for outbound frames
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    #[serde(flatten)]
    pub payload: ServerPayload,
    pub timestamp: DateTime<Utc>,
}

impl ServerMessage {
    pub fn new(payload: ServerPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
