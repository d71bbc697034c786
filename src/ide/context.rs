//! Shared editor context
//!
//! One `EditorContext` lives for the lifetime of a hub instance. Only the
//! hub's inbound path mutates it; everyone else gets a deep copy through
//! [`crate::ide::HubHandle::snapshot`], so a reader can never observe a
//! write in progress.

use serde::Serialize;
use tracing::debug;

use super::messages::{ClientPayload, Diagnostic, Selection};

/// Diagnostics kept per context; oldest entries are evicted first
pub const MAX_DIAGNOSTICS: usize = 10;

/// Live snapshot of the connected editor's state
#[derive(Debug, Clone, Default, Serialize)]
pub struct EditorContext {
    pub active_file: Option<String>,
    pub selection: Option<Selection>,
    pub diagnostics: Vec<Diagnostic>,
    pub open_files: Vec<String>,
    pub workspace_root: Option<String>,
}

impl EditorContext {
    /// Merge one inbound payload into the context
    pub fn apply(&mut self, payload: ClientPayload) {
        match payload {
            ClientPayload::Selection(selection) => {
                self.active_file = Some(selection.file.clone());
                self.selection = Some(selection);
            }
            ClientPayload::Diagnostic(diagnostic) => {
                self.diagnostics.push(diagnostic);
                if self.diagnostics.len() > MAX_DIAGNOSTICS {
                    self.diagnostics.remove(0);
                }
            }
            ClientPayload::FileChange { file, .. } => {
                self.active_file = Some(file);
                // A selection belongs to the file it was made in; once the
                // active file moves elsewhere it is stale.
                if self
                    .selection
                    .as_ref()
                    .is_some_and(|sel| Some(&sel.file) != self.active_file.as_ref())
                {
                    debug!("clearing selection after file change");
                    self.selection = None;
                }
            }
            ClientPayload::Workspace { root, open_files } => {
                self.workspace_root = root;
                self.open_files = open_files;
            }
        }
    }

    /// Whether there is anything worth folding into a prompt
    pub fn is_empty(&self) -> bool {
        self.active_file.is_none()
            && self.selection.is_none()
            && self.diagnostics.is_empty()
            && self.open_files.is_empty()
            && self.workspace_root.is_none()
    }

    /// Fold this snapshot into a prompt
    ///
    /// Returns the prompt unchanged when there is no context to add.
    pub fn enrich_prompt(&self, prompt: &str) -> String {
        if self.is_empty() {
            return prompt.to_string();
        }

        let mut enriched = String::from(prompt);
        enriched.push_str("\n\n--- Editor context ---\n");

        if let Some(root) = &self.workspace_root {
            enriched.push_str(&format!("Workspace: {root}\n"));
        }
        if let Some(file) = &self.active_file {
            enriched.push_str(&format!("Active file: {file}\n"));
        }
        if let Some(selection) = &self.selection {
            enriched.push_str(&format!(
                "Selection ({}, lines {}-{}):\n{}\n",
                selection.file, selection.start_line, selection.end_line, selection.text
            ));
        }
        if !self.diagnostics.is_empty() {
            enriched.push_str("Diagnostics:\n");
            for d in &self.diagnostics {
                enriched.push_str(&format!("  [{}] {}:{} {}\n", d.severity, d.file, d.line, d.message));
            }
        }

        enriched
    }
}
