//! # quorum
//!
//! Multi-model consensus runner. A single prompt fans out to several
//! independently configured LLM "workers" in parallel; "judge" models can
//! score each answer, and a pluggable consensus rule selects the winner.
//! A companion IDE hub keeps a live snapshot of editor state (active file,
//! selection, diagnostics) that can be folded into prompts.
//!
//! # Modules
//!
//! - [`provider`] - Provider trait, OpenAI/Anthropic clients, registry
//! - [`runner`] - Worker fan-out, judge evaluation, consensus selection
//! - [`ide`] - Editor context hub, WebSocket server, port rendezvous
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod ide;
pub mod provider;
pub mod runner;

// Re-export commonly used types
pub use config::{Config, ConsensusConfig, IdeConfig, JudgeConfig, ProviderSettings, WorkerConfig};
pub use ide::{EditorContext, Hub, HubHandle, IdeServer, workspace_port};
pub use provider::{
    AskOptions, ErrorKind, Provider, ProviderError, ProviderRegistry, Stats, StreamChunk, TokenUsage,
};
pub use runner::{Consensus, ConsensusError, JudgeResult, RunError, RunResult, Runner, WorkerResult};
