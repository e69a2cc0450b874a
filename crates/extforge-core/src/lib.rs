//! Build orchestration for extforge.
//!
//! This crate ties together the project schema, the cache (locks and
//! snapshots), and the runtime collaborators into the `Pipeline`, the ordered
//! build sequence gated by the snapshot cache. It also provides the log
//! broadcast that pipeline and supervisor report through, the `WatchSupervisor`
//! that drives one long-lived watch subprocess from keypresses, the worker
//! loop that runs inside that subprocess, and signal handling.

pub mod concurrency;
pub mod events;
pub mod lifecycle;
pub mod pipeline;
pub mod session;
pub mod supervisor;
pub mod watch;

pub use concurrency::{install_signal_handler, shutdown_requested, spawn_stdin_watch, StopFlag};
pub use events::{Broadcast, ChannelSink, LogSink, PipelineEvent};
pub use lifecycle::{validate_transition, SupervisorState};
pub use pipeline::{BuildMode, Pipeline, RunOutcome, Step};
pub use session::{StopOutcome, StopPolicy, WatchSession, INTERRUPT};
pub use supervisor::{
    default_chain, run_supervisor, Key, KeyChain, KeySource, Propagation, WatchSupervisor,
    HELP_TEXT,
};
pub use watch::WatchWorker;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(#[from] extforge_schema::ConfigError),
    #[error("manifest error: {0}")]
    Manifest(#[from] extforge_schema::ManifestError),
    #[error("cache error: {0}")]
    Store(#[from] extforge_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] extforge_runtime::RuntimeError),
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_prefixes_identify_the_layer() {
        let config: CoreError = extforge_schema::ConfigError::NoTargets.into();
        assert!(config.to_string().starts_with("config error:"));

        let manifest: CoreError = extforge_schema::ManifestError::MissingField("name").into();
        assert!(manifest.to_string().starts_with("manifest error:"));

        let store: CoreError = extforge_store::StoreError::LockFailed("x".to_owned()).into();
        assert!(store.to_string().starts_with("cache error:"));
    }
}
