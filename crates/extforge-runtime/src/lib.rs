//! External collaborators of the extforge pipeline, reached through narrow interfaces.
//!
//! This crate implements the I/O edge: the pluggable `Bundler` trait with a
//! command-line backend (esbuild-compatible argv) and an in-process mock, the
//! `Archiver` trait over `7z`/`zip`, file scan/copy/clean/rename primitives,
//! the markup import rewriter and IIFE wrapper, an external tool runner, and
//! prerequisite checking.

pub mod archive;
pub mod bundler;
pub mod command;
pub mod fsops;
pub mod mock;
pub mod preprocess;
pub mod prereq;
pub mod terminal;
pub mod tool;

pub use archive::{select_archiver, Archiver, CommandArchiver};
pub use bundler::{select_bundler, BundleFormat, BundleJob, Bundler};
pub use command::CommandBundler;
pub use mock::MockBundler;
pub use prereq::{check_archive_prereqs, check_bundler_prereqs, format_missing, MissingPrereq};
pub use terminal::{is_interactive_terminal, stderr_is_terminal};
pub use tool::{run_tool, ToolOutput};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bundler backend '{0}' is not available")]
    BackendUnavailable(String),
    #[error("no archive tool found (install 7z or zip)")]
    ArchiverUnavailable,
    #[error("'{tool}' exited with {status}: {detail}")]
    ToolFailed {
        tool: String,
        status: String,
        detail: String,
    },
    #[error("failed to start '{tool}': {source}")]
    SpawnFailed {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("empty command line")]
    EmptyCommand,
    #[error("{0}")]
    ExecFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failed_display_names_tool_and_status() {
        let e = RuntimeError::ToolFailed {
            tool: "esbuild".to_owned(),
            status: "exit status: 1".to_owned(),
            detail: "Could not resolve \"./x\"".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("'esbuild' exited with exit status: 1"));
        assert!(msg.contains("Could not resolve"));
    }
}
