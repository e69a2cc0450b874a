pub mod archive;
pub mod assets;
pub mod build;
pub mod completions;
pub mod dev;
pub mod format;
pub mod init;
pub mod unlock;
pub mod watch_worker;

use crate::output::ConsoleSink;
use extforge_core::{BuildMode, Pipeline};
use extforge_schema::{CommandId, ProjectConfig, ProjectPaths};
use extforge_store::{CacheLayout, LockGuard, LockService, StoreError};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_LOCK_CONTENDED: u8 = 4;

const SKIP_PREREQS_ENV: &str = "EXTFORGE_SKIP_PREREQS";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

/// Lock contention as reported to the user.
pub fn contended(id: &CommandId, pid: Option<u32>) -> String {
    match pid {
        Some(pid) => format!("'{id}' is locked by another process (pid {pid})"),
        None => format!("'{id}' is locked by another process"),
    }
}

pub fn store_err(e: &StoreError) -> String {
    format!("cache error: {e}")
}

/// A loaded project: its config, resolved paths, and the lock service over
/// its cache directory.
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub paths: ProjectPaths,
    pub locks: LockService,
}

impl Project {
    pub fn open(root: &Path) -> Result<Self, String> {
        let config = ProjectConfig::load(root).map_err(|e| format!("config error: {e}"))?;
        let paths = ProjectPaths::resolve(root, &config);
        let layout = CacheLayout::new(&paths.cache_dir);
        layout.initialize().map_err(|e| store_err(&e))?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
            paths,
            locks: LockService::new(layout),
        })
    }

    /// Acquire every id in `ids` or none of them.
    pub fn lock(&self, ids: &[CommandId]) -> Result<LockGuard, String> {
        match self.locks.acquire_guard(ids).map_err(|e| store_err(&e))? {
            Some(guard) => Ok(guard),
            None => Err(self.contention_message(ids)),
        }
    }

    /// Let go of `id` inside `guard` so another command can take it.
    pub fn release_from(&self, guard: &mut LockGuard, id: &CommandId) -> Result<(), String> {
        guard.release(id).map_err(|e| store_err(&e))
    }

    /// Take `id` back into `guard` after [`Project::release_from`].
    pub fn relock(&self, guard: &mut LockGuard, id: &CommandId) -> Result<(), String> {
        if guard.reacquire(id).map_err(|e| store_err(&e))? {
            Ok(())
        } else {
            Err(self.contention_message(std::slice::from_ref(id)))
        }
    }

    /// Unconditional removal, for `unlock`.
    pub fn release(&self, id: &CommandId) -> Result<(), String> {
        self.locks.release(id).map_err(|e| store_err(&e))
    }

    fn contention_message(&self, ids: &[CommandId]) -> String {
        for id in ids {
            if let Ok(Some(record)) = self.locks.holder(id) {
                if record.pid != std::process::id() && record.holder_alive() {
                    return contended(id, Some(record.pid));
                }
            }
        }
        contended(&ids[0], None)
    }

    /// Fail early with install hints when the bundler command is missing.
    pub fn check_bundler(&self) -> Result<(), String> {
        if skip_prereqs() {
            return Ok(());
        }
        let missing = extforge_runtime::check_bundler_prereqs(&self.config.bundler);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(extforge_runtime::format_missing(&missing))
        }
    }

    /// A pipeline over this project, reporting to the console unless `quiet`.
    pub fn pipeline(&self, mode: BuildMode, quiet: bool) -> Result<Pipeline, String> {
        let mut pipeline =
            Pipeline::new(&self.root, self.config.clone(), mode).map_err(|e| e.to_string())?;
        if !quiet {
            pipeline.subscribe(Box::new(ConsoleSink::new()));
        }
        Ok(pipeline)
    }
}

pub fn skip_prereqs() -> bool {
    std::env::var(SKIP_PREREQS_ENV).as_deref() == Ok("1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CONFIG: &str = r#"
[bundler]
backend = "mock"

[manifest.required]
name = "T"
version = "1.0"
description = "d"

[manifest.required.icons]
16 = "i.png"

[manifest.targets.chrome]
"#;

    fn project() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("extforge.toml"), CONFIG).unwrap();
        let project = Project::open(dir.path()).unwrap();
        (dir, project)
    }

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_CONFIG_ERROR,
            EXIT_STORE_ERROR,
            EXIT_LOCK_CONTENDED,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn open_initializes_cache_directory() {
        let (dir, project) = project();
        assert!(dir.path().join(".extforge/locks").is_dir());
        assert_eq!(project.paths.out_dir, dir.path().join("build"));
    }

    #[test]
    fn open_without_config_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::open(dir.path()).err().unwrap();
        assert!(err.starts_with("config error:"));
    }

    #[test]
    fn lock_and_relock() {
        let (_dir, project) = project();
        let mut guard = project
            .lock(&[CommandId::build(), CommandId::format()])
            .unwrap();
        project
            .release_from(&mut guard, &CommandId::format())
            .unwrap();
        assert!(project.locks.holder(&CommandId::format()).unwrap().is_none());
        project.relock(&mut guard, &CommandId::format()).unwrap();
        assert!(project.locks.holder(&CommandId::format()).unwrap().is_some());
        drop(guard);
        assert!(project.locks.holder(&CommandId::build()).unwrap().is_none());
        assert!(project.locks.holder(&CommandId::format()).unwrap().is_none());
    }

    #[test]
    fn contended_message_names_holder() {
        let msg = contended(&CommandId::build(), Some(7));
        assert_eq!(msg, "'build' is locked by another process (pid 7)");
    }

    #[test]
    fn mock_backend_needs_no_prereqs() {
        let (_dir, project) = project();
        project.check_bundler().unwrap();
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
