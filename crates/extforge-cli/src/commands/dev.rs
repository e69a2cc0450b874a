use super::build::full_rebuild;
use super::{Project, EXIT_SUCCESS};
use crate::keys::key_source;
use crate::output::ConsoleSink;
use extforge_core::{default_chain, run_supervisor, StopPolicy, WatchSession, WatchSupervisor};
use extforge_schema::CommandId;
use std::process::Command;

/// `dev`: hold the `dev` lock, run the watch worker as a subprocess, and
/// drive it from single keypresses until `q` or Ctrl-C.
pub fn run(project: &Project) -> Result<u8, String> {
    let _guard = project.lock(&[CommandId::dev()])?;
    project.check_bundler()?;

    let exe = std::env::current_exe().map_err(|e| format!("cannot locate extforge binary: {e}"))?;
    let root = project.root.clone();
    let spawn = move || {
        let mut cmd = Command::new(&exe);
        cmd.arg("--project").arg(&root).arg("watch-worker");
        WatchSession::spawn(&mut cmd)
    };

    let rebuild_root = project.root.clone();
    let config = project.config.clone();
    let locks = project.locks.clone();
    let rebuild = move || full_rebuild(&rebuild_root, &config, &locks);

    let mut supervisor =
        WatchSupervisor::new(spawn, rebuild, StopPolicy::from_config(&project.config.watch));
    supervisor.subscribe(Box::new(ConsoleSink::new()));
    supervisor.print_help();

    let mut keys = key_source()?;
    let mut chain = default_chain();
    let result = run_supervisor(&mut supervisor, &mut chain, keys.as_mut());
    drop(keys);
    result.map_err(|e| e.to_string())?;
    Ok(EXIT_SUCCESS)
}
