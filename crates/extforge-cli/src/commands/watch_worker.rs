use super::{Project, EXIT_SUCCESS};
use extforge_core::{spawn_stdin_watch, BuildMode, StopFlag, WatchWorker};
use tracing::info;

/// Body of the `dev` subprocess. It holds no lock of its own (the
/// supervising `dev` process holds `dev`) and stops on ETX or EOF on stdin,
/// or on SIGINT.
pub fn run(project: &Project) -> Result<u8, String> {
    project.check_bundler()?;
    let pipeline = project.pipeline(BuildMode::watch(), false)?;
    let stop = StopFlag::new();
    spawn_stdin_watch(stop.clone());

    let mut worker = WatchWorker::new(pipeline);
    worker.run(&stop).map_err(|e| e.to_string())?;
    info!("watch worker exited");
    Ok(EXIT_SUCCESS)
}
