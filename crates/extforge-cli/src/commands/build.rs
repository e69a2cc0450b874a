use super::format::run_formatter;
use super::{contended, json_pretty, store_err, Project, EXIT_SUCCESS};
use crate::output::ConsoleSink;
use extforge_core::{BuildMode, CoreError, Pipeline, RunOutcome};
use extforge_schema::{CommandId, ProjectConfig};
use extforge_store::{LockService, StoreError};
use std::path::Path;

/// `build`: formatter, gated pipeline run, formatter again.
///
/// `build` and `format` are taken together; `format` is let go while the
/// formatter runs so that it can take the lock itself.
pub fn run(project: &Project, force: bool, no_format: bool, json: bool) -> Result<u8, String> {
    let format = CommandId::format();
    let mut guard = project.lock(&[CommandId::build(), format.clone()])?;
    project.check_bundler()?;

    if !no_format {
        project.release_from(&mut guard, &format)?;
        run_formatter(project, true)?;
        project.relock(&mut guard, &format)?;
    }

    let outcome = build_once(project, force, json)?;

    if !no_format {
        project.release_from(&mut guard, &format)?;
        run_formatter(project, json)?;
    }

    report(&outcome, json)?;
    Ok(EXIT_SUCCESS)
}

fn build_once(project: &Project, force: bool, quiet: bool) -> Result<RunOutcome, String> {
    let mut pipeline = project.pipeline(BuildMode::build(), quiet)?;
    let mut cache = pipeline.snapshot_cache();
    if force {
        cache.reset().map_err(|e| store_err(&e))?;
    }
    pipeline.run(&mut cache).map_err(|e| e.to_string())
}

fn report(outcome: &RunOutcome, json: bool) -> Result<(), String> {
    if json {
        println!("{}", json_pretty(outcome)?);
        return Ok(());
    }
    match outcome {
        RunOutcome::Completed {
            files_copied,
            manifests_written,
            ..
        } => println!(
            "build complete: {files_copied} file(s) copied, {} manifest(s) written",
            manifests_written.len()
        ),
        RunOutcome::Skipped { reason } => println!("build skipped: {reason}"),
    }
    Ok(())
}

/// One forced full build under the `build` lock, for the watch supervisor's
/// rebuild key.
pub fn full_rebuild(
    root: &Path,
    config: &ProjectConfig,
    locks: &LockService,
) -> Result<(), CoreError> {
    let Some(_guard) = locks.acquire_guard(&[CommandId::build()])? else {
        return Err(StoreError::LockFailed(contended(&CommandId::build(), None)).into());
    };
    let mut pipeline = Pipeline::new(root, config.clone(), BuildMode::build())?;
    pipeline.subscribe(Box::new(ConsoleSink::new()));
    let mut cache = pipeline.snapshot_cache();
    cache.reset()?;
    pipeline.run(&mut cache)?;
    Ok(())
}
