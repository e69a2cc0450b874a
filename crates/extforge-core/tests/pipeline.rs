//! Pipeline behaviour across instances and together with the lock service.

use extforge_core::{BuildMode, ChannelSink, Pipeline, PipelineEvent, RunOutcome, Step};
use extforge_runtime::MockBundler;
use extforge_schema::{parse_project_str, CommandId};
use extforge_store::{CacheLayout, LockService};
use std::fs;
use std::path::Path;

const CONFIG: &str = r#"
[bundler]
backend = "mock"

[manifest.required]
name = "Reader"
version = "2.0.1"
description = "Reads pages"

[manifest.required.icons]
48 = "icon48.png"

[manifest.targets.chrome]

[manifest.targets.firefox]
"#;

fn write_project(root: &Path) {
    fs::write(root.join("extforge.toml"), CONFIG).unwrap();
    fs::create_dir_all(root.join("src/background")).unwrap();
    fs::write(root.join("src/icon48.png"), [0u8; 4]).unwrap();
    fs::write(
        root.join("src/background/worker.module.ts"),
        "export function start() {}",
    )
    .unwrap();
}

fn pipeline(root: &Path, mode: BuildMode) -> Pipeline {
    Pipeline::with_bundler(
        root,
        parse_project_str(CONFIG).unwrap(),
        mode,
        Box::new(MockBundler::new()),
    )
}

#[test]
fn pipelines_keep_their_own_mode_and_subscribers() {
    let loud_dir = tempfile::tempdir().unwrap();
    let quiet_dir = tempfile::tempdir().unwrap();
    write_project(loud_dir.path());
    write_project(quiet_dir.path());

    let mut loud = pipeline(loud_dir.path(), BuildMode::build());
    let mut quiet = pipeline(quiet_dir.path(), BuildMode::build().silent());
    let (loud_sink, loud_rx) = ChannelSink::new();
    let (quiet_sink, quiet_rx) = ChannelSink::new();
    loud.subscribe(Box::new(loud_sink));
    quiet.subscribe(Box::new(quiet_sink));

    let mut loud_cache = loud.snapshot_cache();
    let mut quiet_cache = quiet.snapshot_cache();
    loud.run(&mut loud_cache).unwrap();
    quiet.run(&mut quiet_cache).unwrap();

    let loud_events: Vec<_> = loud_rx.try_iter().collect();
    let quiet_events: Vec<_> = quiet_rx.try_iter().collect();
    assert!(loud_events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Log { .. })));
    assert!(!quiet_events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Log { .. })));
    // both still report step boundaries
    assert!(quiet_events
        .iter()
        .any(|e| *e == PipelineEvent::StepFinished { step: Step::Manifest }));

    assert!(quiet_dir
        .path()
        .join("build/firefox/background/worker.module.js")
        .is_file());
}

#[test]
fn build_under_command_locks() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let mut pipeline = pipeline(dir.path(), BuildMode::build());

    let layout = CacheLayout::new(&pipeline.paths().cache_dir);
    layout.initialize().unwrap();
    let locks = LockService::new(layout);
    let ids = [CommandId::build(), CommandId::format()];

    let guard = locks.acquire_guard(&ids).unwrap().expect("locks are free");
    assert!(locks.acquire_guard(&ids).unwrap().is_none());

    let mut cache = pipeline.snapshot_cache();
    let outcome = pipeline.run(&mut cache).unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    drop(guard);

    assert!(locks.holder(&CommandId::build()).unwrap().is_none());
    assert!(locks.acquire_guard(&ids).unwrap().is_some());
}

#[test]
fn fresh_cache_instance_sees_committed_baseline() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let mut first = pipeline(dir.path(), BuildMode::build());
    let mut cache = first.snapshot_cache();
    first.run(&mut cache).unwrap();
    drop(first);

    // a later process: new pipeline, new cache handle, same project
    let mut second = pipeline(dir.path(), BuildMode::build());
    let mut cache = second.snapshot_cache();
    assert!(second.run(&mut cache).unwrap().is_skipped());

    fs::write(dir.path().join("src/icon48.png"), [1u8; 8]).unwrap();
    assert!(!second.run(&mut cache).unwrap().is_skipped());
    assert_eq!(
        fs::read(dir.path().join("build/chrome/icon48.png")).unwrap(),
        vec![1u8; 8]
    );
}

#[test]
fn gated_out_run_does_not_clean() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let mut build = pipeline(dir.path(), BuildMode::build());
    let mut cache = build.snapshot_cache();
    build.run(&mut cache).unwrap();
    let extra = dir.path().join("build/chrome/left-over.txt");
    fs::write(&extra, "kept").unwrap();

    let (sink, rx) = ChannelSink::new();
    build.subscribe(Box::new(sink));
    assert!(build.run(&mut cache).unwrap().is_skipped());
    assert!(extra.is_file(), "a skipped run must not clean");
    assert!(!rx.try_iter().any(|e| matches!(
        e,
        PipelineEvent::StepStarted { step: Step::Clean }
    )));

    build.clean(&mut cache).unwrap();
    assert!(!extra.exists());
}
