//! Watch supervisor against real subprocesses.

use extforge_core::{
    default_chain, run_supervisor, ChannelSink, CoreError, Key, PipelineEvent, StopOutcome,
    StopPolicy, SupervisorState, WatchSession, WatchSupervisor,
};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn policy(kill_timeout_ms: u64) -> StopPolicy {
    StopPolicy {
        grace_period: Duration::from_millis(25),
        kill_timeout: Duration::from_millis(kill_timeout_ms),
    }
}

fn sleeper() -> Result<WatchSession, CoreError> {
    let mut cmd = Command::new("sleep");
    cmd.arg("30").stdout(Stdio::null());
    WatchSession::spawn(&mut cmd)
}

#[test]
fn stubborn_watcher_is_killed_within_bound() {
    let mut sup = WatchSupervisor::new(sleeper, || Ok(()), policy(300));
    sup.start().unwrap();
    assert_eq!(sup.state(), SupervisorState::Running);

    let start = Instant::now();
    let outcome = sup.stop().unwrap();
    assert_eq!(outcome, Some(StopOutcome::Killed));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(sup.state(), SupervisorState::Stopped);
}

#[test]
fn force_quit_skips_the_timeout() {
    let mut sup = WatchSupervisor::new(sleeper, || Ok(()), policy(10_000));
    sup.start().unwrap();
    let start = Instant::now();
    assert_eq!(sup.force_quit().unwrap(), Some(StopOutcome::Killed));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn keypress_session_restarts_and_rebuilds() {
    let spawns = Arc::new(AtomicU32::new(0));
    let rebuilds = Arc::new(AtomicU32::new(0));
    let spawn_count = Arc::clone(&spawns);
    let rebuild_count = Arc::clone(&rebuilds);

    let mut sup = WatchSupervisor::new(
        move || {
            spawn_count.fetch_add(1, Ordering::SeqCst);
            let mut cmd = Command::new("cat");
            cmd.stdout(Stdio::null());
            WatchSession::spawn(&mut cmd)
        },
        move || {
            rebuild_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        policy(2000),
    );
    let (sink, rx) = ChannelSink::new();
    sup.subscribe(Box::new(sink));

    let mut keys = vec![Key::Char('x'), Key::Char('r'), Key::Char('b'), Key::Char('q')].into_iter();
    run_supervisor(&mut sup, &mut default_chain(), &mut keys).unwrap();

    assert_eq!(spawns.load(Ordering::SeqCst), 3);
    assert_eq!(rebuilds.load(Ordering::SeqCst), 1);
    assert_eq!(sup.state(), SupervisorState::Stopped);

    let lines: Vec<String> = rx
        .try_iter()
        .filter_map(|e| match e {
            PipelineEvent::Log { line } => Some(line),
            _ => None,
        })
        .collect();
    assert!(lines.iter().any(|l| l.contains("Keypress Commands")));
    assert!(lines.iter().any(|l| l == "Full Rebuild"));
    assert_eq!(
        lines.iter().filter(|l| *l == "Starting Watcher").count(),
        3
    );
}
