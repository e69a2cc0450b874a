//! Interactive control over one long-lived watch subprocess.
//!
//! [`WatchSupervisor`] owns at most one [`WatchSession`] and moves it between
//! `Stopped` and `Running`. Keypresses are read one at a time from a
//! [`KeySource`] and dispatched through a [`KeyChain`], an ordered list of
//! predicate and handler pairs; a handler's return value decides whether the
//! rest of the chain still sees the key.

use crate::events::{Broadcast, LogSink, PipelineEvent};
use crate::lifecycle::{validate_transition, SupervisorState};
use crate::session::{StopOutcome, StopPolicy, WatchSession};
use crate::CoreError;
use tracing::{debug, warn};

pub const HELP_TEXT: &str = "Keypress Commands:
  'q' to quit
  'r' to restart the watcher
  'b' to restart the watcher after a full rebuild

SIGINT [Ctrl-C] Will Force Quit.";

type SpawnFn = Box<dyn FnMut() -> Result<WatchSession, CoreError>>;
type RebuildFn = Box<dyn FnMut() -> Result<(), CoreError>>;

pub struct WatchSupervisor {
    spawn: SpawnFn,
    rebuild: RebuildFn,
    policy: StopPolicy,
    session: Option<WatchSession>,
    state: SupervisorState,
    broadcast: Broadcast,
}

impl WatchSupervisor {
    /// `spawn` starts a new watch subprocess; `rebuild` runs one full build
    /// in the foreground for `full_rebuild_then_restart`.
    pub fn new(
        spawn: impl FnMut() -> Result<WatchSession, CoreError> + 'static,
        rebuild: impl FnMut() -> Result<(), CoreError> + 'static,
        policy: StopPolicy,
    ) -> Self {
        Self {
            spawn: Box::new(spawn),
            rebuild: Box::new(rebuild),
            policy,
            session: None,
            state: SupervisorState::Stopped,
            broadcast: Broadcast::new(),
        }
    }

    pub fn subscribe(&mut self, sink: Box<dyn LogSink>) {
        self.broadcast.subscribe(sink);
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session.as_ref().map(WatchSession::id)
    }

    fn say(&mut self, line: &str) {
        self.broadcast.send(&PipelineEvent::log(line));
    }

    /// Stopped → Running.
    pub fn start(&mut self) -> Result<(), CoreError> {
        validate_transition(self.state, SupervisorState::Running)?;
        self.say("Starting Watcher");
        let session = (self.spawn)()?;
        debug!("supervising watch session {}", session.id());
        self.session = Some(session);
        self.state = SupervisorState::Running;
        Ok(())
    }

    /// Running → Stopped with the graceful protocol. `None` when already stopped.
    pub fn stop(&mut self) -> Result<Option<StopOutcome>, CoreError> {
        self.stop_with(self.policy)
    }

    /// Interrupt, wait the grace period only, then kill.
    pub fn force_quit(&mut self) -> Result<Option<StopOutcome>, CoreError> {
        self.stop_with(self.policy.forced())
    }

    fn stop_with(&mut self, policy: StopPolicy) -> Result<Option<StopOutcome>, CoreError> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        validate_transition(self.state, SupervisorState::Stopped)?;
        self.say("Waiting for Watcher to Exit");
        let outcome = session.stop(&policy);
        self.state = SupervisorState::Stopped;
        let outcome = outcome?;
        if outcome == StopOutcome::Killed {
            warn!("watcher had to be killed");
        }
        Ok(Some(outcome))
    }

    /// Running → Stopped → Running.
    pub fn restart(&mut self) -> Result<(), CoreError> {
        self.stop()?;
        self.start()
    }

    /// Stop, run one full build, start again. A failed build is reported
    /// and the watcher still restarts.
    pub fn full_rebuild_then_restart(&mut self) -> Result<(), CoreError> {
        self.stop()?;
        self.say("Full Rebuild");
        if let Err(e) = (self.rebuild)() {
            self.say(&format!("full rebuild failed: {e}"));
        }
        self.start()
    }

    pub fn print_help(&mut self) {
        for line in HELP_TEXT.lines() {
            self.say(line);
        }
    }
}

impl Drop for WatchSupervisor {
    fn drop(&mut self) {
        if self.session.is_some() {
            let _ = self.force_quit();
        }
    }
}

/// One keypress as the supervisor sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    /// Ctrl-C, delivered as input rather than as a signal.
    Interrupt,
}

/// What the chain does after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Offer the key to the next matching handler.
    Continue,
    /// The key is consumed.
    Halt,
    /// The key is consumed and the supervisor loop ends.
    Quit,
}

type Predicate = Box<dyn Fn(&Key) -> bool>;
type Handler = Box<dyn FnMut(&mut WatchSupervisor, &Key) -> Result<Propagation, CoreError>>;

#[derive(Default)]
pub struct KeyChain {
    entries: Vec<(Predicate, Handler)>,
}

impl KeyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        matches: impl Fn(&Key) -> bool + 'static,
        handler: impl FnMut(&mut WatchSupervisor, &Key) -> Result<Propagation, CoreError> + 'static,
    ) {
        self.entries.push((Box::new(matches), Box::new(handler)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offer `key` to each matching handler in order until one returns
    /// `Halt` or `Quit`.
    pub fn dispatch(
        &mut self,
        supervisor: &mut WatchSupervisor,
        key: &Key,
    ) -> Result<Propagation, CoreError> {
        for (matches, handler) in &mut self.entries {
            if !matches(key) {
                continue;
            }
            match handler(supervisor, key)? {
                Propagation::Continue => {}
                other => return Ok(other),
            }
        }
        Ok(Propagation::Continue)
    }
}

/// Force quit on interrupt, then `q`, `r`, `b`, and help for anything else.
pub fn default_chain() -> KeyChain {
    let mut chain = KeyChain::new();
    chain.push(
        |k| *k == Key::Interrupt,
        |sup, _| {
            sup.force_quit()?;
            Ok(Propagation::Quit)
        },
    );
    chain.push(
        |k| *k == Key::Char('q'),
        |sup, _| {
            sup.stop()?;
            Ok(Propagation::Quit)
        },
    );
    chain.push(
        |k| *k == Key::Char('r'),
        |sup, _| {
            sup.restart()?;
            Ok(Propagation::Halt)
        },
    );
    chain.push(
        |k| *k == Key::Char('b'),
        |sup, _| {
            sup.full_rebuild_then_restart()?;
            Ok(Propagation::Halt)
        },
    );
    chain.push(
        |_| true,
        |sup, _| {
            sup.print_help();
            Ok(Propagation::Halt)
        },
    );
    chain
}

/// Where keypresses come from. `None` means input is closed.
pub trait KeySource {
    fn next_key(&mut self) -> Result<Option<Key>, CoreError>;
}

impl<I> KeySource for I
where
    I: Iterator<Item = Key>,
{
    fn next_key(&mut self) -> Result<Option<Key>, CoreError> {
        Ok(self.next())
    }
}

/// Start the watcher and dispatch keys until a handler quits or input closes.
/// The watcher is always stopped on return.
pub fn run_supervisor(
    supervisor: &mut WatchSupervisor,
    chain: &mut KeyChain,
    keys: &mut dyn KeySource,
) -> Result<(), CoreError> {
    supervisor.start()?;
    let result = loop {
        let key = match keys.next_key() {
            Ok(Some(key)) => key,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        debug!("key {key:?}");
        match chain.dispatch(supervisor, &key) {
            Ok(Propagation::Quit) => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };
    supervisor.stop()?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use std::cell::RefCell;
    use std::process::Command;
    use std::rc::Rc;
    use std::time::Duration;

    fn policy() -> StopPolicy {
        StopPolicy {
            grace_period: Duration::from_millis(10),
            kill_timeout: Duration::from_millis(200),
        }
    }

    fn cat_supervisor() -> (WatchSupervisor, Rc<RefCell<u32>>, Rc<RefCell<u32>>) {
        let spawned = Rc::new(RefCell::new(0));
        let rebuilt = Rc::new(RefCell::new(0));
        let s = Rc::clone(&spawned);
        let r = Rc::clone(&rebuilt);
        let sup = WatchSupervisor::new(
            move || {
                *s.borrow_mut() += 1;
                let mut cmd = Command::new("cat");
                cmd.stdout(std::process::Stdio::null());
                WatchSession::spawn(&mut cmd)
            },
            move || {
                *r.borrow_mut() += 1;
                Ok(())
            },
            policy(),
        );
        (sup, spawned, rebuilt)
    }

    #[test]
    fn start_then_stop() {
        let (mut sup, spawned, _) = cat_supervisor();
        sup.start().unwrap();
        assert_eq!(sup.state(), SupervisorState::Running);
        assert!(sup.session_id().is_some());
        assert_eq!(sup.stop().unwrap(), Some(StopOutcome::Graceful));
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert_eq!(*spawned.borrow(), 1);
    }

    #[test]
    fn double_start_is_rejected() {
        let (mut sup, spawned, _) = cat_supervisor();
        sup.start().unwrap();
        assert!(matches!(
            sup.start(),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(*spawned.borrow(), 1);
    }

    #[test]
    fn stop_when_stopped_is_noop() {
        let (mut sup, _, _) = cat_supervisor();
        assert_eq!(sup.stop().unwrap(), None);
    }

    #[test]
    fn restart_replaces_session() {
        let (mut sup, spawned, _) = cat_supervisor();
        sup.start().unwrap();
        let first = sup.session_id();
        sup.restart().unwrap();
        assert_eq!(*spawned.borrow(), 2);
        assert_ne!(sup.session_id(), first);
        assert_eq!(sup.state(), SupervisorState::Running);
    }

    #[test]
    fn full_rebuild_runs_between_stop_and_start() {
        let (mut sup, spawned, rebuilt) = cat_supervisor();
        sup.start().unwrap();
        sup.full_rebuild_then_restart().unwrap();
        assert_eq!(*rebuilt.borrow(), 1);
        assert_eq!(*spawned.borrow(), 2);
    }

    #[test]
    fn failed_rebuild_still_restarts() {
        let mut sup = WatchSupervisor::new(
            || {
                let mut cmd = Command::new("cat");
                cmd.stdout(std::process::Stdio::null());
                WatchSession::spawn(&mut cmd)
            },
            || Err(CoreError::Io(std::io::Error::other("bundler exploded"))),
            policy(),
        );
        let (sink, rx) = ChannelSink::new();
        sup.subscribe(Box::new(sink));
        sup.start().unwrap();
        sup.full_rebuild_then_restart().unwrap();
        assert_eq!(sup.state(), SupervisorState::Running);
        assert!(rx.try_iter().any(|e| matches!(
            e,
            PipelineEvent::Log { ref line } if line.contains("bundler exploded")
        )));
    }

    #[test]
    fn chain_halts_at_first_consuming_handler() {
        let (mut sup, _, _) = cat_supervisor();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut chain = KeyChain::new();
        let a = Rc::clone(&seen);
        chain.push(
            |_| true,
            move |_, _| {
                a.borrow_mut().push("observer");
                Ok(Propagation::Continue)
            },
        );
        let b = Rc::clone(&seen);
        chain.push(
            |k| *k == Key::Char('x'),
            move |_, _| {
                b.borrow_mut().push("x");
                Ok(Propagation::Halt)
            },
        );
        let c = Rc::clone(&seen);
        chain.push(
            |_| true,
            move |_, _| {
                c.borrow_mut().push("fallback");
                Ok(Propagation::Halt)
            },
        );

        assert_eq!(
            chain.dispatch(&mut sup, &Key::Char('x')).unwrap(),
            Propagation::Halt
        );
        assert_eq!(*seen.borrow(), vec!["observer", "x"]);

        seen.borrow_mut().clear();
        chain.dispatch(&mut sup, &Key::Char('y')).unwrap();
        assert_eq!(*seen.borrow(), vec!["observer", "fallback"]);
    }

    #[test]
    fn default_chain_quits_on_q() {
        let (mut sup, spawned, _) = cat_supervisor();
        let mut chain = default_chain();
        assert_eq!(chain.len(), 5);
        let mut keys = vec![Key::Char('?'), Key::Char('r'), Key::Char('q'), Key::Char('r')].into_iter();
        run_supervisor(&mut sup, &mut chain, &mut keys).unwrap();
        assert_eq!(sup.state(), SupervisorState::Stopped);
        // initial start plus one restart; the key after 'q' is never read
        assert_eq!(*spawned.borrow(), 2);
        assert_eq!(keys.next(), Some(Key::Char('r')));
    }

    #[test]
    fn interrupt_force_quits() {
        let mut sup = WatchSupervisor::new(
            || {
                let mut cmd = Command::new("sleep");
                cmd.arg("30");
                WatchSession::spawn(&mut cmd)
            },
            || Ok(()),
            StopPolicy {
                grace_period: Duration::from_millis(10),
                kill_timeout: Duration::from_secs(60),
            },
        );
        let mut chain = default_chain();
        let start = std::time::Instant::now();
        let mut keys = vec![Key::Interrupt].into_iter();
        run_supervisor(&mut sup, &mut chain, &mut keys).unwrap();
        // the forced path ignores the long kill timeout
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(sup.state(), SupervisorState::Stopped);
    }

    #[test]
    fn unknown_key_prints_help() {
        let (mut sup, _, _) = cat_supervisor();
        let (sink, rx) = ChannelSink::new();
        sup.subscribe(Box::new(sink));
        let mut chain = default_chain();
        let mut keys = vec![Key::Char('z')].into_iter();
        run_supervisor(&mut sup, &mut chain, &mut keys).unwrap();
        let lines: Vec<String> = rx
            .try_iter()
            .filter_map(|e| match e {
                PipelineEvent::Log { line } => Some(line),
                _ => None,
            })
            .collect();
        assert!(lines.iter().any(|l| l.contains("'q' to quit")));
    }
}
