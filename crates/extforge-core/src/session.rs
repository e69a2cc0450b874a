use crate::CoreError;
use extforge_schema::WatchSection;
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// ETX, the byte a terminal sends for Ctrl-C.
pub const INTERRUPT: u8 = 0x03;

const POLL_STEP: Duration = Duration::from_millis(10);

/// Bounds on how long a graceful stop may take before the child is killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Pause after the interrupt byte before the first liveness check.
    pub grace_period: Duration,
    /// Further wait for a voluntary exit before killing.
    pub kill_timeout: Duration,
}

impl StopPolicy {
    pub fn from_config(watch: &WatchSection) -> Self {
        Self {
            grace_period: watch.grace_period(),
            kill_timeout: watch.kill_timeout(),
        }
    }

    /// Interrupt, wait only the grace period, then kill.
    #[must_use]
    pub fn forced(self) -> Self {
        Self {
            kill_timeout: Duration::ZERO,
            ..self
        }
    }
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self::from_config(&WatchSection::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// The child exited on its own after the interrupt.
    Graceful,
    /// The child outlived the policy and was killed.
    Killed,
    /// The child had already exited before the stop began.
    AlreadyExited,
}

/// One live watch subprocess and the pipe to its stdin.
#[derive(Debug)]
pub struct WatchSession {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl WatchSession {
    /// Spawn `command` with a piped stdin. Stdout and stderr are inherited
    /// unless the command configures them.
    pub fn spawn(command: &mut Command) -> Result<Self, CoreError> {
        let mut child = command.stdin(Stdio::piped()).spawn()?;
        let stdin = child.stdin.take();
        debug!("watch session started (pid {})", child.id());
        Ok(Self { child, stdin })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn is_running(&mut self) -> Result<bool, CoreError> {
        Ok(self.child.try_wait()?.is_none())
    }

    /// Write raw bytes to the child's stdin. A closed pipe is not an error.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), CoreError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(());
        };
        match stdin.write_all(bytes).and_then(|()| stdin.flush()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                self.stdin = None;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Interrupt the child through its stdin, wait within `policy`, kill it
    /// if it is still alive, and always reap it before returning.
    pub fn stop(mut self, policy: &StopPolicy) -> Result<StopOutcome, CoreError> {
        if self.child.try_wait()?.is_some() {
            return Ok(StopOutcome::AlreadyExited);
        }
        let pid = self.child.id();

        self.send(&[INTERRUPT])?;
        // EOF as well, for children that stop on a closed stdin
        self.stdin = None;
        thread::sleep(policy.grace_period);

        let deadline = Instant::now() + policy.kill_timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!("watch session {pid} exited: {status}");
                return Ok(StopOutcome::Graceful);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(POLL_STEP));
        }

        warn!("watch session {pid} did not exit after interrupt, killing");
        match self.child.kill() {
            Ok(()) => {}
            // exited between the last poll and the kill
            Err(e) if e.kind() == ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        self.child.wait()?;
        Ok(StopOutcome::Killed)
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
