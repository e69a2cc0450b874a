use crate::session::INTERRUPT;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::debug;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// First SIGINT requests a shutdown, a second one exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(130);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Shared "please stop" bit, set from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Set by [`set`](Self::set) or by a SIGINT caught through [`install_signal_handler`].
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst) || shutdown_requested()
    }
}

/// Read stdin on a background thread; an interrupt byte (`0x03`) or EOF sets `flag`.
/// This is how a supervising process asks a watch worker to stop.
pub fn spawn_stdin_watch(flag: StopFlag) {
    thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 64];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => {
                    debug!("stdin closed, stopping");
                    break;
                }
                Ok(n) if buf[..n].contains(&INTERRUPT) => {
                    debug!("interrupt received on stdin, stopping");
                    break;
                }
                Ok(_) => {}
            }
        }
        flag.set();
    });
}
