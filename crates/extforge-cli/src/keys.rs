//! Keypress sources for the `dev` supervisor.
//!
//! On a terminal, stdin is switched to raw mode with crossterm so single keys
//! arrive without Enter and Ctrl-C is read as a key instead of a signal.
//! Otherwise stdin is read byte by byte on a background thread.

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use extforge_core::{shutdown_requested, CoreError, Key, KeySource, INTERRUPT};
use extforge_runtime::is_interactive_terminal;
use std::io::Read;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::debug;

const POLL: Duration = Duration::from_millis(100);

pub fn key_source() -> Result<Box<dyn KeySource>, String> {
    if is_interactive_terminal() {
        Ok(Box::new(TerminalKeys::enable()?))
    } else {
        debug!("stdin is not a terminal, reading keys from the byte stream");
        Ok(Box::new(StdinKeys::spawn()))
    }
}

/// Raw-mode terminal input. The previous mode is restored on drop.
pub struct TerminalKeys;

impl TerminalKeys {
    fn enable() -> Result<Self, String> {
        enable_raw_mode().map_err(|e| format!("failed to enable raw mode: {e}"))?;
        keep_output_processing();
        Ok(Self)
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

impl KeySource for TerminalKeys {
    fn next_key(&mut self) -> Result<Option<Key>, CoreError> {
        loop {
            if shutdown_requested() {
                return Ok(Some(Key::Interrupt));
            }
            if !event::poll(POLL)? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(k) = map_key(key.code, key.modifiers) {
                    return Ok(Some(k));
                }
            }
        }
    }
}

fn map_key(code: KeyCode, modifiers: KeyModifiers) -> Option<Key> {
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Key::Interrupt),
        KeyCode::Char(c) => Some(Key::Char(c)),
        KeyCode::Enter => Some(Key::Char('\n')),
        KeyCode::Esc => Some(Key::Char('\u{1b}')),
        _ => None,
    }
}

/// Raw mode also turns off output post-processing, which would make the
/// worker's `\n`-terminated lines stair-step. Turn it back on.
fn keep_output_processing() {
    if let Err(e) = enable_output_processing(libc::STDIN_FILENO) {
        debug!("could not restore output processing: {e}");
    }
}

#[allow(unsafe_code)]
fn enable_output_processing(fd: libc::c_int) -> std::io::Result<()> {
    // SAFETY: termios is plain old data and is filled by tcgetattr before use.
    unsafe {
        let mut attrs: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut attrs) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        attrs.c_oflag |= libc::OPOST;
        if libc::tcsetattr(fd, libc::TCSANOW, &attrs) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Keys from a non-terminal stdin. EOF ends the key stream.
pub struct StdinKeys {
    rx: Receiver<Key>,
}

impl StdinKeys {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buf = [0u8; 64];
            loop {
                let n = match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                for key in buf[..n].iter().filter_map(|b| map_byte(*b)) {
                    if tx.send(key).is_err() {
                        return;
                    }
                }
            }
        });
        Self { rx }
    }
}

impl KeySource for StdinKeys {
    fn next_key(&mut self) -> Result<Option<Key>, CoreError> {
        loop {
            match self.rx.recv_timeout(POLL) {
                Ok(key) => return Ok(Some(key)),
                Err(RecvTimeoutError::Timeout) => {
                    if shutdown_requested() {
                        return Ok(Some(Key::Interrupt));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

fn map_byte(byte: u8) -> Option<Key> {
    match byte {
        INTERRUPT => Some(Key::Interrupt),
        b'\n' | b'\r' => None,
        b if b.is_ascii_graphic() || b == b' ' => Some(Key::Char(char::from(b))),
        _ => None,
    }
}
