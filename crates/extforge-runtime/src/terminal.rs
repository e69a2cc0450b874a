/// Both stdin and stderr are terminals: keypress mode and spinners make sense.
pub fn is_interactive_terminal() -> bool {
    is_tty(libc::STDIN_FILENO) && is_tty(libc::STDERR_FILENO)
}

pub fn stderr_is_terminal() -> bool {
    is_tty(libc::STDERR_FILENO)
}

#[allow(unsafe_code)]
fn is_tty(fd: libc::c_int) -> bool {
    // SAFETY: isatty() only inspects the descriptor.
    unsafe { libc::isatty(fd) != 0 }
}
