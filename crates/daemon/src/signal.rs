//! Async-signal-safe flag plumbing.
//!
//! Handlers only set atomics. They are installed without `SA_RESTART` so a
//! pending signal interrupts the main loop's `poll(2)` and is observed on
//! the next iteration.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static FADE_REQUESTED: AtomicBool = AtomicBool::new(false);
static CHILD_EXITED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_fade(_signum: libc::c_int) {
    FADE_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn handle_child(_signum: libc::c_int) {
    CHILD_EXITED.store(true, Ordering::SeqCst);
}

fn install_handler(signum: libc::c_int, handler: extern "C" fn(libc::c_int)) -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signum, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Installs the TERM/HUP fade handlers and the SIGCHLD reap hint.
pub fn install() -> io::Result<()> {
    install_handler(libc::SIGTERM, handle_fade)?;
    install_handler(libc::SIGHUP, handle_fade)?;
    install_handler(libc::SIGCHLD, handle_child)?;
    Ok(())
}

/// Consumes a pending fade request.
pub fn take_fade_request() -> bool {
    FADE_REQUESTED.swap(false, Ordering::SeqCst)
}

/// Consumes the child-exited hint.
#[allow(dead_code)]
pub fn take_child_flag() -> bool {
    CHILD_EXITED.swap(false, Ordering::SeqCst)
}
