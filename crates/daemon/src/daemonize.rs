//! Classic double-fork detachment.

use std::io;

/// Detaches the process from its controlling terminal: fork, new session,
/// fork again, stdio onto `/dev/null`. The working directory is kept, as
/// every configured path was canonicalized at load time.
pub fn detach() -> io::Result<()> {
    unsafe {
        match libc::fork() {
            -1 => return Err(io::Error::last_os_error()),
            0 => {}
            _ => libc::_exit(0),
        }
        if libc::setsid() == -1 {
            return Err(io::Error::last_os_error());
        }
        match libc::fork() {
            -1 => return Err(io::Error::last_os_error()),
            0 => {}
            _ => libc::_exit(0),
        }
        let null = libc::open(b"/dev/null\0".as_ptr().cast::<libc::c_char>(), libc::O_RDWR);
        if null >= 0 {
            libc::dup2(null, libc::STDIN_FILENO);
            libc::dup2(null, libc::STDOUT_FILENO);
            libc::dup2(null, libc::STDERR_FILENO);
            if null > libc::STDERR_FILENO {
                libc::close(null);
            }
        }
    }
    Ok(())
}
