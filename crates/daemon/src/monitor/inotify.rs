//! inotify backend.
//!
//! Renames arrive as `IN_MOVED_FROM`/`IN_MOVED_TO` pairs sharing a cookie.
//! The two halves are adjacent in the kernel queue, so pairing happens
//! while draining: a held origin half that the very next events do not
//! complete degrades to a deletion (its destination lies outside the
//! watched tree), and a destination half without a held origin becomes a
//! creation.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use mirror_core::Ticks;
use mirror_engine::{EventKind, Monitor, MonitorEvent, Wd};
use mirror_logging::mirror_debug;

use super::PollableMonitor;

const WATCH_MASK: u32 = libc::IN_ATTRIB
    | libc::IN_CLOSE_WRITE
    | libc::IN_CREATE
    | libc::IN_DELETE
    | libc::IN_MOVED_FROM
    | libc::IN_MOVED_TO
    | libc::IN_DONT_FOLLOW
    | libc::IN_ONLYDIR;

/// Read buffer aligned for `struct inotify_event`.
#[repr(align(8))]
struct EventBuffer([u8; 4096]);

/// One unpaired rename origin held during a drain.
struct PendingMove {
    cookie: u32,
    wd: Wd,
    name: String,
    is_dir: bool,
}

/// Production Linux monitor over `inotify(7)`.
pub struct InotifyMonitor {
    fd: i32,
    overflow: bool,
}

impl InotifyMonitor {
    /// Opens a nonblocking, close-on-exec inotify instance.
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd,
            overflow: false,
        })
    }
}

impl Drop for InotifyMonitor {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl Monitor for InotifyMonitor {
    fn add_watch(&mut self, path: &Path) -> io::Result<Wd> {
        let path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "NUL in path"))?;
        let wd = unsafe { libc::inotify_add_watch(self.fd, path.as_ptr(), WATCH_MASK) };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Wd(wd))
    }

    fn remove_watch(&mut self, wd: Wd) -> io::Result<()> {
        let rc = unsafe { libc::inotify_rm_watch(self.fd, wd.0) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl PollableMonitor for InotifyMonitor {
    fn fd(&self) -> i32 {
        self.fd
    }

    fn read_events(&mut self, now: Ticks) -> io::Result<Vec<MonitorEvent>> {
        let mut events = Vec::new();
        let mut pending: Option<PendingMove> = None;
        let mut buffer = EventBuffer([0; 4096]);

        loop {
            let count = unsafe {
                libc::read(
                    self.fd,
                    buffer.0.as_mut_ptr().cast::<libc::c_void>(),
                    buffer.0.len(),
                )
            };
            if count < 0 {
                let error = io::Error::last_os_error();
                if error.kind() == io::ErrorKind::WouldBlock {
                    break;
                }
                flush_pending(&mut pending, &mut events, now);
                return Err(error);
            }
            if count == 0 {
                break;
            }
            self.parse_buffer(&buffer.0[..count as usize], now, &mut pending, &mut events);
        }

        flush_pending(&mut pending, &mut events, now);
        Ok(events)
    }

    fn overflowed(&self) -> bool {
        self.overflow
    }
}

impl InotifyMonitor {
    fn parse_buffer(
        &mut self,
        buffer: &[u8],
        now: Ticks,
        pending: &mut Option<PendingMove>,
        events: &mut Vec<MonitorEvent>,
    ) {
        let header_len = mem::size_of::<libc::inotify_event>();
        let mut offset = 0;
        while offset + header_len <= buffer.len() {
            // The kernel lays out packed inotify_event records; the buffer
            // is 8-aligned and every record length is a multiple of the
            // header alignment.
            #[allow(clippy::cast_ptr_alignment)]
            let header = unsafe {
                &*buffer
                    .as_ptr()
                    .add(offset)
                    .cast::<libc::inotify_event>()
            };
            let name_len = header.len as usize;
            let end = offset + header_len + name_len;
            if end > buffer.len() {
                break;
            }
            let name_bytes = &buffer[offset + header_len..end];
            offset = end;

            if header.mask & libc::IN_Q_OVERFLOW != 0 {
                self.overflow = true;
                continue;
            }
            if header.mask
                & (libc::IN_IGNORED | libc::IN_DELETE_SELF | libc::IN_MOVE_SELF | libc::IN_UNMOUNT)
                != 0
            {
                continue;
            }
            let name = String::from_utf8_lossy(
                name_bytes.split(|&b| b == 0).next().unwrap_or_default(),
            )
            .into_owned();
            if name.is_empty() {
                continue;
            }
            let is_dir = header.mask & libc::IN_ISDIR != 0;
            let wd = Wd(header.wd);

            if header.mask & libc::IN_MOVED_FROM != 0 {
                flush_pending(pending, events, now);
                *pending = Some(PendingMove {
                    cookie: header.cookie,
                    wd,
                    name,
                    is_dir,
                });
                continue;
            }
            if header.mask & libc::IN_MOVED_TO != 0 {
                match pending.take() {
                    Some(held) if held.cookie == header.cookie => {
                        events.push(MonitorEvent::renamed(
                            held.wd, &held.name, wd, &name, is_dir, now,
                        ));
                    }
                    held => {
                        *pending = held;
                        flush_pending(pending, events, now);
                        // Moved in from outside the watched tree.
                        events.push(MonitorEvent::simple(
                            EventKind::Create,
                            wd,
                            is_dir,
                            now,
                            &name,
                        ));
                    }
                }
                continue;
            }

            flush_pending(pending, events, now);
            let kind = if header.mask & libc::IN_ATTRIB != 0 {
                EventKind::Attrib
            } else if header.mask & libc::IN_CLOSE_WRITE != 0 {
                EventKind::Modify
            } else if header.mask & libc::IN_CREATE != 0 {
                EventKind::Create
            } else if header.mask & libc::IN_DELETE != 0 {
                EventKind::Delete
            } else {
                mirror_debug!(Monitor, "ignoring mask {:#x} on {name}", header.mask);
                continue;
            };
            events.push(MonitorEvent::simple(kind, wd, is_dir, now, &name));
        }
    }
}

/// Degrades an unpaired rename origin to a deletion.
fn flush_pending(pending: &mut Option<PendingMove>, events: &mut Vec<MonitorEvent>, now: Ticks) {
    if let Some(held) = pending.take() {
        events.push(MonitorEvent::simple(
            EventKind::Delete,
            held.wd,
            held.is_dir,
            now,
            &held.name,
        ));
    }
}
