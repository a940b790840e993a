//! Minimal syslog(3) sink used when the daemon runs detached without a
//! logfile.

use std::ffi::CString;
use std::io;
use std::sync::Once;

use tracing_subscriber::fmt::MakeWriter;

const IDENT: &[u8] = b"oc-mirrord\0";

static OPENLOG: Once = Once::new();

fn open_once() {
    OPENLOG.call_once(|| unsafe {
        libc::openlog(
            IDENT.as_ptr().cast::<libc::c_char>(),
            libc::LOG_PID,
            libc::LOG_DAEMON,
        );
    });
}

/// `MakeWriter` handing out per-event syslog buffers.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SyslogMakeWriter;

impl<'a> MakeWriter<'a> for SyslogMakeWriter {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogWriter { buffer: Vec::new() }
    }
}

/// Collects one formatted event and submits it on flush.
#[derive(Debug)]
pub(crate) struct SyslogWriter {
    buffer: Vec<u8>,
}

impl SyslogWriter {
    fn submit(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        open_once();
        let line: Vec<u8> = self
            .buffer
            .iter()
            .copied()
            .filter(|&b| b != b'\n' && b != 0)
            .collect();
        self.buffer.clear();
        if let Ok(message) = CString::new(line) {
            unsafe {
                libc::syslog(
                    libc::LOG_INFO,
                    b"%s\0".as_ptr().cast::<libc::c_char>(),
                    message.as_ptr(),
                );
            }
        }
    }
}

impl io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.submit();
        Ok(())
    }
}

impl Drop for SyslogWriter {
    fn drop(&mut self) {
        self.submit();
    }
}
