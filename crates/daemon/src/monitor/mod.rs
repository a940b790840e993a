//! Kernel event facilities.
//!
//! The engine only sees the [`Monitor`] trait; the daemon loop additionally
//! needs a pollable file descriptor and a way to drain raw events, which
//! [`PollableMonitor`] provides. inotify is the production facility on
//! Linux.

use std::io;

use mirror_core::Ticks;
use mirror_engine::{Monitor, MonitorEvent};
use thiserror::Error;

#[cfg(target_os = "linux")]
mod inotify;
#[cfg(target_os = "linux")]
pub use inotify::InotifyMonitor;

/// Names accepted by `-monitor`.
pub const SUPPORTED: &[&str] = &["inotify"];

/// Failure selecting or initialising the event facility.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// `-monitor` named a facility this build does not provide.
    #[error("unknown monitor '{name}'; supported: inotify")]
    Unknown {
        /// The rejected name.
        name: String,
    },
    /// The facility could not be initialised.
    #[error("cannot initialise {name}: {source}")]
    Init {
        /// Facility name.
        name: &'static str,
        /// Underlying failure.
        source: io::Error,
    },
    /// No facility exists for this platform.
    #[error("no event facility is available on this platform")]
    Unsupported,
}

/// A monitor the main loop can block on.
pub trait PollableMonitor: Monitor {
    /// File descriptor to poll for readability.
    fn fd(&self) -> i32;

    /// Drains every queued raw event, stamping them with `now`.
    fn read_events(&mut self, now: Ticks) -> io::Result<Vec<MonitorEvent>>;

    /// Whether the kernel reported an event-queue overflow.
    fn overflowed(&self) -> bool;
}

/// Creates the facility selected with `-monitor`, defaulting to inotify.
#[cfg(target_os = "linux")]
pub fn create(name: Option<&str>) -> Result<InotifyMonitor, MonitorError> {
    match name {
        None | Some("inotify") => InotifyMonitor::new().map_err(|source| MonitorError::Init {
            name: "inotify",
            source,
        }),
        Some(other) => Err(MonitorError::Unknown {
            name: other.to_string(),
        }),
    }
}

/// Stub for platforms without a kernel facility; creation always fails.
#[cfg(not(target_os = "linux"))]
pub struct UnsupportedMonitor;

#[cfg(not(target_os = "linux"))]
impl Monitor for UnsupportedMonitor {
    fn add_watch(&mut self, _path: &std::path::Path) -> io::Result<mirror_engine::Wd> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "no facility"))
    }

    fn remove_watch(&mut self, _wd: mirror_engine::Wd) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "no facility"))
    }
}

#[cfg(not(target_os = "linux"))]
impl PollableMonitor for UnsupportedMonitor {
    fn fd(&self) -> i32 {
        -1
    }

    fn read_events(&mut self, _now: Ticks) -> io::Result<Vec<MonitorEvent>> {
        Ok(Vec::new())
    }

    fn overflowed(&self) -> bool {
        false
    }
}

/// Creates the facility selected with `-monitor`.
#[cfg(not(target_os = "linux"))]
pub fn create(name: Option<&str>) -> Result<UnsupportedMonitor, MonitorError> {
    match name {
        Some(other) if other != "inotify" => Err(MonitorError::Unknown {
            name: other.to_string(),
        }),
        _ => Err(MonitorError::Unsupported),
    }
}
