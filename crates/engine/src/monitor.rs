//! Kernel event facility seam.

use std::io;
use std::path::Path;

use mirror_core::Ticks;

use crate::event::EventKind;

/// Opaque watch descriptor handed out by the kernel facility.
///
/// Descriptors are recycled by the kernel after a watched directory
/// disappears; the registry never assumes stability across deletions.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Wd(pub i32);

impl std::fmt::Display for Wd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The watch side of the kernel facility.
pub trait Monitor {
    /// Installs a watch on a directory.
    fn add_watch(&mut self, path: &Path) -> io::Result<Wd>;

    /// Removes a watch. Called only when the kernel still holds it; a
    /// rename-driven rebinding skips the call.
    fn remove_watch(&mut self, wd: Wd) -> io::Result<()>;
}

/// One raw event as delivered by the kernel facility.
///
/// `wd2`/`name2` carry the destination half of a rename when the kernel
/// paired both halves.
#[derive(Clone, Debug)]
pub struct MonitorEvent {
    /// Change classification; `Move` when both halves were paired.
    pub kind: EventKind,
    /// Watch descriptor of the directory containing the change.
    pub wd: Wd,
    /// Whether the subject is a directory.
    pub is_dir: bool,
    /// Kernel timestamp of the observation.
    pub time: Ticks,
    /// Base name of the changed entry inside the watched directory.
    pub name: String,
    /// Destination directory descriptor for renames.
    pub wd2: Option<Wd>,
    /// Destination base name for renames.
    pub name2: Option<String>,
}

impl MonitorEvent {
    /// Convenience constructor for a single-path event.
    #[must_use]
    pub fn simple(kind: EventKind, wd: Wd, is_dir: bool, time: Ticks, name: &str) -> Self {
        Self {
            kind,
            wd,
            is_dir,
            time,
            name: name.to_string(),
            wd2: None,
            name2: None,
        }
    }

    /// Convenience constructor for a paired rename.
    #[must_use]
    pub fn renamed(
        wd: Wd,
        name: &str,
        wd2: Wd,
        name2: &str,
        is_dir: bool,
        time: Ticks,
    ) -> Self {
        Self {
            kind: EventKind::Move,
            wd,
            is_dir,
            time,
            name: name.to_string(),
            wd2: Some(wd2),
            name2: Some(name2.to_string()),
        }
    }
}
