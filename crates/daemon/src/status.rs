//! Periodic status-file writer.
//!
//! The file lists, per sync, the queued delays and exclude patterns,
//! followed by the watch registry. It is rewritten in place at most once
//! per interval.

use std::io::{self, Write};
use std::path::PathBuf;

use mirror_core::{Deadline, Ticks};
use mirror_engine::{Sync, WatchRegistry};
use mirror_logging::mirror_debug;

/// Writes the status file when its interval has elapsed.
#[derive(Debug)]
pub struct StatusWriter {
    path: PathBuf,
    interval_secs: u64,
    last: Option<Ticks>,
}

impl StatusWriter {
    /// Creates a writer for `path`, rewriting at most every
    /// `interval_secs` seconds.
    #[must_use]
    pub fn new(path: PathBuf, interval_secs: u64) -> Self {
        Self {
            path,
            interval_secs,
            last: None,
        }
    }

    /// When the next rewrite is due; immediate before the first write.
    #[must_use]
    pub fn next_due(&self) -> Deadline {
        match self.last {
            None => Deadline::Immediate,
            Some(last) => Deadline::At(last.add_secs(self.interval_secs)),
        }
    }

    /// Rewrites the file when due; returns whether a write happened.
    pub fn write_if_due(
        &mut self,
        now: Ticks,
        syncs: &[Sync],
        registry: &WatchRegistry,
    ) -> io::Result<bool> {
        if !self.next_due().is_due(now) {
            return Ok(false);
        }
        let mut out = Vec::new();
        render(&mut out, syncs, registry)?;
        std::fs::write(&self.path, &out)?;
        self.last = Some(now);
        mirror_debug!(Status, "status file rewritten ({} bytes)", out.len());
        Ok(true)
    }
}

fn render(out: &mut Vec<u8>, syncs: &[Sync], registry: &WatchRegistry) -> io::Result<()> {
    for sync in syncs {
        sync.status_report(out)?;
        writeln!(out)?;
    }
    writeln!(out, "Watching {} directories", registry.len())?;
    for (wd, path) in registry.iter() {
        writeln!(out, "  {wd}: {path}")?;
    }
    Ok(())
}
