//! Watch-descriptor bookkeeping and kernel event dispatch.
//!
//! The registry keeps the bidirectional `wd <-> absolute path` mapping that
//! turns the flat kernel stream into tree positions. Directory paths are
//! stored with a trailing slash so composing a child path is a plain
//! concatenation.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use mirror_core::Ticks;
use mirror_logging::mirror_debug;

use crate::event::EventKind;
use crate::monitor::{Monitor, MonitorEvent, Wd};
use crate::sync::Sync;

/// Bidirectional map between watch descriptors and absolute directory
/// paths.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    by_wd: BTreeMap<Wd, String>,
    by_path: HashMap<String, Wd>,
}

impl WatchRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute directory path bound to `wd`, with trailing slash.
    #[must_use]
    pub fn path_of(&self, wd: Wd) -> Option<&str> {
        self.by_wd.get(&wd).map(String::as_str)
    }

    /// Watch descriptor bound to an absolute directory path.
    #[must_use]
    pub fn wd_of(&self, path: &str) -> Option<Wd> {
        self.by_path.get(path).copied()
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_wd.len()
    }

    /// Whether no watch is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_wd.is_empty()
    }

    /// Iterates bindings in descriptor order (used by the status file).
    pub fn iter(&self) -> impl Iterator<Item = (Wd, &str)> {
        self.by_wd.iter().map(|(wd, path)| (*wd, path.as_str()))
    }

    /// Binds a sync's root: installs the recursive watch without raising
    /// events (the startup blanket covers the initial transfer).
    pub fn add_sync(
        &mut self,
        monitor: &mut dyn Monitor,
        syncs: &mut [Sync],
        index: usize,
        now: Ticks,
    ) {
        let root = Arc::clone(syncs[index].config()).source.clone();
        self.add_watch(monitor, syncs, &root, true, None, now);
    }

    /// Installs a watch on `path` (absolute, trailing slash), optionally
    /// recursing into subdirectories and synthesizing `Create` events into
    /// sync `raise.0` stamped with `raise.1`.
    ///
    /// A failing watch install is logged and tolerated; the tree stays
    /// partially covered.
    pub fn add_watch(
        &mut self,
        monitor: &mut dyn Monitor,
        syncs: &mut [Sync],
        path: &str,
        recurse: bool,
        raise: Option<(usize, Ticks)>,
        now: Ticks,
    ) {
        let wd = match monitor.add_watch(Path::new(path)) {
            Ok(wd) => wd,
            Err(error) => {
                tracing::warn!("cannot add watch on {path}: {error}");
                return;
            }
        };
        if let Some(old) = self.by_wd.insert(wd, path.to_string()) {
            if old != path {
                // The kernel recycled the descriptor after the old
                // directory disappeared.
                mirror_debug!(Monitor, "wd {wd} recycled from {old} to {path}");
                self.by_path.remove(&old);
            }
        }
        self.by_path.insert(path.to_string(), wd);
        mirror_debug!(Monitor, "watching {path} as wd {wd}");

        if !recurse && raise.is_none() {
            return;
        }
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!("cannot enumerate {path}: {error}");
                return;
            }
        };
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!("skipping non-UTF-8 name under {path}");
                continue;
            };
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let child = if is_dir {
                format!("{path}{name}/")
            } else {
                format!("{path}{name}")
            };
            if is_dir && recurse {
                self.add_watch(monitor, syncs, &child, true, raise, now);
            }
            if let Some((index, time)) = raise {
                let source = Arc::clone(syncs[index].config()).source.clone();
                if let Some(rel) = child.strip_prefix(source.as_str()) {
                    syncs[index].delay(
                        EventKind::Create,
                        Some(time),
                        now,
                        rel.to_string(),
                        None,
                    );
                }
            }
        }
    }

    /// Drops the binding for `path`. `ask_kernel` is false when the watch
    /// is moving across a rename and the kernel keeps it alive.
    pub fn remove_watch(&mut self, monitor: &mut dyn Monitor, path: &str, ask_kernel: bool) {
        let Some(wd) = self.by_path.remove(path) else {
            return;
        };
        if ask_kernel {
            if let Err(error) = monitor.remove_watch(wd) {
                mirror_debug!(Monitor, "kernel watch removal for {path} failed: {error}");
            }
        }
        self.by_wd.remove(&wd);
        mirror_debug!(Monitor, "unwatched {path} (wd {wd})");
    }
}

/// Translates one raw kernel event into per-sync relative events and keeps
/// the recursive watches in step with directory creations, deletions and
/// renames.
pub fn dispatch_event(
    registry: &mut WatchRegistry,
    monitor: &mut dyn Monitor,
    syncs: &mut [Sync],
    event: &MonitorEvent,
    now: Ticks,
) {
    let suffix = if event.is_dir { "/" } else { "" };
    let mut abs = registry
        .path_of(event.wd)
        .map(|dir| format!("{dir}{}{suffix}", event.name));
    let mut abs2 = match (event.wd2, event.name2.as_deref()) {
        (Some(wd2), Some(name2)) => registry
            .path_of(wd2)
            .map(|dir| format!("{dir}{name2}{suffix}")),
        _ => None,
    };

    let mut kind = event.kind;
    if kind == EventKind::Move {
        match (abs.is_some(), abs2.is_some()) {
            (true, true) => {}
            (false, true) => {
                // Origin watch already vanished: the entry simply appears.
                kind = EventKind::Create;
                abs = abs2.take();
            }
            (true, false) => {
                // Destination unknown: the entry simply disappears.
                kind = EventKind::Delete;
                abs2 = None;
            }
            (false, false) => {
                mirror_debug!(Monitor, "rename on unknown descriptors dropped");
                return;
            }
        }
    } else if abs.is_none() {
        // Expected race: events still in flight for a deleted subtree.
        mirror_debug!(Monitor, "event on unknown wd {} dropped", event.wd);
        return;
    }
    let Some(abs) = abs else { return };

    for index in 0..syncs.len() {
        let config = Arc::clone(syncs[index].config());
        let rel = abs
            .strip_prefix(config.source.as_str())
            .map(str::to_string);
        let rel2 = abs2
            .as_deref()
            .and_then(|dest| dest.strip_prefix(config.source.as_str()))
            .map(str::to_string);

        // Per-sync retype: a rename crossing the sync boundary degrades to
        // the half that stays inside.
        let routed = match kind {
            EventKind::Move => match (rel, rel2) {
                (Some(origin), Some(dest)) => Some((EventKind::Move, origin, Some(dest))),
                (Some(origin), None) => Some((EventKind::Delete, origin, None)),
                (None, Some(dest)) => Some((EventKind::Create, dest, None)),
                (None, None) => None,
            },
            other => rel.map(|origin| (other, origin, None)),
        };
        let Some((routed_kind, routed_path, routed_path2)) = routed else {
            continue;
        };
        syncs[index].delay(
            routed_kind,
            Some(event.time),
            now,
            routed_path,
            routed_path2,
        );

        if !event.is_dir || !config.track_subdirs {
            continue;
        }
        match routed_kind {
            EventKind::Create => {
                let target = if kind == EventKind::Move {
                    abs2.clone().unwrap_or_else(|| abs.clone())
                } else {
                    abs.clone()
                };
                registry.add_watch(
                    monitor,
                    syncs,
                    &target,
                    true,
                    Some((index, event.time)),
                    now,
                );
            }
            EventKind::Delete => {
                registry.remove_watch(monitor, &abs, true);
            }
            EventKind::Move => {
                registry.remove_watch(monitor, &abs, false);
                if let Some(dest) = abs2.clone() {
                    registry.add_watch(
                        monitor,
                        syncs,
                        &dest,
                        true,
                        Some((index, event.time)),
                        now,
                    );
                }
            }
            _ => {}
        }
    }
}
