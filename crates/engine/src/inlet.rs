//! The narrow view an action handler gets of its sync.
//!
//! Handlers never touch the FIFO directly: they read pending work as
//! [`Event`] / [`EventList`] snapshots and act through the [`Inlet`], which
//! validates every mutation against the live queue before applying it.

use std::collections::HashMap;
use std::sync::Arc;

use mirror_core::Ticks;
use mirror_filters::{ExcludeError, Excludes};
use mirror_logging::mirror_debug;

use crate::delay::{Delay, DelayId, DelayStatus};
use crate::error::EngineError;
use crate::event::{EventKind, MoveSide};
use crate::host::{Pid, ProcessHost, SpawnCommand};
use crate::queue::DelayQueue;
use crate::sync::SyncConfig;

/// Read-only snapshot of one queued delay.
///
/// The snapshot stays valid as a description after its delay leaves the
/// FIFO, but mutating calls taking it ([`Inlet::spawn`],
/// [`Inlet::discard_event`]) check liveness by id first.
#[derive(Clone, Debug)]
pub struct Event {
    config: Arc<SyncConfig>,
    id: DelayId,
    kind: EventKind,
    path: String,
    path2: Option<String>,
    status: DelayStatus,
    move_side: MoveSide,
}

impl Event {
    pub(crate) fn from_delay(delay: &Delay, config: Arc<SyncConfig>) -> Self {
        let move_side = if delay.kind() == EventKind::Move {
            MoveSide::Fr
        } else {
            MoveSide::None
        };
        Self {
            config,
            id: delay.id(),
            kind: delay.kind(),
            path: delay.path().to_string(),
            path2: delay.path2().map(str::to_string),
            status: delay.status(),
            move_side,
        }
    }

    /// Identity of the underlying delay.
    #[must_use]
    pub const fn id(&self) -> DelayId {
        self.id
    }

    /// Change classification.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Delay status at snapshot time.
    #[must_use]
    pub const fn status(&self) -> DelayStatus {
        self.status
    }

    /// Which half of a rename this view represents.
    #[must_use]
    pub const fn move_side(&self) -> MoveSide {
        self.move_side
    }

    /// The destination half of a rename event.
    #[must_use]
    pub fn counterpart(&self) -> Option<Event> {
        let path2 = self.path2.clone()?;
        Some(Self {
            config: Arc::clone(&self.config),
            id: self.id,
            kind: self.kind,
            path: path2,
            path2: None,
            status: self.status,
            move_side: MoveSide::To,
        })
    }

    /// Event batches report `true`; single events are not lists.
    #[must_use]
    pub const fn is_list(&self) -> bool {
        false
    }

    /// Whether the path names a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Sync-root-relative path; directories keep their trailing slash.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rename destination, present on the origin view of a move.
    #[must_use]
    pub fn path2(&self) -> Option<&str> {
        self.path2.as_deref()
    }

    /// Relative path without a trailing slash.
    #[must_use]
    pub fn pathname(&self) -> &str {
        self.path.strip_suffix('/').unwrap_or(&self.path)
    }

    /// Base name, keeping the trailing slash of directories.
    #[must_use]
    pub fn name(&self) -> &str {
        let start = match self.pathname().rfind('/') {
            Some(slash) => slash + 1,
            None => 0,
        };
        &self.path[start..]
    }

    /// Base name without a trailing slash.
    #[must_use]
    pub fn basename(&self) -> &str {
        self.name().strip_suffix('/').unwrap_or_else(|| self.name())
    }

    /// Relative parent directory, with trailing slash; empty at the root.
    #[must_use]
    pub fn pathdir(&self) -> &str {
        match self.pathname().rfind('/') {
            Some(slash) => &self.path[..=slash],
            None => "",
        }
    }

    /// The sync configuration behind this event.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Absolute source root, with trailing slash.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.config.source
    }

    /// Absolute source path, preserving the trailing-slash policy.
    #[must_use]
    pub fn source_path(&self) -> String {
        format!("{}{}", self.config.source, self.path)
    }

    /// Absolute source path without a trailing slash.
    #[must_use]
    pub fn source_pathname(&self) -> String {
        format!("{}{}", self.config.source, self.pathname())
    }

    /// Target specification, with trailing slash.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.config.target
    }

    /// Target-side path, preserving the trailing-slash policy.
    #[must_use]
    pub fn target_path(&self) -> String {
        format!("{}{}", self.config.target, self.path)
    }

    /// Target-side path without a trailing slash.
    #[must_use]
    pub fn target_pathname(&self) -> String {
        format!("{}{}", self.config.target, self.pathname())
    }
}

/// Snapshot of a batch of delays extracted with [`Inlet::get_events`].
#[derive(Clone, Debug)]
pub struct EventList {
    config: Arc<SyncConfig>,
    ids: Vec<DelayId>,
    entries: Vec<(EventKind, String, Option<String>)>,
}

impl EventList {
    pub(crate) fn from_delays(delays: &[&Delay], config: Arc<SyncConfig>) -> Self {
        Self {
            config,
            ids: delays.iter().map(|delay| delay.id()).collect(),
            entries: delays
                .iter()
                .map(|delay| {
                    (
                        delay.kind(),
                        delay.path().to_string(),
                        delay.path2().map(str::to_string),
                    )
                })
                .collect(),
        }
    }

    /// Event batches report `true`.
    #[must_use]
    pub const fn is_list(&self) -> bool {
        true
    }

    /// Number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Delay identities in FIFO order.
    #[must_use]
    pub fn ids(&self) -> &[DelayId] {
        &self.ids
    }

    /// The sync configuration behind this batch.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Iterates the `(kind, path, path2)` triples of the batch in FIFO
    /// order.
    pub fn entries(&self) -> impl Iterator<Item = (EventKind, &str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(kind, path, path2)| (*kind, path.as_str(), path2.as_deref()))
    }

    /// The flat list of affected paths: each event contributes its path and,
    /// for renames, its destination.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::with_capacity(self.entries.len());
        for (_, path, path2) in &self.entries {
            paths.push(path.clone());
            if let Some(path2) = path2 {
                paths.push(path2.clone());
            }
        }
        paths
    }

    /// Like [`EventList::paths`], with `mutator` rewriting each
    /// `(kind, path, path2)` triple into the paths it contributes.
    #[must_use]
    pub fn paths_with<F>(&self, mutator: F) -> Vec<String>
    where
        F: Fn(EventKind, &str, Option<&str>) -> Vec<String>,
    {
        let mut paths = Vec::with_capacity(self.entries.len());
        for (kind, path, path2) in &self.entries {
            paths.extend(mutator(*kind, path, path2.as_deref()));
        }
        paths
    }
}

/// A single event or a batch, as handed to spawn and collect callbacks.
#[derive(Clone, Debug)]
pub enum Agent {
    /// One delay.
    Event(Event),
    /// A batch extracted with [`Inlet::get_events`].
    List(EventList),
}

impl Agent {
    /// Whether this agent is a batch.
    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Delay identities covered by the agent.
    #[must_use]
    pub fn ids(&self) -> Vec<DelayId> {
        match self {
            Self::Event(event) => vec![event.id()],
            Self::List(list) => list.ids().to_vec(),
        }
    }

    /// The single event, when not a batch.
    #[must_use]
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            Self::List(_) => None,
        }
    }

    /// The batch, when not a single event.
    #[must_use]
    pub fn as_list(&self) -> Option<&EventList> {
        match self {
            Self::Event(_) => None,
            Self::List(list) => Some(list),
        }
    }
}

/// Mutable facade over one sync, valid for the duration of one handler
/// callback.
pub struct Inlet<'a> {
    pub(crate) config: &'a Arc<SyncConfig>,
    pub(crate) queue: &'a mut DelayQueue,
    pub(crate) excludes: &'a mut Excludes,
    pub(crate) processes: &'a mut HashMap<Pid, Vec<DelayId>>,
    pub(crate) host: &'a mut dyn ProcessHost,
    pub(crate) now: Ticks,
}

impl Inlet<'_> {
    /// The sync configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        self.config
    }

    /// The next delay eligible to run, if any.
    #[must_use]
    pub fn get_event(&mut self) -> Option<Event> {
        let id = self.queue.next_ready(self.now)?;
        let delay = self.queue.get(id)?;
        Some(Event::from_delay(delay, Arc::clone(self.config)))
    }

    /// Extracts the batch of runnable delays satisfying `predicate`.
    #[must_use]
    pub fn get_events(&mut self, predicate: Option<&dyn Fn(&Delay) -> bool>) -> EventList {
        let ids = self.queue.ready_batch(predicate);
        let entries = ids
            .iter()
            .filter_map(|id| self.queue.get(*id))
            .map(|delay| {
                (
                    delay.kind(),
                    delay.path().to_string(),
                    delay.path2().map(str::to_string),
                )
            })
            .collect();
        EventList {
            config: Arc::clone(self.config),
            ids,
            entries,
        }
    }

    /// Launches a child working on `agent` and registers the pid against
    /// its delays, which become active.
    pub fn spawn(&mut self, agent: &Agent, command: SpawnCommand) -> Result<Pid, EngineError> {
        let ids = agent.ids();
        for id in &ids {
            if self.queue.get(*id).is_none() {
                return Err(EngineError::StaleEvent { id: id.raw() });
            }
        }
        let pid = self
            .host
            .spawn(&command)
            .map_err(|source| EngineError::Spawn {
                binary: command.binary().to_string_lossy().into_owned(),
                source,
            })?;
        for id in &ids {
            if let Some(delay) = self.queue.get_mut(*id) {
                delay.status = DelayStatus::Active;
            }
        }
        mirror_debug!(
            Exec,
            "spawned pid {pid} ({}) for {} delay(s)",
            command.binary().to_string_lossy(),
            ids.len()
        );
        self.processes.insert(pid, ids);
        Ok(pid)
    }

    /// Drops a waiting delay from the FIFO. Discarding anything but a
    /// waiting delay is logged and ignored.
    pub fn discard_event(&mut self, event: &Event) {
        match self.queue.get(event.id()).map(Delay::status) {
            Some(DelayStatus::Wait) => {
                self.queue.remove(event.id());
                mirror_debug!(Delay, "discarded {}", event.id());
            }
            Some(status) => {
                tracing::warn!("cannot discard {} delay {}", status, event.id());
            }
            None => {
                tracing::warn!("cannot discard vanished delay {}", event.id());
            }
        }
    }

    /// Queues a blanket reconciliation delay.
    pub fn create_blanket_event(&mut self) {
        self.queue.push(
            EventKind::Blanket,
            None,
            self.now,
            String::new(),
            None,
            self.excludes,
            self.config.on_move,
            None,
        );
    }

    /// Adds an exclude pattern to the sync.
    pub fn add_exclude(&mut self, pattern: &str) -> Result<(), ExcludeError> {
        self.excludes.add(pattern)
    }

    /// Removes an exclude pattern from the sync.
    pub fn rm_exclude(&mut self, pattern: &str) {
        self.excludes.remove(pattern);
    }
}
