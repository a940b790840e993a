//! One configured source-to-target mirror.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use mirror_core::{Deadline, Ticks};
use mirror_filters::{ExcludeError, Excludes};
use mirror_logging::mirror_debug;

use crate::collapse::CollapseFn;
use crate::delay::{Delay, DelayId, DelayStatus};
use crate::error::EngineError;
use crate::event::EventKind;
use crate::host::{Pid, ProcessHost};
use crate::inlet::{Agent, Event, EventList, Inlet};
use crate::queue::DelayQueue;

/// Immutable per-sync configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// User-facing display name.
    pub name: String,
    /// Absolute source root, with trailing slash.
    pub source: String,
    /// Target specification handed to transfer tools, with trailing slash.
    pub target: String,
    /// Aggregation window in seconds added to event timestamps.
    pub delay_secs: u64,
    /// Upper bound on concurrently running children.
    pub max_processes: usize,
    /// FIFO size past which the alarm gate is bypassed.
    pub max_delays: usize,
    /// Whether the action handler consumes rename events whole.
    pub on_move: bool,
    /// Whether directory events maintain recursive child watches.
    pub track_subdirs: bool,
}

impl SyncConfig {
    /// Starts a builder with the mandatory fields.
    #[must_use]
    pub fn builder(name: &str, source: &str, target: &str) -> SyncConfigBuilder {
        SyncConfigBuilder::new(name, source, target)
    }
}

/// Builder for [`SyncConfig`] carrying the documented defaults.
#[derive(Clone, Debug)]
pub struct SyncConfigBuilder {
    name: String,
    source: String,
    target: String,
    delay_secs: u64,
    max_processes: usize,
    max_delays: usize,
    on_move: bool,
    track_subdirs: bool,
}

impl SyncConfigBuilder {
    /// Creates a builder; `source` and `target` gain a trailing slash if
    /// missing.
    #[must_use]
    pub fn new(name: &str, source: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            source: with_trailing_slash(source),
            target: with_trailing_slash(target),
            delay_secs: 15,
            max_processes: 1,
            max_delays: 1_000,
            on_move: false,
            track_subdirs: true,
        }
    }

    /// Sets the aggregation window.
    #[must_use]
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Sets the process-slot bound.
    #[must_use]
    pub fn max_processes(mut self, max: usize) -> Self {
        self.max_processes = max.max(1);
        self
    }

    /// Sets the FIFO saturation bound.
    #[must_use]
    pub fn max_delays(mut self, max: usize) -> Self {
        self.max_delays = max.max(1);
        self
    }

    /// Opts the handler into whole rename events.
    #[must_use]
    pub fn on_move(mut self, on_move: bool) -> Self {
        self.on_move = on_move;
        self
    }

    /// Controls recursive watch maintenance on directory events.
    #[must_use]
    pub fn track_subdirs(mut self, track: bool) -> Self {
        self.track_subdirs = track;
        self
    }

    /// Finalises the configuration.
    #[must_use]
    pub fn build(self) -> SyncConfig {
        SyncConfig {
            name: self.name,
            source: self.source,
            target: self.target,
            delay_secs: self.delay_secs,
            max_processes: self.max_processes,
            max_delays: self.max_delays,
            on_move: self.on_move,
            track_subdirs: self.track_subdirs,
        }
    }
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// What a collect callback decided about a finished child.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CollectOutcome {
    /// Terminate the daemon with a nonzero status.
    Die,
    /// Requeue the work; it retries after `max(1, delay)` seconds.
    Again,
    /// The work is done; its delays leave the FIFO.
    Finished,
}

/// Result of offering a child completion to a sync.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CollectResult {
    /// The pid belongs to no process of this sync.
    NotMine,
    /// The completion was consumed.
    Handled,
    /// The collect callback demanded daemon termination.
    Die,
}

/// User-visible behavior of a sync: how to act on pending work and how to
/// judge finished children.
pub trait ActionHandler {
    /// Called when a delay is eligible. The handler may spawn a child for
    /// one event or a batch, discard events, or leave them pending.
    fn action(&mut self, inlet: &mut Inlet<'_>) -> Result<(), EngineError>;

    /// Called once at startup, after the recursive watches are installed.
    /// The default queues the blanket reconciliation delay.
    fn init(&mut self, inlet: &mut Inlet<'_>) -> Result<(), EngineError> {
        inlet.create_blanket_event();
        Ok(())
    }

    /// Judges a finished child.
    fn collect(&mut self, agent: &Agent, exit_code: i32) -> CollectOutcome;
}

/// A configured mirror: configuration, delay FIFO, process table, excludes
/// and the action handler, bound together.
pub struct Sync {
    config: Arc<SyncConfig>,
    handler: Box<dyn ActionHandler>,
    collapse: Option<Box<CollapseFn>>,
    queue: DelayQueue,
    excludes: Excludes,
    processes: HashMap<Pid, Vec<DelayId>>,
}

impl Sync {
    /// Binds a configuration to its handler.
    #[must_use]
    pub fn new(config: SyncConfig, handler: Box<dyn ActionHandler>) -> Self {
        let queue = DelayQueue::new(config.delay_secs, config.max_delays);
        Self {
            config: Arc::new(config),
            handler,
            collapse: None,
            queue,
            excludes: Excludes::new(),
            processes: HashMap::new(),
        }
    }

    /// Installs a collapse override consulted before the default table.
    #[must_use]
    pub fn with_collapse(mut self, collapse: Box<CollapseFn>) -> Self {
        self.collapse = Some(collapse);
        self
    }

    /// The sync configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<SyncConfig> {
        &self.config
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Files one observed change, running exclusion and collapse.
    pub fn delay(
        &mut self,
        kind: EventKind,
        time: Option<Ticks>,
        now: Ticks,
        path: String,
        path2: Option<String>,
    ) {
        self.queue.push(
            kind,
            time,
            now,
            path,
            path2,
            &self.excludes,
            self.config.on_move,
            self.collapse.as_deref(),
        );
    }

    /// Queues the blanket reconciliation delay.
    pub fn add_blanket_delay(&mut self, now: Ticks) {
        self.queue.push(
            EventKind::Blanket,
            None,
            now,
            String::new(),
            None,
            &self.excludes,
            self.config.on_move,
            None,
        );
    }

    /// The next alarm this sync needs, or `None` while its process slots
    /// are exhausted or nothing waits.
    #[must_use]
    pub fn get_alarm(&self) -> Option<Deadline> {
        if self.processes.len() >= self.config.max_processes {
            return None;
        }
        self.queue.first_wait_alarm()
    }

    /// The frontmost delay eligible at `now`.
    #[must_use]
    pub fn get_next_delay(&self, now: Ticks) -> Option<&Delay> {
        self.queue
            .next_ready(now)
            .and_then(|id| self.queue.get(id))
    }

    /// The batch of runnable delays satisfying `predicate`.
    #[must_use]
    pub fn get_delays(&self, predicate: Option<&dyn Fn(&Delay) -> bool>) -> Vec<DelayId> {
        self.queue.ready_batch(predicate)
    }

    /// Removes a delay by identity, releasing the delays it blocked.
    pub fn remove_delay(&mut self, id: DelayId) {
        self.queue.remove(id);
    }

    /// Runs the action handler while process slots and eligible delays
    /// remain. A handler that neither spawns nor discards leaves its delay
    /// pending for the next cycle.
    pub fn invoke_actions(
        &mut self,
        now: Ticks,
        host: &mut dyn ProcessHost,
    ) -> Result<(), EngineError> {
        while self.processes.len() < self.config.max_processes {
            let Some(focus) = self.queue.next_ready(now) else {
                break;
            };
            mirror_debug!(Call, "invoking action for {focus} on sync {}", self.config.name);
            let mut inlet = Inlet {
                config: &self.config,
                queue: &mut self.queue,
                excludes: &mut self.excludes,
                processes: &mut self.processes,
                host: &mut *host,
                now,
            };
            self.handler.action(&mut inlet)?;
            if self
                .queue
                .get(focus)
                .is_some_and(|delay| delay.status() == DelayStatus::Wait)
            {
                tracing::info!(
                    "action handler of {} left its event pending; retrying on the next cycle",
                    self.config.name
                );
                break;
            }
        }
        Ok(())
    }

    /// Runs the handler's startup callback.
    pub fn invoke_init(
        &mut self,
        now: Ticks,
        host: &mut dyn ProcessHost,
    ) -> Result<(), EngineError> {
        let mut inlet = Inlet {
            config: &self.config,
            queue: &mut self.queue,
            excludes: &mut self.excludes,
            processes: &mut self.processes,
            host,
            now,
        };
        self.handler.init(&mut inlet)
    }

    /// Offers a child completion to this sync.
    pub fn collect(&mut self, pid: Pid, exit_code: i32, now: Ticks) -> CollectResult {
        let Some(batch) = self.processes.remove(&pid) else {
            return CollectResult::NotMine;
        };
        mirror_debug!(Exec, "collecting pid {pid} (exit {exit_code})");
        let agent = self.agent_for(&batch);
        match self.handler.collect(&agent, exit_code) {
            CollectOutcome::Die => CollectResult::Die,
            CollectOutcome::Again => {
                let retry = Deadline::At(now.add_secs(self.config.delay_secs.max(1)));
                for id in batch {
                    if let Some(delay) = self.queue.get_mut(id) {
                        delay.status = DelayStatus::Wait;
                        delay.alarm = retry;
                    }
                }
                CollectResult::Handled
            }
            CollectOutcome::Finished => {
                for id in batch {
                    self.queue.remove(id);
                }
                CollectResult::Handled
            }
        }
    }

    fn agent_for(&self, batch: &[DelayId]) -> Agent {
        if batch.len() == 1 {
            if let Some(delay) = self.queue.get(batch[0]) {
                return Agent::Event(Event::from_delay(delay, Arc::clone(&self.config)));
            }
        }
        let mut inlet_entries = Vec::with_capacity(batch.len());
        for id in batch {
            if let Some(delay) = self.queue.get(*id) {
                inlet_entries.push(delay);
            }
        }
        Agent::List(EventList::from_delays(
            &inlet_entries,
            Arc::clone(&self.config),
        ))
    }

    /// Adds an exclude pattern.
    pub fn add_exclude(&mut self, pattern: &str) -> Result<(), ExcludeError> {
        self.excludes.add(pattern)
    }

    /// Removes an exclude pattern.
    pub fn remove_exclude(&mut self, pattern: &str) {
        self.excludes.remove(pattern);
    }

    /// The exclude set.
    #[must_use]
    pub fn excludes(&self) -> &Excludes {
        &self.excludes
    }

    /// Loads exclude patterns from a file.
    pub fn load_excludes(&mut self, path: &std::path::Path) -> Result<(), ExcludeError> {
        self.excludes.load_file(path)
    }

    /// Number of queued delays.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Iterates queued delays head to tail.
    pub fn delays(&self) -> impl Iterator<Item = &Delay> {
        self.queue.iter()
    }

    /// Number of running children.
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Whether any child is still running.
    #[must_use]
    pub fn has_processes(&self) -> bool {
        !self.processes.is_empty()
    }

    /// Writes this sync's section of the status file.
    pub fn status_report(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "{} source={}", self.config.name, self.config.source)?;
        writeln!(out, "There are {} delays", self.queue.len())?;
        for delay in self.queue.iter() {
            writeln!(out, "  {delay}")?;
        }
        writeln!(out, "Excluding:")?;
        if self.excludes.is_empty() {
            writeln!(out, "  (none)")?;
        } else {
            for pattern in self.excludes.patterns() {
                writeln!(out, "  {pattern}")?;
            }
        }
        Ok(())
    }
}
