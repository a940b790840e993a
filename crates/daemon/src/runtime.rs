//! The poll-driven main loop.
//!
//! The runtime owns every engine structure. One iteration: consume signal
//! flags, run due actions, block in `poll(2)` until a kernel event, a
//! child exit or the next alarm, reap children, dispatch drained events.

use mirror_core::{Deadline, ExitCode, MonotonicClock, Ticks};
use mirror_engine::{
    dispatch_event, CollectResult, EngineError, Monitor, MonitorEvent, Pid, ProcessHost, Sync,
    WatchRegistry,
};

use crate::monitor::PollableMonitor;
use crate::signal;
use crate::status::StatusWriter;

/// Daemon lifecycle state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DaemonState {
    /// Configuration is still being installed; the loop is not driven.
    Init,
    /// Normal operation.
    Run,
    /// Draining: no new work, exit once every child is reaped.
    Fade,
}

/// The owning context for monitor, watches, syncs and process host.
pub struct Runtime<M: Monitor, H: ProcessHost> {
    monitor: M,
    host: H,
    registry: WatchRegistry,
    syncs: Vec<Sync>,
    clock: MonotonicClock,
    state: DaemonState,
    status: Option<StatusWriter>,
}

impl<M: Monitor, H: ProcessHost> Runtime<M, H> {
    /// Assembles a runtime in the `Init` state.
    #[must_use]
    pub fn new(monitor: M, syncs: Vec<Sync>, host: H, status: Option<StatusWriter>) -> Self {
        Self {
            monitor,
            host,
            registry: WatchRegistry::new(),
            syncs,
            clock: MonotonicClock::new(),
            state: DaemonState::Init,
            status,
        }
    }

    /// Installs the recursive watches and runs every handler's init
    /// callback, then enters `Run`. No syncs can be added afterwards.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        for index in 0..self.syncs.len() {
            self.registry
                .add_sync(&mut self.monitor, &mut self.syncs, index, now);
            tracing::info!(
                "mirroring {} -> {}",
                self.syncs[index].config().source,
                self.syncs[index].config().target
            );
        }
        for sync in &mut self.syncs {
            sync.invoke_init(now, &mut self.host)?;
        }
        self.state = DaemonState::Run;
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Current monotonic time.
    #[must_use]
    pub fn now(&self) -> Ticks {
        self.clock.now()
    }

    /// The configured syncs.
    #[must_use]
    pub fn syncs(&self) -> &[Sync] {
        &self.syncs
    }

    /// The watch registry.
    #[must_use]
    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Enters the drain state: no new work is spawned.
    pub fn begin_fade(&mut self) {
        if self.state != DaemonState::Fade {
            tracing::info!("fading out: waiting for {} children", self.live_processes());
            self.state = DaemonState::Fade;
        }
    }

    /// Number of children still running across all syncs.
    #[must_use]
    pub fn live_processes(&self) -> usize {
        self.syncs.iter().map(Sync::process_count).sum()
    }

    /// Whether every child has been reaped.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        !self.syncs.iter().any(Sync::has_processes)
    }

    /// Feeds one raw kernel event through the dispatcher. Events arriving
    /// during a fade are drained and dropped.
    pub fn handle_event(&mut self, event: &MonitorEvent) {
        if self.state != DaemonState::Run {
            return;
        }
        let now = self.clock.now();
        dispatch_event(
            &mut self.registry,
            &mut self.monitor,
            &mut self.syncs,
            event,
            now,
        );
    }

    /// Runs due actions and the status writer.
    pub fn tick(&mut self, now: Ticks) -> Result<(), EngineError> {
        if self.state == DaemonState::Run {
            for sync in &mut self.syncs {
                sync.invoke_actions(now, &mut self.host)?;
            }
        }
        if let Some(status) = &mut self.status {
            if let Err(error) = status.write_if_due(now, &self.syncs, &self.registry) {
                tracing::warn!("cannot write status file: {error}");
            }
        }
        Ok(())
    }

    /// Offers a child completion to each sync until one claims it.
    /// Returns an exit code when a collect handler demands termination.
    pub fn collect(&mut self, pid: Pid, exit_code: i32) -> Option<ExitCode> {
        let now = self.clock.now();
        for sync in &mut self.syncs {
            match sync.collect(pid, exit_code, now) {
                CollectResult::NotMine => {}
                CollectResult::Handled => return None,
                CollectResult::Die => {
                    tracing::error!("collect handler demanded termination (pid {pid})");
                    return Some(ExitCode::Die);
                }
            }
        }
        tracing::debug!("reaped unclaimed pid {pid}");
        None
    }

    /// The soonest wake-up needed across syncs and the status writer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Deadline> {
        let mut next: Option<Deadline> = None;
        for sync in &self.syncs {
            if let Some(alarm) = sync.get_alarm() {
                next = Some(match next {
                    Some(current) => Deadline::earlier(current, alarm),
                    None => alarm,
                });
            }
        }
        if let Some(status) = &self.status {
            let due = status.next_due();
            next = Some(match next {
                Some(current) => Deadline::earlier(current, due),
                None => due,
            });
        }
        next
    }
}

impl<M: PollableMonitor, H: ProcessHost> Runtime<M, H> {
    /// Blocks until the daemon terminates; returns its exit code.
    pub fn run_loop(&mut self) -> ExitCode {
        loop {
            let now = self.clock.now();
            if signal::take_fade_request() {
                self.begin_fade();
            }
            if self.monitor.overflowed() && self.state == DaemonState::Run {
                tracing::warn!("kernel event queue overflowed, fading out");
                self.begin_fade();
            }
            match self.state {
                DaemonState::Init => {
                    tracing::error!("main loop entered before start()");
                    return ExitCode::Internal;
                }
                DaemonState::Run => {
                    if let Err(error) = self.tick(now) {
                        tracing::error!("action invocation failed: {error}");
                        return ExitCode::Internal;
                    }
                }
                DaemonState::Fade => {
                    if self.is_drained() {
                        tracing::info!("all children drained, exiting");
                        return ExitCode::Ok;
                    }
                }
            }

            let timeout = self.poll_timeout(now);
            poll_readable(self.monitor.fd(), timeout);

            for (pid, exit_code) in reap_children() {
                if let Some(code) = self.collect(pid, exit_code) {
                    return code;
                }
            }

            match self.monitor.read_events(self.clock.now()) {
                Ok(events) => {
                    for event in &events {
                        self.handle_event(event);
                    }
                }
                Err(error) => {
                    tracing::error!("cannot read kernel events: {error}");
                    return ExitCode::Monitor;
                }
            }
        }
    }

    fn poll_timeout(&self, now: Ticks) -> i32 {
        let mut timeout: i64 = match self.next_deadline() {
            Some(deadline) => deadline.millis_from(now).min(i64::MAX as u64) as i64,
            None => -1,
        };
        // A due delay surviving tick() means its handler declined to act;
        // polling with a zero timeout would spin on it.
        if timeout == 0 {
            timeout = 50;
        }
        // A child can exit between reaping and poll; SIGCHLD interrupts
        // the poll, but cap the sleep while children run to close the
        // race window.
        if self.live_processes() > 0 {
            timeout = if timeout < 0 { 1_000 } else { timeout.min(1_000) };
        }
        if self.state == DaemonState::Fade {
            timeout = if timeout < 0 { 500 } else { timeout.min(500) };
        }
        timeout.clamp(-1, i32::MAX as i64) as i32
    }
}

fn poll_readable(fd: i32, timeout_ms: i32) -> bool {
    if fd < 0 {
        return false;
    }
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    rc > 0 && (pollfd.revents & libc::POLLIN) != 0
}

/// Reaps every exited child without blocking.
fn reap_children() -> Vec<(Pid, i32)> {
    let mut reaped = Vec::new();
    loop {
        let mut status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        let exit_code = if libc::WIFEXITED(status) {
            libc::WEXITSTATUS(status)
        } else if libc::WIFSIGNALED(status) {
            128 + libc::WTERMSIG(status)
        } else {
            continue;
        };
        reaped.push((Pid(pid), exit_code));
    }
    reaped
}
