//! Scripted collaborators for exercising the engine without a kernel or a
//! process table: an in-memory [`Monitor`], a recording [`ProcessHost`],
//! and a no-op [`ActionHandler`].

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;

use crate::host::{Pid, ProcessHost, SpawnCommand};
use crate::inlet::{Agent, Inlet};
use crate::monitor::{Monitor, Wd};
use crate::sync::{ActionHandler, CollectOutcome};
use crate::EngineError;

/// In-memory watch facility with scriptable failures and descriptor reuse.
#[derive(Debug, Default)]
pub struct ScriptedMonitor {
    next_wd: i32,
    forced_wd: Option<i32>,
    fail: HashSet<String>,
    /// Live watches, by descriptor.
    pub watches: BTreeMap<Wd, String>,
    /// Every descriptor removed through the kernel interface.
    pub removed: Vec<Wd>,
}

impl ScriptedMonitor {
    /// Creates a monitor handing out descriptors from 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `add_watch` fail for one absolute path.
    pub fn fail_on(&mut self, path: &str) {
        self.fail.insert(path.to_string());
    }

    /// Forces the next freshly installed watch to get `wd`, simulating
    /// kernel descriptor recycling.
    pub fn force_next_wd(&mut self, wd: i32) {
        self.forced_wd = Some(wd);
    }

    /// Drops internal knowledge of `path` without recording a removal, as
    /// if the directory vanished underneath the kernel.
    pub fn forget(&mut self, path: &str) {
        self.watches.retain(|_, watched| watched != path);
    }
}

impl Monitor for ScriptedMonitor {
    fn add_watch(&mut self, path: &Path) -> io::Result<Wd> {
        let text = path.display().to_string();
        if self.fail.contains(&text) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "scripted"));
        }
        // The kernel returns the existing descriptor for an already
        // watched directory.
        if let Some((wd, _)) = self.watches.iter().find(|(_, watched)| **watched == text) {
            return Ok(*wd);
        }
        let wd = match self.forced_wd.take() {
            Some(forced) => Wd(forced),
            None => {
                self.next_wd += 1;
                Wd(self.next_wd)
            }
        };
        self.watches.insert(wd, text);
        Ok(wd)
    }

    fn remove_watch(&mut self, wd: Wd) -> io::Result<()> {
        self.watches.remove(&wd);
        self.removed.push(wd);
        Ok(())
    }
}

/// One recorded spawn request.
#[derive(Clone, Debug)]
pub struct SpawnRecord {
    /// Pid assigned to the child.
    pub pid: Pid,
    /// Requested binary.
    pub binary: String,
    /// Argument vector, lossily decoded.
    pub args: Vec<String>,
    /// Standard-input payload.
    pub stdin: Option<Vec<u8>>,
}

/// Process host that records every spawn and assigns sequential pids.
#[derive(Debug, Default)]
pub struct RecordingHost {
    next_pid: i32,
    /// Spawns in request order.
    pub spawned: Vec<SpawnRecord>,
}

impl RecordingHost {
    /// Creates a host handing out pids from 100.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_pid: 100,
            spawned: Vec::new(),
        }
    }

    /// The most recent spawn, if any.
    #[must_use]
    pub fn last(&self) -> Option<&SpawnRecord> {
        self.spawned.last()
    }
}

impl ProcessHost for RecordingHost {
    fn spawn(&mut self, command: &SpawnCommand) -> io::Result<Pid> {
        self.next_pid += 1;
        let pid = Pid(self.next_pid);
        self.spawned.push(SpawnRecord {
            pid,
            binary: command.binary().to_string_lossy().into_owned(),
            args: command
                .argv()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            stdin: command.stdin_payload().map(<[u8]>::to_vec),
        });
        Ok(pid)
    }
}

/// Process host that refuses every spawn.
#[derive(Debug, Default)]
pub struct FailingHost;

impl ProcessHost for FailingHost {
    fn spawn(&mut self, _command: &SpawnCommand) -> io::Result<Pid> {
        Err(io::Error::new(io::ErrorKind::NotFound, "scripted"))
    }
}

/// Handler that neither spawns nor discards; collect reports success.
#[derive(Debug, Default)]
pub struct NoopHandler;

impl ActionHandler for NoopHandler {
    fn action(&mut self, _inlet: &mut Inlet<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    fn collect(&mut self, _agent: &Agent, _exit_code: i32) -> CollectOutcome {
        CollectOutcome::Finished
    }
}
