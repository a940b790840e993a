//! Child-process launching seam.
//!
//! The engine never forks. Action handlers describe a child with
//! [`SpawnCommand`] and the loop-owned [`ProcessHost`] launches it,
//! reporting completions back through `Sync::collect`.

use std::ffi::{OsStr, OsString};
use std::io;

/// Process id of a launched child.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Pid(pub i32);

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Description of a child process to launch.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SpawnCommand {
    binary: OsString,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
}

impl SpawnCommand {
    /// Creates a command for `binary` with no arguments.
    #[must_use]
    pub fn new(binary: impl Into<OsString>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feeds `payload` to the child's standard input, then closes it.
    #[must_use]
    pub fn stdin(mut self, payload: Vec<u8>) -> Self {
        self.stdin = Some(payload);
        self
    }

    /// The binary to execute.
    #[must_use]
    pub fn binary(&self) -> &OsStr {
        &self.binary
    }

    /// The argument vector.
    #[must_use]
    pub fn argv(&self) -> &[OsString] {
        &self.args
    }

    /// The standard-input payload, if any.
    #[must_use]
    pub fn stdin_payload(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }
}

/// Launches children on behalf of action handlers.
pub trait ProcessHost {
    /// Starts the described child and returns its pid.
    fn spawn(&mut self, command: &SpawnCommand) -> io::Result<Pid>;
}
