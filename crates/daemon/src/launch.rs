//! Child-process launcher backed by `std::process::Command`.

use std::io::{self, Write};
use std::process::{Command, Stdio};

use mirror_engine::{Pid, ProcessHost, SpawnCommand};
use mirror_logging::mirror_debug;

/// Launches children with piped stdin; completions are reaped by the main
/// loop via `waitpid`, so the `Child` handle is dropped right away.
#[derive(Debug, Default)]
pub struct CommandHost;

impl ProcessHost for CommandHost {
    fn spawn(&mut self, command: &SpawnCommand) -> io::Result<Pid> {
        let mut child = Command::new(command.binary())
            .args(command.argv())
            .stdin(match command.stdin_payload() {
                Some(_) => Stdio::piped(),
                None => Stdio::null(),
            })
            .spawn()?;

        if let Some(payload) = command.stdin_payload() {
            if let Some(mut stdin) = child.stdin.take() {
                // Closing the pipe after the write signals end of input.
                if let Err(error) = stdin.write_all(payload) {
                    tracing::warn!("writing child stdin failed: {error}");
                }
            }
        }

        let pid = Pid(child.id() as i32);
        mirror_debug!(
            Exec,
            "launched {} as pid {pid}",
            command.binary().to_string_lossy()
        );
        Ok(pid)
    }
}
