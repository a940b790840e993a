//! Terminal process statuses for the daemon.

use std::fmt;

/// Outcome the daemon reports to its parent process.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum ExitCode {
    /// Clean shutdown: all children drained after a fade.
    Ok = 0,
    /// Configuration rejected: bad flag, missing source, unreadable file.
    Config = 1,
    /// The kernel event facility could not be initialised.
    Monitor = 2,
    /// A collect callback demanded termination.
    Die = 3,
    /// Unrecoverable runtime failure (spawn failure, I/O on owned state).
    Internal = 4,
}

impl ExitCode {
    /// Returns the numeric process status.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Short description used in shutdown diagnostics.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "clean shutdown",
            Self::Config => "configuration error",
            Self::Monitor => "event facility unavailable",
            Self::Die => "terminated by collect handler",
            Self::Internal => "internal failure",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code as u8)
    }
}
