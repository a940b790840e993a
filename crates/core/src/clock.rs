//! Monotonic tick timestamps and scheduling deadlines.
//!
//! The engine schedules work against an opaque millisecond counter rather
//! than wall-clock time so that suspend/resume and clock adjustments never
//! reorder alarms. [`MonotonicClock`] anchors the counter to a process-local
//! [`Instant`]; tests construct [`Ticks`] values directly.

use std::fmt;
use std::time::Instant;

/// Milliseconds on an arbitrary monotonic origin.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Ticks(u64);

impl Ticks {
    /// Creates a tick value from a raw millisecond count.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond count.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns this timestamp advanced by `secs` seconds.
    #[must_use]
    pub const fn add_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs.saturating_mul(1_000)))
    }

    /// Returns this timestamp advanced by `millis` milliseconds.
    #[must_use]
    pub const fn add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Reports whether this timestamp lies strictly before `other`.
    #[must_use]
    pub const fn before(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Returns the earlier of two timestamps.
    #[must_use]
    pub fn earlier(a: Self, b: Self) -> Self {
        a.min(b)
    }

    /// Milliseconds remaining until `deadline`, zero when already due.
    #[must_use]
    pub const fn millis_until(self, deadline: Self) -> u64 {
        deadline.0.saturating_sub(self.0)
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The moment at which a pending piece of work becomes eligible to run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Deadline {
    /// Eligible right away; used by blanket reconciliation delays.
    Immediate,
    /// Eligible once the clock reaches the embedded timestamp.
    At(Ticks),
}

impl Deadline {
    /// Reports whether the deadline has been reached at `now`.
    #[must_use]
    pub fn is_due(self, now: Ticks) -> bool {
        match self {
            Self::Immediate => true,
            Self::At(ticks) => !now.before(ticks),
        }
    }

    /// Returns the sooner of two deadlines.
    #[must_use]
    pub fn earlier(a: Self, b: Self) -> Self {
        match (a, b) {
            (Self::Immediate, _) | (_, Self::Immediate) => Self::Immediate,
            (Self::At(x), Self::At(y)) => Self::At(Ticks::earlier(x, y)),
        }
    }

    /// Milliseconds from `now` until the deadline, zero when due.
    #[must_use]
    pub fn millis_from(self, now: Ticks) -> u64 {
        match self {
            Self::Immediate => 0,
            Self::At(ticks) => now.millis_until(ticks),
        }
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("immediate"),
            Self::At(ticks) => ticks.fmt(f),
        }
    }
}

/// Tick source anchored to a process-local monotonic instant.
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose tick zero is the moment of the call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Returns the current tick count.
    #[must_use]
    pub fn now(&self) -> Ticks {
        Ticks::from_millis(self.origin.elapsed().as_millis() as u64)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
