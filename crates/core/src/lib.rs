#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `mirror_core` holds the small shared vocabulary of the `oc-mirror`
//! workspace: the monotonic [`Ticks`] timestamp, the [`Deadline`] used to
//! schedule pending transfers, and the process [`ExitCode`] mapping. Every
//! other crate builds on these types, so the crate stays dependency-free
//! and allocation-light.
//!
//! # Design
//!
//! - [`Ticks`] is a millisecond count on an arbitrary monotonic origin. The
//!   engine never interprets absolute values; it only compares tick values,
//!   adds spans to them, and converts differences into poll timeouts.
//! - [`Deadline`] pairs a tick value with the `Immediate` sentinel used by
//!   blanket reconciliation work that must not wait for an alarm.
//! - [`ExitCode`] enumerates the daemon's terminal outcomes together with
//!   their numeric process statuses.
//!
//! # See also
//!
//! - `mirror_engine` for the delay queue that consumes [`Deadline`]s.
//! - `mirror_daemon` for the main loop that converts deadlines into
//!   `poll(2)` timeouts.

mod clock;
mod exit_code;
mod version;

pub use clock::{Deadline, MonotonicClock, Ticks};
pub use exit_code::ExitCode;
pub use version::{version_banner, PROGRAM_NAME, VERSION};
