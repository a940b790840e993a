#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `mirror_logging` routes the daemon's diagnostics. Log lines fall into the
//! usual severity levels plus a set of debug categories (`delay`,
//! `collapse`, `monitor`, `exec`, `call`, `status`) that are silent unless
//! enabled with `-log CATEGORY`. `-log all` enables every category; `-log
//! scarce` suppresses everything below warning severity.
//!
//! # Design
//!
//! Categories map onto `tracing` targets: a category debug line is a
//! `tracing::debug!` event whose target is the category name, and
//! [`LogSettings::init`] installs a [`Targets`] filter that opens exactly
//! the enabled ones. The sink is stderr while the daemon runs in the
//! foreground, a logfile when `-logfile` is given, and syslog(3) otherwise.
//!
//! [`Targets`]: tracing_subscriber::filter::Targets

mod category;
mod settings;
mod syslog;

pub use category::Category;
pub use settings::{LogInitError, LogSettings, LogSink, UnknownCategory};

// Re-exported for the `mirror_debug!` macro expansion.
#[doc(hidden)]
pub use tracing;

/// Emits a category-gated debug line.
///
/// The first argument is a [`Category`] variant name; the rest is forwarded
/// to `tracing::debug!`:
///
/// ```
/// mirror_logging::mirror_debug!(Delay, "stacked {} on {}", 4, 2);
/// ```
#[macro_export]
macro_rules! mirror_debug {
    (Delay, $($arg:tt)*) => { $crate::tracing::debug!(target: "delay", $($arg)*) };
    (Collapse, $($arg:tt)*) => { $crate::tracing::debug!(target: "collapse", $($arg)*) };
    (Monitor, $($arg:tt)*) => { $crate::tracing::debug!(target: "monitor", $($arg)*) };
    (Exec, $($arg:tt)*) => { $crate::tracing::debug!(target: "exec", $($arg)*) };
    (Call, $($arg:tt)*) => { $crate::tracing::debug!(target: "call", $($arg)*) };
    (Status, $($arg:tt)*) => { $crate::tracing::debug!(target: "status", $($arg)*) };
}
