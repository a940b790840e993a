#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `mirror_engine` is the aggregation and scheduling core of `oc-mirror`.
//! It turns the flat kernel event stream into per-sync, tree-relative
//! [`Delay`] records, folds redundant bursts through the collapse rules,
//! schedules batched action invocations against process slots, and keeps
//! the recursive watch-descriptor bookkeeping that maps descriptors back to
//! absolute directory paths.
//!
//! # Design
//!
//! The engine is strictly single-threaded and callback-driven. The daemon's
//! main loop owns every structure here and calls in at four points: when a
//! kernel event arrives ([`dispatch_event`]), when an alarm elapses
//! ([`Sync::invoke_actions`]), when a child exits ([`Sync::collect`]), and
//! when the status file is due ([`Sync::status_report`]). User-visible
//! behavior is pluggable through [`ActionHandler`], which sees events only
//! through the narrow [`Inlet`] facade.
//!
//! External facilities stay behind two small traits: [`Monitor`] for the
//! kernel watch facility and [`ProcessHost`] for child-process launching.
//! [`test_support`] provides scripted implementations of both.

mod collapse;
mod delay;
mod error;
mod event;
mod host;
mod inlet;
mod monitor;
mod queue;
mod sync;
pub mod test_support;
mod watch;

pub use collapse::{CollapseDecision, CollapseFn};
pub use delay::{Delay, DelayId, DelayStatus};
pub use error::EngineError;
pub use event::{EventKind, MoveSide};
pub use host::{Pid, ProcessHost, SpawnCommand};
pub use inlet::{Agent, Event, EventList, Inlet};
pub use monitor::{Monitor, MonitorEvent, Wd};
pub use queue::DelayQueue;
pub use sync::{ActionHandler, CollectOutcome, CollectResult, Sync, SyncConfig, SyncConfigBuilder};
pub use watch::{dispatch_event, WatchRegistry};
