#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `mirror_daemon` hosts the runtime around the `mirror_engine` core: the
//! command-line front-end, the TOML configuration loader, the built-in
//! rsync / rsync-over-ssh action handlers, the inotify monitor backend, the
//! child-process launcher, and the poll-driven main loop with its signal
//! and status-file plumbing.
//!
//! The crate exposes [`cli::run`] as its single entry point; the
//! `oc-mirrord` binary forwards straight into it.

pub mod actions;
pub mod cli;
pub mod config;
mod daemonize;
pub mod launch;
pub mod monitor;
mod pidfile;
pub mod runtime;
mod signal;
pub mod status;
