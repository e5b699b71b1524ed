//! # stackup
//!
//! Declarative multi-host command orchestration. A versioned `Supfile` describes
//! networks of hosts, commands and targets; this crate loads it, folds its
//! includes, resolves hosts and the execution plan, and schedules every command
//! across the selected hosts.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::indexing_slicing))]

include!(concat!(env!("OUT_DIR"), "/translations.rs"));

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared "plan aborted" flag observed by every host worker of a run.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
