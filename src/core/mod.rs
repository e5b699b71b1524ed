//! # Core Engine
//!
//! Everything between the raw Supfile bytes and the aggregated run result.
//!
//! ## Modules
//!
//! - **`supfile`** / **`compat`** / **`loader`**: parse a versioned document, gate
//!   legacy fields, and fold includes into one effective document.
//! - **`env_list`** / **`evaluator`** / **`environment`**: the ordered environment,
//!   its dynamic value resolution and the per-run `SUP_*` layer.
//! - **`registry`**: order-preserving named collections of networks, commands and targets.
//! - **`host_resolver`**: network membership, inventory and host filters.
//! - **`planner`**: command/target expansion into an execution plan.
//! - **`scheduler`**: bounded per-command fan-out and failure aggregation.

pub mod commons;
pub mod compat;
pub mod env_list;
pub mod environment;
pub mod evaluator;
pub mod host_resolver;
pub mod loader;
pub mod planner;
pub mod registry;
pub mod scheduler;
pub mod supfile;
