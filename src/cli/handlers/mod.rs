// src/cli/handlers/mod.rs

// The logic behind each thing the CLI can do.

pub mod list;
pub mod run;
