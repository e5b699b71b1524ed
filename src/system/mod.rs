//! # System Interaction Layer
//!
//! The boundary between the core engine and the operating system: spawning
//! processes, reaching hosts, and rendering their output.
//!
//! ## Modules
//!
//! - **`executor`**: spawns processes, captures or streams their output.
//! - **`transport`**: the `Transport` capability plus its local (`bash`) and
//!   remote (`ssh`) implementations.
//! - **`output`**: prefixed, line-atomic multiplexing of host output.
//! - **`stdin`**: broadcasts the local standard input to several hosts.

pub mod executor;
pub mod output;
pub mod stdin;
pub mod transport;
