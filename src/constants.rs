// src/constants.rs

/// The conventional name of the configuration document in the working directory.
pub const DEFAULT_SUPFILE: &str = "Supfile";

/// Secondary conventional name, tried when `DEFAULT_SUPFILE` does not exist.
pub const FALLBACK_SUPFILE: &str = "Supfile.yml";

/// The newest Supfile version this build understands.
pub const LATEST_SUPFILE_VERSION: &str = "0.6";

/// Includes nested deeper than this are rejected.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Targets expanding deeper than this are rejected.
pub const MAX_TARGET_DEPTH: usize = 64;

/// Identity reported for commands that run on the invoking machine.
pub const LOCALHOST: &str = "localhost";

// Run-scoped variables exported to every command.
pub const SUP_NETWORK: &str = "SUP_NETWORK";
pub const SUP_ENV: &str = "SUP_ENV";
pub const SUP_USER: &str = "SUP_USER";
pub const SUP_HOST: &str = "SUP_HOST";
pub const SUP_TIME: &str = "SUP_TIME";

// Process exit codes.
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_LOAD: i32 = 3;
pub const EXIT_UNKNOWN_NETWORK: i32 = 4;
pub const EXIT_UNKNOWN_COMMAND: i32 = 5;
pub const EXIT_HOST_RESOLUTION: i32 = 6;
pub const EXIT_ENV_RESOLUTION: i32 = 7;
pub const EXIT_EXECUTION: i32 = 8;
