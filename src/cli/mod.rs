use crate::constants::{
    EXIT_ENV_RESOLUTION, EXIT_EXECUTION, EXIT_FAILURE, EXIT_HOST_RESOLUTION, EXIT_LOAD, EXIT_UNKNOWN_COMMAND,
    EXIT_UNKNOWN_NETWORK, EXIT_USAGE,
};
use crate::core::env_list::EnvError;
use crate::core::host_resolver::ResolutionError;
use crate::core::planner::PlanError;
use crate::core::scheduler::SchedulerError;
use crate::core::supfile::LoadError;
use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

pub mod handlers;

/// Builds the dynamic, color-aware full help string at runtime.
fn build_help_string() -> &'static str {
    // Replaces semantic tags like `<title>` with ANSI styles, or with nothing
    // when colors are off.
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();

    let template = t!("cli.help.template");

    let title = if use_colors { "\x1b[1;33m" } else { "" }; // Bold Yellow
    let hl = if use_colors { "\x1b[1;36m" } else { "" }; // Bold Cyan
    let cmd = if use_colors { "\x1b[36m" } else { "" }; // Cyan
    let dim = if use_colors { "\x1b[2m" } else { "" };
    let reset = if use_colors { "\x1b[0m" } else { "" };

    let formatted_string = template
        .replace("<title>", title)
        .replace("</title>", reset)
        .replace("<hl>", hl)
        .replace("</hl>", reset)
        .replace("<cmd>", cmd)
        .replace("</cmd>", reset)
        .replace("<dim>", dim)
        .replace("</dim>", reset);

    Box::leak(formatted_string.into_boxed_str())
}

/// sup: run commands on groups of hosts, described in a Supfile.
#[derive(Parser, Debug)]
#[command(
    name = "sup",
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Network to run against.
    pub network: Option<String>,

    /// Commands and targets to run, in order.
    pub commands: Vec<String>,

    /// Custom path to the Supfile.
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Set an environment variable (`KEY=value`, or `KEY` for an empty value).
    #[arg(short = 'e', long = "env", value_name = "KEY[=VALUE]")]
    pub env: Vec<String>,

    /// Run only on hosts matching this regexp.
    #[arg(long, value_name = "REGEXP", default_value = "")]
    pub only: String,

    /// Skip hosts matching this regexp.
    #[arg(long, value_name = "REGEXP", default_value = "")]
    pub except: String,

    /// Enable debug logging.
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Do not prefix output lines with the host name.
    #[arg(long)]
    pub disable_prefix: bool,
}

impl Cli {
    /// The positional arguments as one list: network first, then commands.
    pub fn positionals(&self) -> Vec<String> {
        self.network
            .iter()
            .chain(self.commands.iter())
            .cloned()
            .collect()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("Usage: sup [OPTIONS] NETWORK COMMAND [...]\n\nNo network given")]
    MissingNetwork,
    #[error("Usage: sup [OPTIONS] {0} COMMAND [...]\n\nNo command or target given")]
    MissingCommand(String),
}

/// Maps an error to the process exit code of its most specific cause.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<UsageError>().is_some() {
            return EXIT_USAGE;
        }
        if cause.downcast_ref::<LoadError>().is_some() {
            return EXIT_LOAD;
        }
        if let Some(resolution) = cause.downcast_ref::<ResolutionError>() {
            return match resolution {
                ResolutionError::UnknownNetwork(_) => EXIT_UNKNOWN_NETWORK,
                _ => EXIT_HOST_RESOLUTION,
            };
        }
        if cause.downcast_ref::<PlanError>().is_some() {
            return EXIT_UNKNOWN_COMMAND;
        }
        if cause.downcast_ref::<EnvError>().is_some() {
            return EXIT_ENV_RESOLUTION;
        }
        if cause.downcast_ref::<SchedulerError>().is_some() {
            return EXIT_EXECUTION;
        }
    }
    EXIT_FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_network_commands_and_flags() {
        let cli = Cli::try_parse_from([
            "sup", "-f", "./other.yml", "-e", "A=1", "--env", "B", "--only", "web", "-D", "staging", "deploy",
            "restart",
        ])
        .unwrap();
        assert_eq!(cli.network.as_deref(), Some("staging"));
        assert_eq!(cli.commands, vec!["deploy", "restart"]);
        assert_eq!(cli.env, vec!["A=1", "B"]);
        assert_eq!(cli.only, "web");
        assert!(cli.except.is_empty());
        assert!(cli.debug);
        assert_eq!(cli.positionals(), vec!["staging", "deploy", "restart"]);
    }

    #[test]
    fn test_exit_codes_follow_the_root_cause() {
        let usage = anyhow::Error::new(UsageError::MissingNetwork);
        assert_eq!(exit_code_for(&usage), EXIT_USAGE);

        let network = anyhow::Error::new(ResolutionError::UnknownNetwork("prod".into()));
        assert_eq!(exit_code_for(&network), EXIT_UNKNOWN_NETWORK);

        let hosts = anyhow::Error::new(ResolutionError::NoHosts("prod".into())).context("while resolving");
        assert_eq!(exit_code_for(&hosts), EXIT_HOST_RESOLUTION);

        let plan = anyhow::Error::new(PlanError::Unknown("step5".into()));
        assert_eq!(exit_code_for(&plan), EXIT_UNKNOWN_COMMAND);

        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), EXIT_FAILURE);
    }
}
