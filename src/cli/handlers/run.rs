use crate::{
    CancellationToken,
    cli::{UsageError, handlers::list},
    core::{
        environment::{self, ProcessEnv},
        evaluator::{ExpressionEvaluator, ShellEvaluator},
        host_resolver::{self, HostFilter},
        loader::{self, ConfigLoader},
        planner::ExecutionPlan,
        scheduler::{RunReport, Scheduler},
    },
    system::{
        output::OutputMux,
        transport::{LocalTransport, SshTransport, Transport},
    },
};
use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Run settings taken from the command line and the process environment.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub working_dir: PathBuf,
    /// Explicit `--file`; `None` means discovery in `working_dir`.
    pub supfile: Option<PathBuf>,
    pub only: String,
    pub except: String,
    /// Raw `--env` values.
    pub env_vars: Vec<String>,
    pub process_env: ProcessEnv,
}

/// The external capabilities a run talks to.
pub struct Collaborators {
    pub local: Arc<dyn Transport>,
    pub remote: Arc<dyn Transport>,
    pub output: OutputMux,
    pub evaluator: Box<dyn ExpressionEvaluator>,
    pub stdin: Option<Box<dyn Read + Send>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("output", &self.output)
            .field("stdin", &self.stdin.is_some())
            .finish()
    }
}

impl Collaborators {
    /// Real processes: `bash` locally, `ssh` remotely, output to stdout,
    /// the process stdin for `stdin: true` commands.
    pub fn system(working_dir: &std::path::Path, disable_prefix: bool) -> Self {
        Self {
            local: Arc::new(LocalTransport::new(working_dir)),
            remote: Arc::new(SshTransport::new()),
            output: OutputMux::stdout(!disable_prefix),
            evaluator: Box::new(ShellEvaluator::in_dir(working_dir)),
            stdin: Some(Box::new(std::io::stdin())),
        }
    }
}

///
/// Main entry point for a run: `sup [OPTIONS] NETWORK COMMAND [...]`.
///
/// `args` are the positional arguments (network first). Usage listings and
/// Supfile notices are written to `diagnostics`.
///
pub fn handle(
    options: &RunOptions,
    args: &[String],
    collaborators: Collaborators,
    diagnostics: &mut dyn Write,
    cancellation_token: &CancellationToken,
) -> Result<RunReport> {
    // 1. Load the Supfile with its includes.
    let path = loader::discover(&options.working_dir, options.supfile.as_deref())?;
    let conf = ConfigLoader::new().load(&path, diagnostics)?;

    // 2. A network is mandatory.
    let Some((network_name, command_names)) = args.split_first() else {
        list::print_networks(&conf, diagnostics).context("Could not print the network list")?;
        return Err(UsageError::MissingNetwork.into());
    };

    // 3. Filters are validated before any host is contacted.
    let filter = HostFilter::compile(&options.only, &options.except)?;
    let network = host_resolver::select(&conf.networks, network_name)?;
    let hosts = host_resolver::resolve(network_name, network, &filter, &options.working_dir)?;

    // 4. At least one command or target.
    if command_names.is_empty() {
        list::print_commands(&conf, diagnostics).context("Could not print the command list")?;
        return Err(UsageError::MissingCommand(network_name.clone()).into());
    }
    let plan = ExecutionPlan::expand(command_names, &conf.commands, &conf.targets)?;

    // 5. The run environment, resolved once for every host.
    let env = environment::assemble(
        &conf.env,
        network_name,
        network,
        &options.env_vars,
        &options.process_env,
        collaborators.evaluator.as_ref(),
    )?;

    // 6. Schedule.
    let mut scheduler = Scheduler::new(
        collaborators.local,
        collaborators.remote,
        collaborators.output,
        &options.working_dir,
        cancellation_token.clone(),
    );
    if plan.uses_stdin()
        && let Some(stdin) = collaborators.stdin
    {
        scheduler = scheduler.with_stdin(stdin);
    }

    let report = scheduler.run(&plan, &hosts, &env)?;
    report.clone().into_result()?;
    Ok(report)
}
