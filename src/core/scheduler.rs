//! # Scheduler
//!
//! Runs an [`ExecutionPlan`] across the resolved hosts.
//!
//! Commands execute strictly in plan order. Each command fans out over its
//! hosts on a dedicated `rayon` pool sized to the command's serial cap, so at
//! most `serial` hosts run it at once and the rest wait for a free slot.
//!
//! The first failure on any host raises the shared abort flag: hosts still
//! queued for the current command are skipped, hosts already running it are
//! left to finish, and no further command is dispatched.

use crate::CancellationToken;
use crate::constants::LOCALHOST;
use crate::core::env_list::EnvList;
use crate::core::environment;
use crate::core::evaluator::{ExpandEvaluator, ExpressionEvaluator};
use crate::core::planner::ExecutionPlan;
use crate::core::commons::wrap_value;
use crate::models::{Command, Host};
use crate::system::executor::{self, ExecutionError};
use crate::system::output::OutputMux;
use crate::system::stdin;
use crate::system::transport::{ExecRequest, Transport};
use rayon::prelude::*;
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::Child;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("{}", describe_failures(.0))]
    HostFailures(Vec<HostFailure>),
    #[error("Could not build the worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("Could not read script '{path}' of command '{command}': {source}")]
    Script {
        command: String,
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Could not expand '{raw}' of command '{command}': {source}")]
    Expand {
        command: String,
        raw: String,
        #[source]
        source: ExecutionError,
    },
    #[error("The scheduler has already run (state: {0})")]
    AlreadyRun(RunState),
}

fn describe_failures(failures: &[HostFailure]) -> String {
    let lines: Vec<String> = failures.iter().map(ToString::to_string).collect();
    format!("{} host(s) failed:\n  {}", failures.len(), lines.join("\n  "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Resolved,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Resolved => "resolved",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One failed host/command pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    pub command: String,
    pub host: String,
    pub reason: String,
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}: {}", self.command, self.host, self.reason)
    }
}

/// The aggregated outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub state: RunState,
    pub failures: Vec<HostFailure>,
    /// Commands that ran on all of their hosts, in order.
    pub completed: Vec<String>,
    /// Commands never dispatched because the run was aborted.
    pub not_started: Vec<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<(), SchedulerError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(SchedulerError::HostFailures(self.failures))
        }
    }
}

/// A unit of work for one host of one command.
struct HostJob<'a> {
    index: usize,
    host: &'a Host,
    command: String,
    input: Option<Box<dyn Read + Send>>,
}

/// Drives one run of an execution plan.
pub struct Scheduler {
    local: Arc<dyn Transport>,
    remote: Arc<dyn Transport>,
    output: OutputMux,
    cwd: PathBuf,
    stdin: Mutex<Option<Box<dyn Read + Send>>>,
    abort: CancellationToken,
    state: RunState,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("cwd", &self.cwd)
            .field("state", &self.state)
            .field("aborted", &self.abort.load(Ordering::SeqCst))
            .finish()
    }
}

impl Scheduler {
    pub fn new(
        local: Arc<dyn Transport>,
        remote: Arc<dyn Transport>,
        output: OutputMux,
        cwd: impl Into<PathBuf>,
        abort: CancellationToken,
    ) -> Self {
        Self {
            local,
            remote,
            output,
            cwd: cwd.into(),
            stdin: Mutex::new(None),
            abort,
            state: RunState::Idle,
        }
    }

    /// Input stream for `stdin: true` commands. Only the first such command
    /// of the run reads it; later ones get end of file.
    pub fn with_stdin(self, input: Box<dyn Read + Send>) -> Self {
        Self {
            stdin: Mutex::new(Some(input)),
            ..self
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs `plan` against `hosts` with the run environment `env`.
    pub fn run(&mut self, plan: &ExecutionPlan, hosts: &[Host], env: &EnvList) -> Result<RunReport, SchedulerError> {
        if self.state != RunState::Idle {
            return Err(SchedulerError::AlreadyRun(self.state));
        }
        self.state = RunState::Resolved;
        log::debug!(
            "Scheduling {} command(s) on {} host(s)",
            plan.len(),
            hosts.len()
        );

        let local_host = Host::local();
        let output = self.output.clone().align_to(
            hosts
                .iter()
                .map(|h| h.name.as_str())
                .chain(plan.commands().iter().any(Command::is_local).then_some(LOCALHOST)),
        );

        let mut report = RunReport {
            state: RunState::Running,
            failures: Vec::new(),
            completed: Vec::new(),
            not_started: Vec::new(),
        };
        self.state = RunState::Running;

        for (position, cmd) in plan.commands().iter().enumerate() {
            if self.aborted() {
                report.not_started = plan
                    .commands()
                    .iter()
                    .skip(position)
                    .map(|c| c.name.clone())
                    .collect();
                break;
            }

            let (targets, transport): (&[Host], &Arc<dyn Transport>) = if cmd.is_local() {
                (std::slice::from_ref(&local_host), &self.local)
            } else if cmd.once {
                (hosts.get(..1).unwrap_or_default(), &self.remote)
            } else {
                (hosts, &self.remote)
            };

            log::debug!(
                "Command '{}' on {} host(s), {} at a time",
                cmd.name,
                targets.len(),
                cmd.concurrency(targets.len())
            );

            if !cmd.is_local() && !cmd.upload.is_empty() {
                let failures = self.upload(cmd, targets, env, transport, &output)?;
                report.failures.extend(failures);
                if self.aborted() {
                    report.not_started = plan
                        .commands()
                        .iter()
                        .skip(position)
                        .map(|c| c.name.clone())
                        .collect();
                    break;
                }
            }

            let body = self.command_text(cmd, env)?;
            if !body.is_empty() {
                let inputs = self.inputs_for(cmd, targets.len());
                let jobs: Vec<HostJob<'_>> = targets
                    .iter()
                    .zip(inputs)
                    .enumerate()
                    .map(|(index, (host, input))| HostJob {
                        index,
                        host,
                        command: body.clone(),
                        input,
                    })
                    .collect();
                let failures = self.dispatch(cmd, jobs, cmd.concurrency(targets.len()), env, transport, &output)?;
                report.failures.extend(failures);
            }

            if !self.aborted() {
                report.completed.push(cmd.name.clone());
            }
        }

        self.state = if self.aborted() {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        report.state = self.state;
        log::debug!(
            "Run {}: {} completed, {} failed, {} not started",
            report.state,
            report.completed.len(),
            report.failures.len(),
            report.not_started.len()
        );
        Ok(report)
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// The shell text to run for `cmd`: `local`, `run`, or the contents of `script`.
    fn command_text(&self, cmd: &Command, env: &EnvList) -> Result<String, SchedulerError> {
        if cmd.is_local() {
            return Ok(cmd.local.clone());
        }
        if cmd.script.is_empty() {
            return Ok(cmd.run.clone());
        }
        let path = expand(cmd, &cmd.script, env)?;
        let full_path = self.cwd.join(&path);
        log::debug!("Reading script '{}' for '{}'", full_path.display(), cmd.name);
        std::fs::read_to_string(&full_path).map_err(|source| SchedulerError::Script {
            command: cmd.name.clone(),
            path,
            source,
        })
    }

    /// One input per target host: a broadcast of the run's stdin for the
    /// first `stdin` command, nothing otherwise.
    fn inputs_for(&self, cmd: &Command, count: usize) -> Vec<Option<Box<dyn Read + Send>>> {
        if !cmd.stdin {
            return (0..count).map(|_| None).collect();
        }
        let source = self
            .stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match source {
            Some(source) => stdin::fan_out(source, count)
                .into_iter()
                .map(|reader| Some(Box::new(reader) as Box<dyn Read + Send>))
                .collect(),
            None => {
                log::debug!("Standard input already consumed; '{}' gets end of file", cmd.name);
                (0..count)
                    .map(|_| Some(Box::new(io::empty()) as Box<dyn Read + Send>))
                    .collect()
            }
        }
    }

    /// Runs `jobs` on a pool of `slots` workers and collects the failures.
    fn dispatch(
        &self,
        cmd: &Command,
        jobs: Vec<HostJob<'_>>,
        slots: usize,
        env: &EnvList,
        transport: &Arc<dyn Transport>,
        output: &OutputMux,
    ) -> Result<Vec<HostFailure>, SchedulerError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(slots).build()?;
        let failures = Mutex::new(Vec::new());

        pool.install(|| {
            jobs.into_par_iter().for_each(|job| {
                if self.aborted() {
                    log::warn!("Skipping '{}' on {}: run aborted", cmd.name, job.host);
                    return;
                }
                let host_env = environment::for_host(env, job.host);
                let exports = host_env.as_export();
                let writer = output.writer_for(&job.host.name, job.index);
                let outcome = transport.execute(ExecRequest {
                    host: job.host,
                    env_exports: &exports,
                    command: &job.command,
                    input: job.input,
                    output: &writer,
                });
                let reason = match outcome {
                    Ok(0) => return,
                    Ok(code) => format!("exited with status {}", code),
                    Err(e) => e.to_string(),
                };
                log::debug!("'{}' failed on {}: {}", cmd.name, job.host, reason);
                self.abort.store(true, Ordering::SeqCst);
                failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(HostFailure {
                        command: cmd.name.clone(),
                        host: job.host.name.clone(),
                        reason,
                    });
            });
        });

        Ok(failures.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copies every upload of `cmd` to each target host before the command runs.
    /// Uploads are not bound by the serial cap.
    fn upload(
        &self,
        cmd: &Command,
        targets: &[Host],
        env: &EnvList,
        transport: &Arc<dyn Transport>,
        output: &OutputMux,
    ) -> Result<Vec<HostFailure>, SchedulerError> {
        let mut failures = Vec::new();
        for upload in &cmd.upload {
            let src = expand(cmd, &upload.src, env)?;
            let dst = expand(cmd, &upload.dst, env)?;
            let excludes = upload.exclude_patterns();
            let remote = format!("mkdir -p {dst} && tar -C {dst} -xzf -", dst = wrap_value(&dst));
            log::debug!("Uploading '{}' to '{}' for '{}'", src, dst, cmd.name);

            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(targets.len().max(1))
                .build()?;
            let batch = Mutex::new(Vec::new());
            pool.install(|| {
                targets.par_iter().enumerate().for_each(|(index, host)| {
                    if self.aborted() {
                        return;
                    }
                    let writer = output.writer_for(&host.name, index);
                    let exports = environment::for_host(env, host).as_export();
                    let result = executor::spawn_archive(&self.cwd, &src, &excludes).and_then(|(mut tar, archive)| {
                        let outcome = transport.execute(ExecRequest {
                            host,
                            env_exports: &exports,
                            command: &remote,
                            input: Some(Box::new(archive)),
                            output: &writer,
                        });
                        settle_archive(&mut tar, &src, &remote, outcome)
                    });
                    if let Err(e) = result {
                        self.abort.store(true, Ordering::SeqCst);
                        batch
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(HostFailure {
                                command: cmd.name.clone(),
                                host: host.name.clone(),
                                reason: format!("upload of '{}' failed: {}", src, e),
                            });
                    }
                });
            });
            failures.extend(batch.into_inner().unwrap_or_else(PoisonError::into_inner));
            if self.aborted() {
                break;
            }
        }
        Ok(failures)
    }
}

/// Reaps the local `tar` of an upload and combines both exit statuses.
/// When the remote side could not run, `tar` is killed first.
fn settle_archive(
    tar: &mut Child,
    src: &str,
    remote: &str,
    outcome: Result<i32, ExecutionError>,
) -> Result<(), ExecutionError> {
    let code = match outcome {
        Ok(code) => code,
        Err(e) => {
            if let Err(kill) = tar.kill() {
                log::debug!("Could not kill tar for '{}': {}", src, kill);
            }
            if let Err(wait) = tar.wait() {
                log::debug!("Could not reap tar for '{}': {}", src, wait);
            }
            return Err(e);
        }
    };
    let status = tar
        .wait()
        .map_err(|e| ExecutionError::CommandFailed(format!("tar {}", src), e))?;
    match (code, status.code()) {
        (0, Some(0)) => Ok(()),
        (0, local) => Err(ExecutionError::NonZeroExitStatus {
            command: format!("tar -czf - {}", src),
            code: local.unwrap_or(-1),
        }),
        (remote_code, _) => Err(ExecutionError::NonZeroExitStatus {
            command: remote.to_string(),
            code: remote_code,
        }),
    }
}

fn expand(cmd: &Command, raw: &str, env: &EnvList) -> Result<String, SchedulerError> {
    ExpandEvaluator
        .evaluate(raw, env)
        .map_err(|source| SchedulerError::Expand {
            command: cmd.name.clone(),
            raw: raw.to_string(),
            source,
        })
}
