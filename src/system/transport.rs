//! # Transports
//!
//! The narrow capability the scheduler uses to reach a host: run one command
//! line under an exported environment, optionally feed it an input stream,
//! stream its output to the host's writer and report the exit status.

use crate::models::Host;
use crate::system::executor::{self, ExecutionError};
use crate::system::output::HostWriter;
use std::io::Read;
use std::path::PathBuf;
use std::process::Command as StdCommand;

/// One command invocation on one host.
pub struct ExecRequest<'a> {
    pub host: &'a Host,
    /// `export K="v"; ...` prelude rendered from the host's environment.
    pub env_exports: &'a str,
    pub command: &'a str,
    pub input: Option<Box<dyn Read + Send>>,
    pub output: &'a HostWriter,
}

impl std::fmt::Debug for ExecRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecRequest")
            .field("host", &self.host.name)
            .field("command", &self.command)
            .field("input", &self.input.is_some())
            .finish()
    }
}

impl ExecRequest<'_> {
    /// The full shell script: exports first, then the command text.
    pub fn script(&self) -> String {
        format!("{}{}", self.env_exports, self.command)
    }
}

/// Runs commands on a host and returns their exit code.
///
/// A non-zero code is returned as `Ok`; `Err` means the command could not be
/// run or its output could not be streamed.
pub trait Transport: Send + Sync {
    fn execute(&self, request: ExecRequest<'_>) -> Result<i32, ExecutionError>;
}

/// Runs commands on the invoking machine through `bash -c`.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    cwd: PathBuf,
}

impl LocalTransport {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

impl Transport for LocalTransport {
    fn execute(&self, request: ExecRequest<'_>) -> Result<i32, ExecutionError> {
        let script = request.script();
        log::debug!("[{}] bash -c {}", request.host, request.command);
        let mut command = StdCommand::new("bash");
        command
            .arg("-c")
            .arg(&script)
            .current_dir(dunce::simplified(&self.cwd));
        executor::run_streaming(&mut command, request.command, request.input, request.output)
    }
}

/// Runs commands on remote hosts through the system `ssh` client.
#[derive(Debug, Clone)]
pub struct SshTransport {
    program: String,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
        }
    }
}

impl SshTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the `ssh` argument vector for `host` running `script` remotely.
    pub fn arguments(host: &Host, script: &str) -> Result<Vec<String>, ExecutionError> {
        let mut args = vec!["-T".to_string()];
        if let Some(port) = host.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &host.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        if let Some(bastion) = &host.bastion {
            args.push("-J".to_string());
            args.push(bastion.clone());
        }
        args.push(host.destination());

        let quoted = shlex::try_quote(script)
            .map_err(|e| ExecutionError::CommandParse(format!("{}: {}", host.name, e)))?;
        args.push(format!("bash -c {}", quoted));
        Ok(args)
    }
}

impl Transport for SshTransport {
    fn execute(&self, request: ExecRequest<'_>) -> Result<i32, ExecutionError> {
        let args = Self::arguments(request.host, &request.script())?;
        log::debug!("[{}] {} {}", request.host, self.program, request.command);
        let mut command = StdCommand::new(&self.program);
        command.args(&args);
        executor::run_streaming(&mut command, request.command, request.input, request.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host_resolver::parse_host;
    use crate::models::Network;
    use crate::system::output::OutputMux;

    #[test]
    fn test_ssh_arguments_carry_connection_metadata() {
        let network = Network {
            bastion: "jump".to_string(),
            identity_file: "/keys/id".to_string(),
            ..Network::default()
        };
        let host = parse_host("deploy@web1:2222", &network).unwrap();
        let script = "export A=\"1\"; echo $A";
        let args = SshTransport::arguments(&host, script).unwrap();
        assert_eq!(
            &args[..8],
            &["-T", "-p", "2222", "-i", "/keys/id", "-J", "jump", "deploy@web1"]
        );
        let payload = args[8].strip_prefix("bash -c ").unwrap();
        assert_eq!(shlex::split(payload).unwrap(), vec![script.to_string()]);
    }

    #[test]
    fn test_local_transport_runs_with_exports_and_input() {
        let (mux, buffer) = OutputMux::capture(false);
        let writer = mux.writer_for("localhost", 0);
        let host = Host::local();
        let cwd = std::env::current_dir().unwrap();
        let code = LocalTransport::new(cwd)
            .execute(ExecRequest {
                host: &host,
                env_exports: "export GREETING=\"hi\"; ",
                command: "echo $GREETING; cat",
                input: Some(Box::new(&b"from stdin\n"[..])),
                output: &writer,
            })
            .unwrap();
        assert_eq!(code, 0);
        let text = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "hi\nfrom stdin\n");
    }

    #[test]
    fn test_local_transport_reports_exit_code() {
        let (mux, _) = OutputMux::capture(false);
        let writer = mux.writer_for("localhost", 0);
        let host = Host::local();
        let code = LocalTransport::new(std::env::current_dir().unwrap())
            .execute(ExecRequest {
                host: &host,
                env_exports: "",
                command: "exit 3",
                input: None,
                output: &writer,
            })
            .unwrap();
        assert_eq!(code, 3);
    }
}
