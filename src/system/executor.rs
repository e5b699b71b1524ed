// src/system/executor.rs

use crate::system::output::HostWriter;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdout, Command as StdCommand, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, #[source] io::Error),
    #[error("Command '{command}' exited with status {code}.")]
    NonZeroExitStatus { command: String, code: i32 },
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("I/O error while streaming '{command}': {source}")]
    Stream {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Runs `script` through `<shell> -c` and captures its standard output.
/// Stderr is passed through to the user's terminal.
///
/// Used for short-lived evaluations: dynamic env values and inventory commands.
pub fn capture_shell_output(shell: &str, script: &str, cwd: &Path) -> Result<String, ExecutionError> {
    let clean_cwd = dunce::simplified(cwd);
    log::trace!("Capturing output of `{} -c {}`", shell, script);

    let command_output = StdCommand::new(shell)
        .arg("-c")
        .arg(script)
        .current_dir(clean_cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| ExecutionError::CommandFailed(script.to_string(), e))?;

    if !command_output.status.success() {
        return Err(ExecutionError::NonZeroExitStatus {
            command: script.to_string(),
            code: command_output.status.code().unwrap_or(-1),
        });
    }

    String::from_utf8(command_output.stdout).map_err(|e| ExecutionError::InvalidUtf8Output {
        command: script.to_string(),
        source: e,
    })
}

/// Spawns `command`, streams its stdout and stderr line by line into `writer`,
/// feeds it `input` when given, and returns the exit code once it finishes.
///
/// A process killed by a signal reports `-1`.
pub fn run_streaming(
    command: &mut StdCommand,
    label: &str,
    input: Option<Box<dyn Read + Send>>,
    writer: &HostWriter,
) -> Result<i32, ExecutionError> {
    command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| ExecutionError::CommandFailed(label.to_string(), e))?;
    log::debug!("Spawned '{}' (PID: {})", label, child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdin = child.stdin.take();

    // Detached: the input may never reach end of file, and the child is done
    // once its output pipes close.
    if let (Some(mut source), Some(mut sink)) = (input, stdin) {
        let label = label.to_string();
        std::thread::spawn(move || {
            // The child closing its stdin early is not an error for us.
            if let Err(e) = io::copy(&mut source, &mut sink) {
                log::debug!("Input stream for '{}' closed: {}", label, e);
            }
            let _ = sink.flush();
        });
    }

    let streamed: io::Result<()> = std::thread::scope(|scope| {
        let err_handle = stderr.map(|pipe| scope.spawn(move || writer.copy_lines(pipe)));
        let out_result = match stdout {
            Some(pipe) => writer.copy_lines(pipe),
            None => Ok(()),
        };
        let err_result = match err_handle {
            Some(handle) => handle.join().unwrap_or(Ok(())),
            None => Ok(()),
        };
        out_result.and(err_result)
    });

    let status = child
        .wait()
        .map_err(|e| ExecutionError::CommandFailed(label.to_string(), e))?;
    streamed.map_err(|source| ExecutionError::Stream {
        command: label.to_string(),
        source,
    })?;

    Ok(status.code().unwrap_or(-1))
}

/// Starts a local `tar` that writes a gzipped archive of `src` (relative to
/// `cwd`) to its stdout, skipping anything matching `excludes`.
pub fn spawn_archive(cwd: &Path, src: &str, excludes: &[String]) -> Result<(Child, ChildStdout), ExecutionError> {
    let mut command = StdCommand::new("tar");
    command.arg("-C").arg(dunce::simplified(cwd)).arg("-czf").arg("-");
    for pattern in excludes {
        command.arg(format!("--exclude={}", pattern));
    }
    command.arg(src);

    let label = format!("tar -czf - {}", src);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| ExecutionError::CommandFailed(label.clone(), e))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExecutionError::CommandParse(label))?;
    Ok((child, stdout))
}
