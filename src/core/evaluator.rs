// src/core/evaluator.rs

use crate::core::env_list::EnvList;
use crate::system::executor::{self, ExecutionError};
use std::path::PathBuf;

/// Turns a raw environment value into its final text, given the entries
/// resolved so far.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, raw: &str, resolved: &EnvList) -> Result<String, ExecutionError>;
}

/// Evaluates values in a real `bash`, with the already-resolved entries exported
/// first. Supports the full shell language (`$(...)`, `${VAR:-default}`, ...).
#[derive(Debug, Clone, Default)]
pub struct ShellEvaluator {
    cwd: Option<PathBuf>,
}

impl ShellEvaluator {
    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }
}

impl ExpressionEvaluator for ShellEvaluator {
    fn evaluate(&self, raw: &str, resolved: &EnvList) -> Result<String, ExecutionError> {
        let script = format!("{}echo -n {};", resolved.as_export(), raw);
        let cwd = match &self.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| ExecutionError::CommandFailed(script.clone(), e))?,
        };
        executor::capture_shell_output("bash", &script, &cwd)
    }
}

/// In-process evaluator that only performs `$VAR`/`${VAR}` substitution.
/// Unknown variables expand to an empty string, as in a shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandEvaluator;

impl ExpressionEvaluator for ExpandEvaluator {
    fn evaluate(&self, raw: &str, resolved: &EnvList) -> Result<String, ExecutionError> {
        let expanded = shellexpand::env_with_context(raw, |name| {
            Ok::<_, std::convert::Infallible>(Some(resolved.get(name).to_string()))
        });
        match expanded {
            Ok(value) => Ok(value.into_owned()),
            Err(err) => match err.cause {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_evaluator_substitutes_known_and_unknown() {
        let mut env = EnvList::new();
        env.set("HOST", "db1");
        let value = ExpandEvaluator
            .evaluate("${HOST}:5432/$MISSING", &env)
            .unwrap();
        assert_eq!(value, "db1:5432/");
    }

    #[test]
    fn test_shell_evaluator_sees_exports() {
        let mut env = EnvList::new();
        env.set("NAME", "world");
        let value = ShellEvaluator::default()
            .evaluate("hello-$NAME", &env)
            .unwrap();
        assert_eq!(value, "hello-world");
    }
}
