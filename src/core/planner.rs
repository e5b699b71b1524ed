// src/core/planner.rs

use crate::constants::MAX_TARGET_DEPTH;
use crate::core::registry::{Commands, Targets};
use crate::models::Command;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("Unknown command/target '{0}'")]
    Unknown(String),
    #[error("Target '{name}' references itself ({chain})")]
    Cycle { name: String, chain: String },
    #[error("Targets are nested deeper than {0} levels")]
    TooDeep(usize),
}

/// The flat, ordered list of commands one run executes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    commands: Vec<Command>,
}

impl ExecutionPlan {
    /// Expands `names` in order. A command name takes precedence over a target
    /// of the same name; targets are expanded in place, recursively.
    pub fn expand(names: &[String], commands: &Commands, targets: &Targets) -> Result<Self, PlanError> {
        let mut planner = Planner {
            commands,
            targets,
            stack: Vec::new(),
            out: Vec::new(),
        };
        for name in names {
            planner.visit(name)?;
        }
        log::debug!(
            "Execution plan: {:?}",
            planner.out.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );
        Ok(Self { commands: planner.out })
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Whether any planned command reads the local standard input.
    pub fn uses_stdin(&self) -> bool {
        self.commands.iter().any(|c| c.stdin)
    }
}

struct Planner<'a> {
    commands: &'a Commands,
    targets: &'a Targets,
    /// Targets currently being expanded, outermost first.
    stack: Vec<&'a str>,
    out: Vec<Command>,
}

impl<'a> Planner<'a> {
    fn visit(&mut self, name: &str) -> Result<(), PlanError> {
        if let Some(cmd) = self.commands.get(name) {
            self.out.push(cmd.clone());
            return Ok(());
        }

        let targets = self.targets;
        let Some((target_name, members)) = targets.entry(name) else {
            return Err(PlanError::Unknown(name.to_string()));
        };

        if self.stack.contains(&target_name) {
            let chain = self
                .stack
                .iter()
                .copied()
                .chain(std::iter::once(target_name))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(PlanError::Cycle {
                name: target_name.to_string(),
                chain,
            });
        }
        if self.stack.len() >= MAX_TARGET_DEPTH {
            return Err(PlanError::TooDeep(MAX_TARGET_DEPTH));
        }

        self.stack.push(target_name);
        for member in members {
            self.visit(member)?;
        }
        self.stack.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::supfile::Supfile;

    fn conf() -> Supfile {
        Supfile::parse(
            br#"
version: 0.6
commands:
  step1:
    run: echo 1
  step2:
    run: echo 2
  step3:
    run: echo 3
targets:
  walk: [step1, step2]
  run: [walk, step3]
  broken: [step1, step5]
  loop: [step1, again]
  again: [loop]
"#,
            &mut std::io::sink(),
        )
        .unwrap()
    }

    fn plan(names: &[&str]) -> Result<Vec<String>, PlanError> {
        let conf = conf();
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        ExecutionPlan::expand(&names, &conf.commands, &conf.targets)
            .map(|p| p.commands().iter().map(|c| c.name.clone()).collect())
    }

    #[test]
    fn test_target_keeps_member_order() {
        assert_eq!(plan(&["walk"]).unwrap(), vec!["step1", "step2"]);
    }

    #[test]
    fn test_nested_targets_expand_in_place() {
        assert_eq!(
            plan(&["step3", "run"]).unwrap(),
            vec!["step3", "step1", "step2", "step3"]
        );
    }

    #[test]
    fn test_unknown_name_is_reported_after_valid_ones() {
        assert_eq!(
            plan(&["step1", "step2", "step5"]).unwrap_err(),
            PlanError::Unknown("step5".to_string())
        );
        assert_eq!(
            plan(&["broken"]).unwrap_err(),
            PlanError::Unknown("step5".to_string())
        );
    }

    #[test]
    fn test_self_referencing_targets_are_rejected() {
        let err = plan(&["loop"]).unwrap_err();
        assert!(matches!(err, PlanError::Cycle { .. }));
        assert!(err.to_string().contains("loop -> again -> loop"));
    }
}
