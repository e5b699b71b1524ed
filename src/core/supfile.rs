//! # Supfile document
//!
//! The parsed configuration unit: networks, commands, targets, the global
//! environment and the declared includes. A `Supfile` is built once per run by
//! [`Supfile::parse`], folded with its includes by the loader, and immutable
//! afterwards.

use crate::core::commons::{null_as_default, scalar_string};
use crate::core::compat;
use crate::core::env_list::EnvList;
use crate::core::registry::{Commands, Networks, Targets};
use crate::models::Include;
use serde::Deserialize;
use std::io::{self, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Error parsing Supfile: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{message}\n\nPlease upgrade sup to a release that supports this Supfile.")]
    MustUpgrade { message: String },
    #[error(
        "unsupported Supfile version {version}\n\nCheck your Supfile version (available latest version: v{latest})",
        latest = crate::constants::LATEST_SUPFILE_VERSION
    )]
    UnsupportedVersion { version: String },
    #[error("command '{name}': {reason}")]
    InvalidCommand { name: String, reason: String },
    #[error("Could not read Supfile '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("No Supfile found in '{dir}' (looked for {tried})")]
    NotFound { dir: String, tried: String },
    #[error("Include cycle detected: {chain}")]
    IncludeCycle { chain: String },
    #[error("Includes are nested deeper than {0} levels")]
    IncludeDepth(usize),
    #[error("In included Supfile '{path}': {source}")]
    Include {
        path: String,
        #[source]
        source: Box<LoadError>,
    },
}

/// Represents the Supfile configuration document.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Supfile {
    #[serde(deserialize_with = "null_as_default")]
    pub networks: Networks,
    #[serde(deserialize_with = "null_as_default")]
    pub commands: Commands,
    #[serde(deserialize_with = "null_as_default")]
    pub targets: Targets,
    #[serde(deserialize_with = "null_as_default")]
    pub env: EnvList,
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub includes: Vec<Include>,
}

impl Supfile {
    /// Decodes `data` and applies the version compatibility rules.
    ///
    /// Legacy-field notices go to `diagnostics`, and only once the whole
    /// document has been accepted.
    pub fn parse(data: &[u8], diagnostics: &mut dyn Write) -> Result<Self, LoadError> {
        let mut conf: Self = serde_yaml::from_slice(data)?;

        for (name, cmd) in conf.commands.iter_mut() {
            cmd.name = name.to_string();
        }

        let notices = compat::apply(&mut conf)?;
        conf.validate_commands()?;

        for notice in notices {
            log::debug!("{}", notice);
            if let Err(e) = writeln!(diagnostics, "{}", notice) {
                log::warn!("Could not write Supfile notice: {}", e);
            }
        }

        log::debug!(
            "Parsed Supfile v{}: {} network(s), {} command(s), {} target(s), {} include(s)",
            conf.version,
            conf.networks.len(),
            conf.commands.len(),
            conf.targets.len(),
            conf.includes.len()
        );
        Ok(conf)
    }

    fn validate_commands(&self) -> Result<(), LoadError> {
        for (name, cmd) in self.commands.iter() {
            let bodies = [&cmd.local, &cmd.run, &cmd.script]
                .iter()
                .filter(|body| !body.is_empty())
                .count();
            let reason = if bodies > 1 {
                Some("only one of `local`, `run` and `script` may be set")
            } else if cmd.serial < 0 {
                Some("`serial` must not be negative")
            } else if cmd.serial > 0 && cmd.once {
                Some("`serial` cannot be combined with `once`")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(LoadError::InvalidCommand {
                    name: name.to_string(),
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Folds `overrides` on top of `base` and returns the combined document.
///
/// Environment: the `injected` names are seeded first with the values they hold
/// in `overrides`, then `base`'s entries, then `overrides`' entries, each with
/// the update-in-place-or-append rule. A key therefore keeps the position where
/// it first appeared while its value comes from the last writer.
///
/// Registries: entities from `overrides` replace same-named ones from `base`.
/// Version and includes are those of `overrides`.
pub fn merge(base: Supfile, overrides: &Supfile, injected: &[String]) -> Supfile {
    let mut env = EnvList::new();
    for name in injected {
        env.set(name.clone(), overrides.env.get(name));
    }
    env.extend_from(&base.env);
    env.extend_from(&overrides.env);

    let mut networks = base.networks;
    networks.merge_from(overrides.networks.clone());
    let mut commands = base.commands;
    commands.merge_from(overrides.commands.clone());
    let mut targets = base.targets;
    targets.merge_from(overrides.targets.clone());

    Supfile {
        networks,
        commands,
        targets,
        env,
        version: overrides.version.clone(),
        includes: overrides.includes.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evaluator::ExpandEvaluator;

    fn parse(yaml: &str) -> Result<Supfile, LoadError> {
        Supfile::parse(yaml.as_bytes(), &mut io::sink())
    }

    const MASTER: &str = r#"
version: 0.4
env:
  INCLUDED_VAR: I am included
  VAR_TO_BE_OVERWRITTEN: I will not last
  MIDDLE: $BEGINNING-middle
  ALTERNATIVE: $BEGINNING-error
networks:
  staging:
    hosts: [server0, server2]
  production:
    hosts: [server3, server4]
commands:
  step1:
    run: echo "Hey over there"
  step2:
    run: echo "Are you still there?"
targets:
  walk: [step1, step2]
"#;

    #[test]
    fn test_invalid_yaml_fails() {
        let err = parse("---\nversion: 0.4\nefewf we\nwe\tkp\tre\n").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn test_parse_fills_command_names() {
        let conf = parse(MASTER).unwrap();
        assert_eq!(conf.commands.get("step2").unwrap().name, "step2");
        assert_eq!(conf.networks.names(), &["staging", "production"]);
    }

    #[test]
    fn test_parse_rejects_two_command_bodies() {
        let err = parse("version: 0.6\ncommands:\n  a:\n    run: ls\n    local: ls\n").unwrap_err();
        assert!(err.to_string().contains("only one of"));
    }

    #[test]
    fn test_parse_rejects_serial_with_once() {
        let err = parse("version: 0.6\ncommands:\n  a:\n    run: ls\n    once: true\n    serial: 2\n").unwrap_err();
        assert!(matches!(err, LoadError::InvalidCommand { .. }));
    }

    #[test]
    fn test_v0_3_notice_is_written_to_diagnostics() {
        let mut diagnostics = Vec::new();
        let conf = Supfile::parse(
            b"version: 0.3\ncommands:\n  a:\n    run: ls\n    run_once: true\n",
            &mut diagnostics,
        )
        .unwrap();
        assert!(conf.commands.get("a").unwrap().once);
        let text = String::from_utf8(diagnostics).unwrap();
        assert!(text.contains("run_once was deprecated"));
    }

    #[test]
    fn test_rejected_document_writes_no_notice() {
        let mut diagnostics = Vec::new();
        let result = Supfile::parse(
            b"version: 0.3\nincludes:\n  - supfile: x\ncommands:\n  a:\n    run: ls\n    run_once: true\n",
            &mut diagnostics,
        );
        assert!(result.is_err());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_merge_override_wins_on_value_base_wins_on_position() {
        let base = parse("version: 0.6\nenv:\n  A: 1\n  B: 2\n").unwrap();
        let over = parse("version: 0.6\nenv:\n  B: 3\n  C: 4\n").unwrap();
        let merged = merge(base, &over, &[]);
        let pairs: Vec<String> = merged.env.iter().map(|v| v.to_string()).collect();
        assert_eq!(pairs, vec!["A=1", "B=3", "C=4"]);
    }

    #[test]
    fn test_merge_injection_reaches_included_expansions() {
        let base = parse(MASTER).unwrap();
        let over = parse(
            "version: 0.6\nenv:\n  BEGINNING: beginning\n  END: $MIDDLE-end\n  ALTERNATIVE: $BEGINNING-overruled\n",
        )
        .unwrap();
        let mut merged = merge(base, &over, &["BEGINNING".to_string()]);

        assert_eq!(merged.env.keys().next(), Some("BEGINNING"));
        merged.env.resolve_values(&ExpandEvaluator).unwrap();
        assert_eq!(merged.env.get("MIDDLE"), "beginning-middle");
        assert_eq!(merged.env.get("END"), "beginning-middle-end");
        assert_eq!(merged.env.get("ALTERNATIVE"), "beginning-overruled");
        assert_eq!(merged.env.get("INCLUDED_VAR"), "I am included");
    }

    #[test]
    fn test_merge_registries_override_by_name() {
        let base = parse(MASTER).unwrap();
        let over = parse(
            "version: 0.6\nnetworks:\n  staging:\n    hosts: [server2]\ncommands:\n  step1:\n    run: echo \"Overruled\"\ntargets:\n  run: [step2]\n",
        )
        .unwrap();
        let merged = merge(base, &over, &[]);

        assert_eq!(merged.networks.get("staging").unwrap().hosts, vec!["server2"]);
        assert_eq!(merged.networks.get("production").unwrap().hosts, vec!["server3", "server4"]);
        assert_eq!(merged.commands.get("step1").unwrap().run, "echo \"Overruled\"");
        assert_eq!(merged.commands.get("step2").unwrap().run, "echo \"Are you still there?\"");
        assert_eq!(merged.targets.names(), &["walk", "run"]);
        assert_eq!(merged.version, "0.6");
    }
}
