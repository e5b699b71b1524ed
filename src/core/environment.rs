//! # Run Environment
//!
//! Assembles the ordered environment every command of a run is exported
//! with. Layers, in order:
//!
//! 1. the document's global `env`;
//! 2. the selected network's `env` (overrides by key, before resolution);
//! 3. dynamic resolution of every value, strictly in list order;
//! 4. `--env` values from the command line (taken literally);
//! 5. the run-scoped `SUP_*` variables.
//!
//! `SUP_HOST` is the only per-host variable and is added by [`for_host`].

use crate::constants::{SUP_ENV, SUP_HOST, SUP_NETWORK, SUP_TIME, SUP_USER};
use crate::core::env_list::{EnvError, EnvList};
use crate::core::evaluator::ExpressionEvaluator;
use crate::models::{Host, Network};
use std::collections::HashMap;

/// Snapshot of the process environment taken once at startup.
pub type ProcessEnv = HashMap<String, String>;

/// Parses repeated `--env` values. `KEY` alone exports an empty value and
/// empty arguments are ignored.
pub fn parse_cli_vars(args: &[String]) -> EnvList {
    let mut vars = EnvList::new();
    for arg in args {
        if arg.is_empty() {
            continue;
        }
        match arg.split_once('=') {
            Some((key, value)) => vars.set(key, value),
            None => vars.set(arg.as_str(), ""),
        }
    }
    vars
}

/// Renders the `KEY=value` CLI variables as the `-e KEY="value"` flags exported
/// in `SUP_ENV`. Bare `KEY` arguments are not part of it.
pub fn sup_env_flags(args: &[String]) -> String {
    let mut assigned = EnvList::new();
    for (key, value) in args.iter().filter_map(|arg| arg.split_once('=')) {
        assigned.set(key, value);
    }
    assigned
        .iter()
        .map(|v| format!("-e {}={:?}", v.key(), v.value()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the resolved, run-scoped environment.
pub fn assemble(
    global: &EnvList,
    network_name: &str,
    network: &Network,
    cli_args: &[String],
    process_env: &ProcessEnv,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<EnvList, EnvError> {
    let mut env = global.clone();
    env.extend_from(&network.env);
    env.resolve_values(evaluator)?;

    let cli_vars = parse_cli_vars(cli_args);
    env.extend_from(&cli_vars);

    env.set(SUP_ENV, sup_env_flags(cli_args));
    env.set(SUP_NETWORK, network_name);
    env.set(SUP_USER, invoking_user(process_env));
    env.set(SUP_TIME, run_time(process_env));

    log::debug!("Run environment: {:?}", env.keys().collect::<Vec<_>>());
    Ok(env)
}

/// The run environment for one host.
pub fn for_host(run_env: &EnvList, host: &Host) -> EnvList {
    let mut env = run_env.clone();
    env.set(SUP_HOST, host.name.as_str());
    env
}

fn invoking_user(process_env: &ProcessEnv) -> String {
    process_env
        .get(SUP_USER)
        .or_else(|| process_env.get("USER"))
        .cloned()
        .unwrap_or_default()
}

fn run_time(process_env: &ProcessEnv) -> String {
    match process_env.get(SUP_TIME) {
        Some(preset) if !preset.is_empty() => preset.clone(),
        _ => chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evaluator::ExpandEvaluator;
    use regex::Regex;

    fn process_env(pairs: &[(&str, &str)]) -> ProcessEnv {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn build(global: &str, network: &str, cli: &[&str], process: &ProcessEnv) -> EnvList {
        let global: EnvList = serde_yaml::from_str(global).unwrap();
        let network = Network {
            env: serde_yaml::from_str(network).unwrap(),
            ..Network::default()
        };
        let cli: Vec<String> = cli.iter().map(|s| s.to_string()).collect();
        assemble(&global, "staging", &network, &cli, process, &ExpandEvaluator).unwrap()
    }

    #[test]
    fn test_network_overrides_global_before_resolution() {
        let env = build(
            "IMAGE: app\nTAG: latest\nREF: $IMAGE:$TAG\n",
            "TAG: stable\n",
            &[],
            &ProcessEnv::new(),
        );
        assert_eq!(env.get("REF"), "app:stable");
    }

    #[test]
    fn test_cli_vars_win_and_are_literal() {
        let env = build(
            "TAG: latest\n",
            "{}",
            &["TAG=$HOME", "EMPTY", ""],
            &ProcessEnv::new(),
        );
        assert_eq!(env.get("TAG"), "$HOME");
        assert_eq!(env.lookup("EMPTY"), Some(""));
        assert_eq!(env.get(SUP_ENV), r#"-e TAG="$HOME""#);
    }

    #[test]
    fn test_sup_variables_defaults() {
        let env = build("{}", "{}", &[], &process_env(&[("USER", "sup_test_user")]));
        assert_eq!(env.get(SUP_NETWORK), "staging");
        assert_eq!(env.lookup(SUP_ENV), Some(""));
        assert_eq!(env.get(SUP_USER), "sup_test_user");
        let time_re = Regex::new(r"^\d{4}-\d{2}-\d{2}T[0-2]\d:[0-5]\d:[0-5]\dZ$").unwrap();
        assert!(time_re.is_match(env.get(SUP_TIME)));
    }

    #[test]
    fn test_sup_variables_honor_presets() {
        let env = build(
            "{}",
            "{}",
            &[],
            &process_env(&[("USER", "someone"), (SUP_USER, "sup_rules"), (SUP_TIME, "now")]),
        );
        assert_eq!(env.get(SUP_USER), "sup_rules");
        assert_eq!(env.get(SUP_TIME), "now");
    }

    #[test]
    fn test_for_host_adds_sup_host_last() {
        let env = build("A: 1\n", "{}", &[], &ProcessEnv::new());
        let host_env = for_host(&env, &Host::local());
        assert_eq!(host_env.keys().last(), Some(SUP_HOST));
        assert_eq!(host_env.get(SUP_HOST), "localhost");
    }
}
