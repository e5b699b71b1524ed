//! # Host Resolver
//!
//! Turns the selected network into the concrete, ordered and deduplicated host
//! list of one run. The host source is either the network's inventory command
//! or its static `hosts` list; the operator's `--only`/`--except` filters are
//! then applied in that order.

use crate::core::registry::Networks;
use crate::models::{Host, Network};
use crate::system::executor::{self, ExecutionError};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Unknown network '{0}'")]
    UnknownNetwork(String),
    #[error("network has no hosts: '{0}'")]
    NoHosts(String),
    #[error("no hosts match --only '{0}' regexp")]
    NoHostsMatch(String),
    #[error("no hosts left after --except '{0}' regexp")]
    NoHostsLeft(String),
    #[error("invalid --{flag} '{pattern}': error parsing regexp: {source}")]
    InvalidFilter {
        flag: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("inventory command of network '{network}' failed: {source}")]
    Inventory {
        network: String,
        #[source]
        source: ExecutionError,
    },
    #[error("invalid host '{host}': {reason}")]
    InvalidHost { host: String, reason: String },
}

/// The operator's host filters, compiled once before any host is contacted.
#[derive(Debug, Default)]
pub struct HostFilter {
    only: Option<Regex>,
    except: Option<Regex>,
}

impl HostFilter {
    /// Compiles the filters. An empty pattern means "no filter".
    pub fn compile(only: &str, except: &str) -> Result<Self, ResolutionError> {
        Ok(Self {
            only: compile_pattern("only", only)?,
            except: compile_pattern("except", except)?,
        })
    }

    /// Applies `--only` then `--except` to `hosts`, keeping their order.
    pub fn apply(&self, hosts: Vec<Host>) -> Result<Vec<Host>, ResolutionError> {
        let mut hosts = hosts;
        if let Some(only) = &self.only {
            hosts.retain(|h| only.is_match(&h.name));
            if hosts.is_empty() {
                return Err(ResolutionError::NoHostsMatch(only.as_str().to_string()));
            }
        }
        if let Some(except) = &self.except {
            hosts.retain(|h| !except.is_match(&h.name));
            if hosts.is_empty() {
                return Err(ResolutionError::NoHostsLeft(except.as_str().to_string()));
            }
        }
        Ok(hosts)
    }
}

fn compile_pattern(flag: &'static str, pattern: &str) -> Result<Option<Regex>, ResolutionError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|source| ResolutionError::InvalidFilter {
            flag,
            pattern: pattern.to_string(),
            source,
        })
}

/// Looks the network up by name.
pub fn select<'a>(networks: &'a Networks, name: &str) -> Result<&'a Network, ResolutionError> {
    networks
        .get(name)
        .ok_or_else(|| ResolutionError::UnknownNetwork(name.to_string()))
}

/// Resolves the hosts of `network` for one run.
///
/// The inventory command, when declared, runs once in `cwd` through `sh`.
pub fn resolve(
    network_name: &str,
    network: &Network,
    filter: &HostFilter,
    cwd: &Path,
) -> Result<Vec<Host>, ResolutionError> {
    let raw_hosts = if network.inventory.is_empty() {
        network.hosts.clone()
    } else {
        if !network.hosts.is_empty() {
            log::warn!(
                "Network '{}' declares both `inventory` and `hosts`; the static hosts are ignored",
                network_name
            );
        }
        log::debug!("Running inventory of network '{}': {}", network_name, network.inventory);
        let output = executor::capture_shell_output("sh", &network.inventory, cwd).map_err(|source| {
            ResolutionError::Inventory {
                network: network_name.to_string(),
                source,
            }
        })?;
        parse_inventory(&output)
    };

    let mut seen = HashSet::new();
    let mut hosts = Vec::with_capacity(raw_hosts.len());
    for raw in raw_hosts {
        let raw = raw.trim();
        if raw.is_empty() || !seen.insert(raw.to_string()) {
            continue;
        }
        hosts.push(parse_host(raw, network)?);
    }

    if hosts.is_empty() {
        return Err(ResolutionError::NoHosts(network_name.to_string()));
    }

    let hosts = filter.apply(hosts)?;
    log::debug!(
        "Resolved {} host(s) for network '{}': {:?}",
        hosts.len(),
        network_name,
        hosts.iter().map(|h| h.name.as_str()).collect::<Vec<_>>()
    );
    Ok(hosts)
}

/// Splits inventory output into host strings. Blank lines and `#` comments
/// are dropped.
pub fn parse_inventory(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Parses `[user@]host[:port]` and attaches the network's connection metadata.
pub fn parse_host(raw: &str, network: &Network) -> Result<Host, ResolutionError> {
    let invalid = |reason: &str| ResolutionError::InvalidHost {
        host: raw.to_string(),
        reason: reason.to_string(),
    };

    let (user, address) = match raw.split_once('@') {
        Some(("", _)) => return Err(invalid("empty user")),
        Some((user, address)) => (Some(user.to_string()), address),
        None => (None, raw),
    };

    let (hostname, port) = if let Some(rest) = address.strip_prefix('[') {
        let (hostname, tail) = rest.split_once(']').ok_or_else(|| invalid("unterminated '['"))?;
        match tail.strip_prefix(':') {
            Some(port) => (hostname, Some(port)),
            None if tail.is_empty() => (hostname, None),
            None => return Err(invalid("unexpected text after ']'")),
        }
    } else {
        match address.split_once(':') {
            Some((hostname, port)) => (hostname, Some(port)),
            None => (address, None),
        }
    };

    if hostname.is_empty() {
        return Err(invalid("empty host name"));
    }
    let port = port
        .map(|p| p.parse::<u16>().map_err(|_| invalid("port is not a number")))
        .transpose()?;

    let identity_file = if network.identity_file.is_empty() {
        None
    } else {
        let expanded = shellexpand::full(&network.identity_file).map_err(|e| ResolutionError::InvalidHost {
            host: raw.to_string(),
            reason: format!("identity_file: {}", e),
        })?;
        Some(expanded.into_owned())
    };

    Ok(Host {
        name: raw.to_string(),
        user: user.or_else(|| Some(network.user.clone()).filter(|u| !u.is_empty())),
        hostname: hostname.to_string(),
        port,
        bastion: Some(network.bastion.clone()).filter(|b| !b.is_empty()),
        identity_file,
    })
}
