// src/models.rs

use crate::constants::LOCALHOST;
use crate::core::commons::null_as_default;
use crate::core::env_list::EnvList;
use serde::Deserialize;
use std::fmt;

// --- SUPFILE MODELS (What is read from the configuration file) ---

/// A named group of hosts with its own environment and connection metadata.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Network {
    #[serde(deserialize_with = "null_as_default")]
    pub env: EnvList,
    /// Shell command whose stdout lines become the host list at run time.
    #[serde(deserialize_with = "null_as_default")]
    pub inventory: String,
    #[serde(deserialize_with = "null_as_default")]
    pub hosts: Vec<String>,
    /// Jump host every member of the network is reached through.
    #[serde(deserialize_with = "null_as_default")]
    pub bastion: String,
    /// Login applied to hosts that do not carry a `user@` part.
    #[serde(deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(deserialize_with = "null_as_default")]
    pub identity_file: String,
}

/// Represents a command in the Supfile.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Command {
    /// Filled from the registry key after parsing.
    #[serde(skip)]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub desc: String,
    /// Command(s) to be run on the invoking machine.
    #[serde(deserialize_with = "null_as_default")]
    pub local: String,
    /// Command(s) to be run on the remote hosts.
    #[serde(deserialize_with = "null_as_default")]
    pub run: String,
    /// Local script file whose contents are run on the remote hosts.
    #[serde(deserialize_with = "null_as_default")]
    pub script: String,
    #[serde(deserialize_with = "null_as_default")]
    pub upload: Vec<Upload>,
    /// Attach the local standard input to the remote command.
    pub stdin: bool,
    /// Run on the first resolved host only.
    pub once: bool,
    /// Max number of hosts running this command at the same time. 0 = all.
    pub serial: i64,
    /// Pre-0.3 spelling of `once`.
    pub run_once: bool,
}

impl Command {
    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// Number of concurrent host slots for `host_count` hosts.
    pub fn concurrency(&self, host_count: usize) -> usize {
        let cap = usize::try_from(self.serial).unwrap_or(0);
        if cap == 0 || cap > host_count {
            host_count.max(1)
        } else {
            cap
        }
    }
}

/// A file copy from the invoking machine to every host of a command.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Upload {
    #[serde(deserialize_with = "null_as_default")]
    pub src: String,
    #[serde(deserialize_with = "null_as_default")]
    pub dst: String,
    /// Comma-separated `tar --exclude` patterns.
    #[serde(deserialize_with = "null_as_default")]
    pub exclude: String,
}

impl Upload {
    pub fn exclude_patterns(&self) -> Vec<String> {
        self.exclude
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Another Supfile folded in underneath the including one.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Include {
    #[serde(deserialize_with = "null_as_default")]
    pub supfile: String,
    /// Variables whose values the includer injects into the included file.
    #[serde(deserialize_with = "null_as_default")]
    pub env: Vec<String>,
}

// --- RUNTIME MODELS ---

/// A resolved host endpoint for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// The host string as written in the Supfile or inventory. Used for
    /// filtering, output prefixes and `SUP_HOST`.
    pub name: String,
    pub user: Option<String>,
    pub hostname: String,
    pub port: Option<u16>,
    /// Jump host to hop through, carried for the transport.
    pub bastion: Option<String>,
    pub identity_file: Option<String>,
}

impl Host {
    /// The invoking machine, used for `local` commands.
    pub fn local() -> Self {
        Self {
            name: LOCALHOST.to_string(),
            user: None,
            hostname: LOCALHOST.to_string(),
            port: None,
            bastion: None,
            identity_file: None,
        }
    }

    /// `user@hostname` or `hostname`.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.hostname),
            None => self.hostname.clone(),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
