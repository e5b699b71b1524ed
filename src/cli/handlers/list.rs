// src/cli/handlers/list.rs

use crate::core::supfile::Supfile;
use colored::Colorize;
use std::io::{self, Write};

/// Writes the available networks, in declaration order.
pub fn print_networks(conf: &Supfile, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "{}", t!("list.header.networks").yellow().bold())?;
    for (name, network) in conf.networks.iter() {
        let source = if network.inventory.is_empty() {
            format!("{} host(s)", network.hosts.len())
        } else {
            t!("list.label.inventory").to_string()
        };
        writeln!(out, "- {:<20} {}", name.cyan(), source.dimmed())?;
    }
    writeln!(out)
}

/// Writes the available targets and commands (with their descriptions).
pub fn print_commands(conf: &Supfile, out: &mut dyn Write) -> io::Result<()> {
    let width = conf
        .targets
        .names()
        .iter()
        .chain(conf.commands.names())
        .map(String::len)
        .max()
        .unwrap_or(0);

    if !conf.targets.is_empty() {
        writeln!(out, "{}", t!("list.header.targets").yellow().bold())?;
        for (name, members) in conf.targets.iter() {
            writeln!(
                out,
                "- {:<width$} {}",
                name.cyan(),
                members.join(" ").dimmed(),
                width = width
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{}", t!("list.header.commands").yellow().bold())?;
    for (name, cmd) in conf.commands.iter() {
        writeln!(out, "- {:<width$} {}", name.cyan(), cmd.desc, width = width)?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: fn(&Supfile, &mut dyn Write) -> io::Result<()>) -> String {
        colored::control::set_override(false);
        let conf = Supfile::parse(
            b"version: 0.6\nnetworks:\n  staging:\n    hosts: [a, b]\n  dynamic:\n    inventory: echo x\ncommands:\n  ping:\n    desc: Ping it\n    run: echo pong\ntargets:\n  all: [ping, ping]\n",
            &mut io::sink(),
        )
        .unwrap();
        let mut out = Vec::new();
        f(&conf, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_networks_are_listed_in_order() {
        let text = render(print_networks);
        let staging = text.find("staging").unwrap();
        let dynamic = text.find("dynamic").unwrap();
        assert!(staging < dynamic);
        assert!(text.contains("2 host(s)"));
    }

    #[test]
    fn test_commands_and_targets_are_listed() {
        let text = render(print_commands);
        assert!(text.contains("Ping it"));
        assert!(text.contains("ping ping"));
    }
}
