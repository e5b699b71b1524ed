//! # Supfile version compatibility
//!
//! Older Supfile versions enable legacy fields and forbid newer ones. The rules
//! below are ordered from the oldest threshold to the newest; a document
//! declaring version `v` is subject to every rule whose threshold is `>= v`.
//! All forbidding checks run against the document as parsed, and migrations are
//! applied only once every check has passed, so a document is either accepted
//! whole or rejected whole.

use crate::constants::LATEST_SUPFILE_VERSION;
use crate::core::supfile::{LoadError, Supfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SupfileVersion {
    V0_1,
    V0_2,
    V0_3,
    V0_4,
    V0_5,
    V0_6,
}

impl SupfileVersion {
    /// An empty version means `0.1`. Unknown versions yield `None`.
    pub fn parse(version: &str) -> Option<Self> {
        match version.trim() {
            "" | "0.1" => Some(Self::V0_1),
            "0.2" => Some(Self::V0_2),
            "0.3" => Some(Self::V0_3),
            "0.4" => Some(Self::V0_4),
            "0.5" => Some(Self::V0_5),
            "0.6" => Some(Self::V0_6),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V0_1 => "0.1",
            Self::V0_2 => "0.2",
            Self::V0_3 => "0.3",
            Self::V0_4 => "0.4",
            Self::V0_5 => "0.5",
            Self::V0_6 => LATEST_SUPFILE_VERSION,
        }
    }
}

type Check = fn(&Supfile, SupfileVersion) -> Result<(), LoadError>;
type Migration = fn(&mut Supfile, SupfileVersion) -> Option<String>;

enum Rule {
    Forbid(Check),
    Migrate(Migration),
}

struct CompatRule {
    /// Newest version the rule still applies to.
    through: SupfileVersion,
    rule: Rule,
}

static RULES: &[CompatRule] = &[
    CompatRule {
        through: SupfileVersion::V0_1,
        rule: Rule::Forbid(forbid_run_once),
    },
    CompatRule {
        through: SupfileVersion::V0_2,
        rule: Rule::Forbid(forbid_v0_3_fields),
    },
    CompatRule {
        through: SupfileVersion::V0_3,
        rule: Rule::Migrate(migrate_run_once),
    },
    CompatRule {
        through: SupfileVersion::V0_5,
        rule: Rule::Forbid(forbid_includes),
    },
];

/// Validates `conf` against its declared version and applies legacy migrations.
///
/// Normalizes an empty version to `0.1`. Returns the upgrade notices to show
/// the operator.
pub fn apply(conf: &mut Supfile) -> Result<Vec<String>, LoadError> {
    let version = SupfileVersion::parse(&conf.version).ok_or_else(|| LoadError::UnsupportedVersion {
        version: conf.version.clone(),
    })?;
    conf.version = version.as_str().to_string();

    let applicable: Vec<&CompatRule> = RULES.iter().filter(|r| version <= r.through).collect();

    for rule in &applicable {
        if let Rule::Forbid(check) = rule.rule {
            check(conf, version)?;
        }
    }

    let mut notices = Vec::new();
    for rule in &applicable {
        if let Rule::Migrate(migrate) = rule.rule {
            notices.extend(migrate(conf, version));
        }
    }
    Ok(notices)
}

fn must_upgrade(subject: &str, version: SupfileVersion) -> LoadError {
    LoadError::MustUpgrade {
        message: format!("{} not supported in Supfile v{}", subject, version.as_str()),
    }
}

fn forbid_run_once(conf: &Supfile, version: SupfileVersion) -> Result<(), LoadError> {
    if conf.commands.iter().any(|(_, cmd)| cmd.run_once) {
        return Err(must_upgrade("command.run_once is", version));
    }
    Ok(())
}

fn forbid_v0_3_fields(conf: &Supfile, version: SupfileVersion) -> Result<(), LoadError> {
    for (_, cmd) in conf.commands.iter() {
        if cmd.once {
            return Err(must_upgrade("command.once is", version));
        }
        if !cmd.local.is_empty() {
            return Err(must_upgrade("command.local is", version));
        }
        if cmd.serial != 0 {
            return Err(must_upgrade("command.serial is", version));
        }
    }
    if conf.networks.iter().any(|(_, net)| !net.inventory.is_empty()) {
        return Err(must_upgrade("network.inventory is", version));
    }
    Ok(())
}

fn forbid_includes(conf: &Supfile, version: SupfileVersion) -> Result<(), LoadError> {
    if !conf.includes.is_empty() {
        return Err(must_upgrade("includes are", version));
    }
    Ok(())
}

fn migrate_run_once(conf: &mut Supfile, version: SupfileVersion) -> Option<String> {
    let mut migrated = false;
    for (_, cmd) in conf.commands.iter_mut() {
        if cmd.run_once {
            cmd.once = true;
            migrated = true;
        }
    }
    migrated.then(|| {
        format!(
            "Warning: command.run_once was deprecated by command.once in Supfile v{}",
            version.as_str()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_raw(yaml: &str) -> Supfile {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_version_ordering_and_parsing() {
        assert!(SupfileVersion::V0_1 < SupfileVersion::V0_6);
        assert_eq!(SupfileVersion::parse(""), Some(SupfileVersion::V0_1));
        assert_eq!(SupfileVersion::parse("0.7"), None);
    }

    #[test]
    fn test_empty_version_is_normalized() {
        let mut conf = parse_raw("commands:\n  a:\n    run: ls\n");
        apply(&mut conf).unwrap();
        assert_eq!(conf.version, "0.1");
    }

    #[test]
    fn test_v0_1_rejects_run_once() {
        let mut conf = parse_raw("version: 0.1\ncommands:\n  a:\n    run: ls\n    run_once: true\n");
        let err = apply(&mut conf).unwrap_err();
        assert!(err.to_string().contains("command.run_once is not supported in Supfile v0.1"));
    }

    #[test]
    fn test_v0_2_rejects_serial_local_once_inventory() {
        for body in [
            "commands:\n  a:\n    run: ls\n    serial: 2\n",
            "commands:\n  a:\n    local: ls\n",
            "commands:\n  a:\n    run: ls\n    once: true\n",
            "networks:\n  n:\n    inventory: echo host\n",
        ] {
            let mut conf = parse_raw(&format!("version: 0.2\n{}", body));
            assert!(
                matches!(apply(&mut conf), Err(LoadError::MustUpgrade { .. })),
                "expected rejection for {}",
                body
            );
        }
    }

    #[test]
    fn test_v0_3_migrates_run_once_with_notice() {
        let mut conf = parse_raw("version: 0.3\ncommands:\n  a:\n    run: ls\n    run_once: true\n");
        let notices = apply(&mut conf).unwrap();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].starts_with("Warning: command.run_once was deprecated"));
        assert!(conf.commands.get("a").unwrap().once);
    }

    #[test]
    fn test_v0_4_and_v0_5_reject_includes() {
        for version in ["0.4", "0.5", "0.1"] {
            let mut conf = parse_raw(&format!(
                "version: \"{}\"\nincludes:\n  - supfile: other.yml\n",
                version
            ));
            let err = apply(&mut conf).unwrap_err();
            assert!(err.to_string().contains("includes are not supported"));
        }
    }

    #[test]
    fn test_v0_6_permits_everything() {
        let mut conf = parse_raw(
            "version: 0.6\nincludes:\n  - supfile: other.yml\nnetworks:\n  n:\n    inventory: echo h\ncommands:\n  a:\n    local: ls\n    serial: 1\n",
        );
        assert!(apply(&mut conf).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_version_is_fatal() {
        let mut conf = parse_raw("version: 1.0\n");
        assert!(matches!(
            apply(&mut conf),
            Err(LoadError::UnsupportedVersion { .. })
        ));
    }
}
