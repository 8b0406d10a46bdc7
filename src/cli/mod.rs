// Privacy Guard — CLI Module
//
// Command-line interface using clap derive macros. `serve` runs the daemon;
// every other subcommand is a client of a running daemon.

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

pub use commands::{execute, load_config};

/// Privacy Guard — monitor and report access to privacy-sensitive data.
#[derive(Parser, Debug)]
#[command(name = "privacy-guard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon until SIGINT or SIGTERM.
    Serve,

    /// Decide whether a package may use a privilege.
    Check {
        package: String,

        /// Privilege identifier, e.g. http://tizen.org/privilege/location.
        privilege: String,

        #[arg(long)]
        user: Option<i32>,
    },

    /// Per-package monitor policies.
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// The per-user main monitor switch.
    MainPolicy {
        #[command(subcommand)]
        action: MainPolicyAction,
    },

    /// List packages that have monitor policies.
    Packages {
        /// Only packages with a policy for this privacy category.
        #[arg(long)]
        privacy: Option<String>,

        #[arg(long)]
        user: Option<i32>,
    },

    /// Access counts over a time window.
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },

    /// Register a package's privileges.
    Install {
        package: String,

        /// Declared privileges (repeatable).
        #[arg(long = "privilege", required = true)]
        privileges: Vec<String>,

        #[arg(long, value_enum, default_value_t = Switch::On)]
        monitor: Switch,

        #[arg(long)]
        user: Option<i32>,
    },

    /// Remove a package's logs and policies.
    Uninstall { package: String },

    /// Re-register a package: uninstall, then install.
    Upgrade {
        package: String,

        #[arg(long = "privilege", required = true)]
        privileges: Vec<String>,

        #[arg(long, value_enum, default_value_t = Switch::On)]
        monitor: Switch,

        #[arg(long)]
        user: Option<i32>,
    },

    /// Delete every log and policy.
    Reset {
        /// Required; there is no undo.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum PolicyAction {
    Get {
        package: String,
        privacy: String,
        #[arg(long)]
        user: Option<i32>,
    },
    Set {
        package: String,
        privacy: String,
        #[arg(value_enum)]
        value: Switch,
        #[arg(long)]
        user: Option<i32>,
    },
    /// All policies, or one package's.
    List {
        package: Option<String>,
        #[arg(long)]
        user: Option<i32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum MainPolicyAction {
    Get {
        #[arg(long)]
        user: Option<i32>,
    },
    Set {
        #[arg(value_enum)]
        value: Switch,
        #[arg(long)]
        user: Option<i32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReportKind {
    /// Counts per package.
    Packages {
        /// Restrict to one privacy category.
        #[arg(long)]
        privacy: Option<String>,
        #[command(flatten)]
        window: Window,
    },
    /// Counts per privacy category.
    Privacies {
        /// Restrict to one package.
        #[arg(long)]
        package: Option<String>,
        #[command(flatten)]
        window: Window,
    },
}

#[derive(Args, Debug, Clone)]
pub struct Window {
    /// Start of the window, seconds since the epoch.
    #[arg(long)]
    pub from: Option<i64>,

    /// End of the window, seconds since the epoch. Defaults to now.
    #[arg(long)]
    pub to: Option<i64>,

    /// Window length in days when --from is not given.
    #[arg(long, default_value = "7")]
    pub days: i64,

    #[arg(long)]
    pub user: Option<i32>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn as_policy(self) -> i32 {
        match self {
            Self::On => 1,
            Self::Off => 0,
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_policy_set() {
        let cli = Cli::try_parse_from([
            "privacy-guard",
            "--json",
            "policy",
            "set",
            "org.app",
            "http://tizen.org/privacy/location",
            "off",
            "--user",
            "5",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Policy {
                action: PolicyAction::Set { package, value, user, .. },
            } => {
                assert_eq!(package, "org.app");
                assert_eq!(value, Switch::Off);
                assert_eq!(user, Some(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_install_requires_privileges() {
        assert!(Cli::try_parse_from(["privacy-guard", "install", "org.app"]).is_err());
        let cli = Cli::try_parse_from([
            "privacy-guard",
            "install",
            "org.app",
            "--privilege",
            "a",
            "--privilege",
            "b",
        ])
        .unwrap();
        match cli.command {
            Commands::Install { privileges, monitor, .. } => {
                assert_eq!(privileges, vec!["a", "b"]);
                assert!(monitor.is_on());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
