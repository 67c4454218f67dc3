use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// rootless-setup - Provision a rootless container engine for a service account
#[derive(Parser, Debug)]
#[command(name = "rootless-setup")]
#[command(about = "Configure a rootless container engine for a dedicated service account")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file (missing fields use defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Treat DIR as the host's filesystem root
    #[arg(long, value_name = "DIR", global = true, default_value = "/")]
    pub root: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the full provisioning pipeline (default)
    Install,
    /// Check privileges and detect the OS, then exit
    Preflight,
    /// Validate an existing rootless setup
    Validate,
    /// Print the daemon.json that install would write
    DaemonConfig,
    /// Print the AppArmor profile name for a binary path
    ProfileName {
        /// Absolute path to the binary (default: configured supervisor binary)
        binary: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run; `install` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Install)
    }
}
