//! Type-safe arguments for package-manager tools.
//!
//! - `AptGetArgs` for `apt-get`
//! - `DpkgQueryArgs` for `dpkg-query`
//! - `DnfArgs` for `dnf`
//! - `RpmQueryArgs` for `rpm -q`

use crate::tool_args::ToolArgs;

// ============================================================================
// apt-get
// ============================================================================

/// What `apt-get` should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AptAction {
    /// Refresh package indexes
    Update,
    /// Install without recommends
    Install(Vec<String>),
    /// Remove packages and their configuration
    Purge(Vec<String>),
}

/// Type-safe arguments for `apt-get`.
#[derive(Debug, Clone)]
pub struct AptGetArgs {
    pub action: AptAction,
}

impl ToolArgs for AptGetArgs {
    fn program(&self) -> String {
        "apt-get".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["-q".to_string()];
        match self.action {
            AptAction::Update => args.push("update".to_string()),
            AptAction::Install(ref pkgs) => {
                args.extend(["-y", "--no-install-recommends", "install"].map(String::from));
                args.extend(pkgs.iter().cloned());
            }
            AptAction::Purge(ref pkgs) => {
                args.extend(["-y", "purge"].map(String::from));
                args.extend(pkgs.iter().cloned());
            }
        }
        args
    }

    /// apt must never stop to ask a debconf question.
    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![(
            "DEBIAN_FRONTEND".to_string(),
            "noninteractive".to_string(),
        )]
    }
}

/// Type-safe arguments for `dpkg-query -W -f=${Status} <pkg>`.
#[derive(Debug, Clone)]
pub struct DpkgQueryArgs {
    pub package: String,
}

impl DpkgQueryArgs {
    /// dpkg keeps records for removed-but-not-purged packages; only this
    /// status means the files are on disk.
    pub const INSTALLED: &'static str = "install ok installed";
}

impl ToolArgs for DpkgQueryArgs {
    fn program(&self) -> String {
        "dpkg-query".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-W".to_string(),
            "-f=${Status}".to_string(),
            self.package.clone(),
        ]
    }
}

// ============================================================================
// dnf / rpm
// ============================================================================

/// What `dnf` should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnfAction {
    Install(Vec<String>),
    Remove(Vec<String>),
}

/// Type-safe arguments for `dnf`.
#[derive(Debug, Clone)]
pub struct DnfArgs {
    pub action: DnfAction,
}

impl ToolArgs for DnfArgs {
    fn program(&self) -> String {
        "dnf".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        let (verb, pkgs) = match self.action {
            DnfAction::Install(ref p) => ("install", p),
            DnfAction::Remove(ref p) => ("remove", p),
        };
        let mut args = vec!["-y".to_string(), "-q".to_string(), verb.to_string()];
        args.extend(pkgs.iter().cloned());
        args
    }
}

/// Type-safe arguments for `rpm -q <pkg>`; exits 0 only if installed.
#[derive(Debug, Clone)]
pub struct RpmQueryArgs {
    pub package: String,
}

impl ToolArgs for RpmQueryArgs {
    fn program(&self) -> String {
        "rpm".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-q".to_string(), self.package.clone()]
    }
}
