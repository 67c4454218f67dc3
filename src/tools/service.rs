//! Type-safe arguments for service-manager and kernel tools.
//!
//! - `SystemctlArgs` for `systemctl` (system or `--user` scope)
//! - `ModprobeArgs` for `modprobe`

use crate::tool_args::ToolArgs;
use crate::types::ServiceScope;

// ============================================================================
// systemctl
// ============================================================================

/// A `systemctl` verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemctlVerb {
    Stop,
    Disable,
    Start,
    Restart,
    /// `enable --now`
    EnableNow,
    DaemonReload,
    /// `is-active --quiet`
    IsActive,
}

impl SystemctlVerb {
    fn as_args(self) -> &'static [&'static str] {
        match self {
            Self::Stop => &["stop"],
            Self::Disable => &["disable"],
            Self::Start => &["start"],
            Self::Restart => &["restart"],
            Self::EnableNow => &["enable", "--now"],
            Self::DaemonReload => &["daemon-reload"],
            Self::IsActive => &["is-active", "--quiet"],
        }
    }
}

/// Type-safe arguments for `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemctlArgs {
    pub scope: ServiceScope,
    pub verb: SystemctlVerb,
    pub units: Vec<String>,
}

impl SystemctlArgs {
    pub fn new(scope: ServiceScope, verb: SystemctlVerb, units: &[&str]) -> Self {
        Self {
            scope,
            verb,
            units: units.iter().map(|u| u.to_string()).collect(),
        }
    }
}

impl ToolArgs for SystemctlArgs {
    fn program(&self) -> String {
        "systemctl".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.scope == ServiceScope::User {
            args.push("--user".to_string());
        }
        args.extend(self.verb.as_args().iter().map(|s| s.to_string()));
        args.extend(self.units.iter().cloned());
        args
    }
}

// ============================================================================
// modprobe
// ============================================================================

/// Type-safe arguments for `modprobe <module>`.
#[derive(Debug, Clone)]
pub struct ModprobeArgs {
    pub module: String,
}

impl ToolArgs for ModprobeArgs {
    fn program(&self) -> String {
        "modprobe".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.module.clone()]
    }
}
