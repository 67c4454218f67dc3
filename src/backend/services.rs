//! Service supervisor (systemd) for both the system and per-user managers.

use crate::error::Result;
use crate::runner::{run_tool, run_tool_checked, CommandRunner, Identity};
use crate::tools::service::{SystemctlArgs, SystemctlVerb};
use crate::types::ServiceScope;

/// Starts, stops and queries units.
///
/// Methods return `Err` when the manager reports failure; callers decide
/// whether that is fatal.
pub trait ServiceSupervisor {
    fn stop(&self, units: &[&str]) -> Result<()>;
    fn disable(&self, units: &[&str]) -> Result<()>;
    fn start(&self, units: &[&str]) -> Result<()>;
    fn restart(&self, units: &[&str]) -> Result<()>;
    fn enable_now(&self, units: &[&str]) -> Result<()>;
    fn daemon_reload(&self) -> Result<()>;
    fn is_active(&self, unit: &str) -> Result<bool>;
}

/// `systemctl`, talking to the system manager as root or to the account's
/// own manager with `--user`.
pub struct Systemd<'a> {
    runner: &'a dyn CommandRunner,
    scope: ServiceScope,
    identity: Identity,
}

impl<'a> Systemd<'a> {
    /// The system manager.
    pub fn system(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            scope: ServiceScope::System,
            identity: Identity::Root,
        }
    }

    /// The per-account manager; `identity` must be the account itself.
    pub fn user(runner: &'a dyn CommandRunner, identity: Identity) -> Self {
        Self {
            runner,
            scope: ServiceScope::User,
            identity,
        }
    }

    fn call(&self, verb: SystemctlVerb, units: &[&str]) -> Result<()> {
        let args = SystemctlArgs::new(self.scope, verb, units);
        run_tool_checked(self.runner, &args, &self.identity)?;
        Ok(())
    }
}

impl ServiceSupervisor for Systemd<'_> {
    fn stop(&self, units: &[&str]) -> Result<()> {
        self.call(SystemctlVerb::Stop, units)
    }

    fn disable(&self, units: &[&str]) -> Result<()> {
        self.call(SystemctlVerb::Disable, units)
    }

    fn start(&self, units: &[&str]) -> Result<()> {
        self.call(SystemctlVerb::Start, units)
    }

    fn restart(&self, units: &[&str]) -> Result<()> {
        self.call(SystemctlVerb::Restart, units)
    }

    fn enable_now(&self, units: &[&str]) -> Result<()> {
        self.call(SystemctlVerb::EnableNow, units)
    }

    fn daemon_reload(&self) -> Result<()> {
        self.call(SystemctlVerb::DaemonReload, &[])
    }

    fn is_active(&self, unit: &str) -> Result<bool> {
        let args = SystemctlArgs::new(self.scope, SystemctlVerb::IsActive, &[unit]);
        Ok(run_tool(self.runner, &args, &self.identity)?.success)
    }
}
