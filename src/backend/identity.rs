//! Account database: passwd lookups, account creation, groups, subordinate
//! ID ranges and linger.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use crate::account::Account;
use crate::error::{ProvisionError, Result};
use crate::host::HostPaths;
use crate::runner::{run_tool, run_tool_checked, CommandRunner, Identity};
use crate::subid::{SubIdMap, SubIdRange};
use crate::tools::account::{
    GetentPasswdArgs, LoginctlArgs, UseraddArgs, UsermodArgs, UsermodChange,
};

pub const SUBUID_FILE: &str = "/etc/subuid";
pub const SUBGID_FILE: &str = "/etc/subgid";

/// Which subordinate maps already hold an entry for the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubIdStatus {
    pub has_uids: bool,
    pub has_gids: bool,
}

/// Reads and mutates the host's account database.
pub trait IdentityStore {
    /// `None` if no such account.
    fn lookup(&self, name: &str) -> Result<Option<Account>>;

    fn create(&self, name: &str, shell: &Path) -> Result<()>;

    fn add_to_group(&self, name: &str, group: &str) -> Result<()>;

    fn subid_status(&self, account: &Account) -> Result<SubIdStatus>;

    /// Allocate fresh `count`-sized ranges at or above `floor` for whichever
    /// maps lack an entry. Returns the ranges added.
    fn allocate_subids(
        &self,
        account: &Account,
        floor: u32,
        count: u32,
    ) -> Result<(Option<SubIdRange>, Option<SubIdRange>)>;

    fn enable_linger(&self, name: &str) -> Result<()>;
}

/// `getent`/`useradd`/`usermod`/`loginctl` plus direct reads of the subid maps.
pub struct SystemIdentityStore<'a> {
    runner: &'a dyn CommandRunner,
    paths: &'a HostPaths,
}

impl<'a> SystemIdentityStore<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a HostPaths) -> Self {
        Self { runner, paths }
    }

    fn read_map(&self, file: &str) -> Result<SubIdMap> {
        match fs::read_to_string(self.paths.host(file)) {
            Ok(content) => Ok(SubIdMap::parse(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(SubIdMap::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl IdentityStore for SystemIdentityStore<'_> {
    fn lookup(&self, name: &str) -> Result<Option<Account>> {
        let args = GetentPasswdArgs {
            name: name.to_string(),
        };
        let out = run_tool(self.runner, &args, &Identity::Root)?;
        if out.exit_code == Some(GetentPasswdArgs::NOT_FOUND) {
            return Ok(None);
        }
        let out = out.ensure_success("getent")?;
        let line = out
            .stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| ProvisionError::config(format!("getent returned no entry for {}", name)))?;
        Account::from_passwd_line(line).map(Some)
    }

    fn create(&self, name: &str, shell: &Path) -> Result<()> {
        info!("Creating account {}", name);
        let args = UseraddArgs {
            name: name.to_string(),
            shell: shell.to_path_buf(),
        };
        run_tool_checked(self.runner, &args, &Identity::Root)?;
        Ok(())
    }

    fn add_to_group(&self, name: &str, group: &str) -> Result<()> {
        run_tool_checked(self.runner, &UsermodArgs::append_group(name, group), &Identity::Root)?;
        Ok(())
    }

    fn subid_status(&self, account: &Account) -> Result<SubIdStatus> {
        Ok(SubIdStatus {
            has_uids: self.read_map(SUBUID_FILE)?.has_owner(&account.name, account.uid),
            has_gids: self.read_map(SUBGID_FILE)?.has_owner(&account.name, account.uid),
        })
    }

    fn allocate_subids(
        &self,
        account: &Account,
        floor: u32,
        count: u32,
    ) -> Result<(Option<SubIdRange>, Option<SubIdRange>)> {
        let status = self.subid_status(account)?;
        let uids = if status.has_uids {
            None
        } else {
            Some(self.read_map(SUBUID_FILE)?.next_free(floor, count)?)
        };
        let gids = if status.has_gids {
            None
        } else {
            Some(self.read_map(SUBGID_FILE)?.next_free(floor, count)?)
        };

        if uids.is_none() && gids.is_none() {
            debug!("{} already has subordinate ids", account.name);
            return Ok((None, None));
        }

        let args = UsermodArgs {
            name: account.name.clone(),
            change: UsermodChange::AddSubIds { uids, gids },
        };
        run_tool_checked(self.runner, &args, &Identity::Root)?;
        Ok((uids, gids))
    }

    fn enable_linger(&self, name: &str) -> Result<()> {
        let args = LoginctlArgs {
            name: name.to_string(),
        };
        run_tool_checked(self.runner, &args, &Identity::Root)?;
        Ok(())
    }
}
