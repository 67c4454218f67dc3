//! "Run this block as that account."
//!
//! Work done on behalf of the service account is described up front as an
//! [`AccountBlock`]: an ordered list of tool invocations and file changes.
//! [`Session::run_block`] executes it. Commands go through the runner with
//! the account's [`Identity`]. File changes run in-process under the
//! account's effective UID, GID and groups, so the kernel checks them
//! against the account's own permissions; every path must also lie under
//! the account's home and no component below the home may be a symlink.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use nix::libc;
use nix::unistd::{getegid, geteuid, getgroups, setegid, seteuid, setgroups, Gid, Uid};
use tracing::{debug, info};

use crate::account::Account;
use crate::error::{ProvisionError, Result};
use crate::host::HostPaths;
use crate::logic::StepLog;
use crate::runner::{CommandRunner, Identity, ToolCommand};
use crate::tool_args::ToolArgs;
use crate::types::StepPolicy;

/// One thing to do as the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountAction {
    /// Run a tool; a failure is handled per `policy`.
    Run {
        label: String,
        policy: StepPolicy,
        command: ToolCommand,
    },
    /// Create or replace a file.
    WriteFile {
        path: PathBuf,
        contents: String,
        mode: u32,
    },
    /// Append `block` unless `marker` already appears in the file.
    AppendOnce {
        path: PathBuf,
        marker: String,
        block: String,
    },
    /// Remove a directory tree if present.
    RemoveDir { path: PathBuf },
    /// Create a directory (and missing parents) owned by the account.
    CreateDir { path: PathBuf },
}

/// Ordered actions for one account.
#[derive(Debug, Clone)]
pub struct AccountBlock {
    identity: Identity,
    account: Account,
    actions: Vec<AccountAction>,
}

impl AccountBlock {
    pub fn new(account: &Account, bin_dir: &Path) -> Self {
        Self {
            identity: Identity::account(account, bin_dir),
            account: account.clone(),
            actions: Vec::new(),
        }
    }

    pub fn actions(&self) -> &[AccountAction] {
        &self.actions
    }

    pub fn run<T: ToolArgs>(mut self, label: &str, policy: StepPolicy, args: &T) -> Self {
        self.actions.push(AccountAction::Run {
            label: label.to_string(),
            policy,
            command: ToolCommand::new(args, self.identity.clone()),
        });
        self
    }

    pub fn write_file(mut self, path: PathBuf, contents: String, mode: u32) -> Self {
        self.actions.push(AccountAction::WriteFile {
            path,
            contents,
            mode,
        });
        self
    }

    pub fn append_once(mut self, path: PathBuf, marker: &str, block: String) -> Self {
        self.actions.push(AccountAction::AppendOnce {
            path,
            marker: marker.to_string(),
            block,
        });
        self
    }

    pub fn remove_dir(mut self, path: PathBuf) -> Self {
        self.actions.push(AccountAction::RemoveDir { path });
        self
    }

    pub fn create_dir(mut self, path: PathBuf) -> Self {
        self.actions.push(AccountAction::CreateDir { path });
        self
    }
}

/// Executes account blocks on a host.
pub struct Session<'a> {
    runner: &'a dyn CommandRunner,
    paths: &'a HostPaths,
}

impl<'a> Session<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a HostPaths) -> Self {
        Self { runner, paths }
    }

    /// Run every action in order. Stops at the first fatal failure; actions
    /// after it are not attempted. Best-effort failures land in `log`.
    pub fn run_block(&self, block: &AccountBlock, log: &mut StepLog) -> Result<()> {
        info!(
            "Running {} action(s) as {}",
            block.actions.len(),
            block.account.name
        );
        for action in &block.actions {
            self.run_action(&block.account, action, log)?;
        }
        Ok(())
    }

    /// Read a file from the account's home with the account's credentials.
    pub fn read_file(&self, account: &Account, path: &Path) -> Result<Option<String>> {
        let host_path = self.home_path(account, path)?;
        as_account(account, || read_no_follow(&host_path))
    }

    /// Remove a file from the account's home with the account's credentials.
    pub fn remove_file(&self, account: &Account, path: &Path) -> Result<()> {
        let host_path = self.home_path(account, path)?;
        as_account(account, || match fs::remove_file(&host_path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        })
    }

    fn run_action(&self, account: &Account, action: &AccountAction, log: &mut StepLog) -> Result<()> {
        match action {
            AccountAction::Run {
                label,
                policy,
                command,
            } => {
                let result = self
                    .runner
                    .run(command)
                    .and_then(|out| out.ensure_success(command.tool_name()));
                log.attempt(*policy, label, result)?;
            }
            AccountAction::WriteFile {
                path,
                contents,
                mode,
            } => {
                let host_path = self.home_path(account, path)?;
                as_account(account, || {
                    create_parent(&host_path)?;
                    write_no_follow(&host_path, contents, *mode)
                })?;
                debug!("Wrote {}", host_path.display());
            }
            AccountAction::AppendOnce {
                path,
                marker,
                block,
            } => {
                let host_path = self.home_path(account, path)?;
                let appended = as_account(account, || {
                    let existing = read_no_follow(&host_path)?.unwrap_or_default();
                    if existing.contains(marker.as_str()) {
                        return Ok(false);
                    }
                    create_parent(&host_path)?;
                    let mut updated = existing;
                    if !updated.is_empty() && !updated.ends_with('\n') {
                        updated.push('\n');
                    }
                    updated.push_str(block);
                    write_no_follow(&host_path, &updated, 0o644)?;
                    Ok(true)
                })?;
                if appended {
                    info!("Appended block to {}", host_path.display());
                } else {
                    debug!("{} already contains '{}'", host_path.display(), marker);
                }
            }
            AccountAction::RemoveDir { path } => {
                let host_path = self.home_path(account, path)?;
                // Entries owned by subordinate IDs are beyond the account's reach.
                match as_account(account, || Ok(fs::remove_dir_all(&host_path)?)) {
                    Ok(()) => info!("Removed {}", host_path.display()),
                    Err(ProvisionError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                        debug!("{} not present", host_path.display())
                    }
                    Err(e) => log.warn(format!("remove {}: {}", host_path.display(), e)),
                }
            }
            AccountAction::CreateDir { path } => {
                let host_path = self.home_path(account, path)?;
                as_account(account, || Ok(fs::create_dir_all(&host_path)?))?;
            }
        }
        Ok(())
    }

    /// Map `path` onto the host, insisting it lies under the account's home
    /// and that nothing between the home and `path` is a symlink.
    fn home_path(&self, account: &Account, path: &Path) -> Result<PathBuf> {
        let rel = path.strip_prefix(&account.home).map_err(|_| {
            ProvisionError::config(format!(
                "{} is outside {}'s home {}",
                path.display(),
                account.name,
                account.home.display()
            ))
        })?;
        let mut host_path = self.paths.host(&account.home);
        for component in rel.components() {
            let Component::Normal(part) = component else {
                return Err(ProvisionError::config(format!(
                    "{} is not a plain path",
                    path.display()
                )));
            };
            host_path.push(part);
            match fs::symlink_metadata(&host_path) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(ProvisionError::UnsafePath(host_path));
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(host_path)
    }
}

/// Run `f` with the account's effective credentials, then switch back.
/// A no-op switch when the process already runs as the account.
fn as_account<T>(account: &Account, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let euid = geteuid();
    if euid.as_raw() == account.uid {
        return f();
    }
    let egid = getegid();
    let credentials = |source: nix::Error| ProvisionError::Credentials {
        account: account.name.clone(),
        source,
    };
    let groups = getgroups().map_err(credentials)?;
    let restore = || -> nix::Result<()> {
        seteuid(euid)?;
        setegid(egid)?;
        setgroups(&groups)
    };

    // groups and GID first: both need the privileges the UID switch drops
    let switched = setgroups(&[Gid::from_raw(account.gid)])
        .and_then(|()| setegid(Gid::from_raw(account.gid)))
        .and_then(|()| seteuid(Uid::from_raw(account.uid)));
    if let Err(e) = switched {
        restore().map_err(credentials)?;
        return Err(credentials(e));
    }

    let result = f();
    restore().map_err(credentials)?;
    result
}

fn create_parent(path: &Path) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        ProvisionError::config(format!("{} has no parent directory", path.display()))
    })?;
    fs::create_dir_all(parent)?;
    Ok(())
}

/// `O_NOFOLLOW`: the final component is never resolved through a link.
fn read_no_follow(path: &Path) -> Result<Option<String>> {
    let mut file = match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(Some(contents))
}

fn write_no_follow(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    Ok(())
}
