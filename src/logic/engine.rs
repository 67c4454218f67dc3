//! Rootless engine setup.
//!
//! Root starts the account's service manager, then everything else runs as
//! the account in one [`AccountBlock`]. The block stops at the vendor
//! install if it fails, so no daemon configuration is written and no
//! service is started from a half-installed engine.
//!
//! A custom data root must exist and belong to the account before the
//! daemon starts: the account creates it inside its home, root creates it
//! anywhere else.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::{fchown, OpenOptionsExt};
use std::path::{Path, PathBuf};

use nix::libc;
use tracing::info;

use crate::account::Account;
use crate::backend::ServiceSupervisor;
use crate::config::ProvisionConfig;
use crate::daemon_config::DaemonConfig;
use crate::error::{ProvisionError, Result};
use crate::host::HostPaths;
use crate::session::{AccountBlock, Session};
use crate::tools::engine::{SetupAction, SetupToolArgs};
use crate::tools::service::{SystemctlArgs, SystemctlVerb};
use crate::types::{ServiceScope, StepPolicy};

use super::StepLog;

/// Per-user engine unit installed by the vendor tool.
pub const USER_UNIT: &str = "docker";

pub const ENV_MARKER_BEGIN: &str = "# >>> rootless-setup >>>";
pub const ENV_MARKER_END: &str = "# <<< rootless-setup <<<";

/// `~/.config/docker/daemon.json`
pub fn daemon_config_path(account: &Account) -> PathBuf {
    account.home_path(".config/docker/daemon.json")
}

/// Shell block exporting what a login shell needs to reach the engine.
pub fn env_block(account: &Account, config: &ProvisionConfig) -> String {
    format!(
        "{begin}\n\
         export XDG_RUNTIME_DIR={runtime}\n\
         export PATH={bin}:$PATH\n\
         export DOCKER_HOST={host}\n\
         {end}\n",
        begin = ENV_MARKER_BEGIN,
        runtime = account.runtime_dir().display(),
        bin = config.bin_dir.display(),
        host = account.docker_host(),
        end = ENV_MARKER_END,
    )
}

/// Everything the account does to set up its engine, in order.
pub fn engine_block(account: &Account, config: &ProvisionConfig, daemon_json: String) -> AccountBlock {
    AccountBlock::new(account, &config.bin_dir)
        .run(
            "uninstall previous rootless engine",
            StepPolicy::BestEffort,
            &setup(config, SetupAction::Uninstall),
        )
        .remove_dir(account.home_path(".local/share/docker"))
        .run(
            "install rootless engine",
            StepPolicy::Fatal,
            &setup(config, SetupAction::Install),
        )
        .create_dir(account.home_path(".config/systemd/user"))
        .write_file(daemon_config_path(account), daemon_json, 0o644)
        .run(
            "reload user units",
            StepPolicy::Fatal,
            &user(SystemctlVerb::DaemonReload, &[]),
        )
        .run(
            "enable user engine",
            StepPolicy::Fatal,
            &user(SystemctlVerb::EnableNow, &[USER_UNIT]),
        )
        // the vendor tool already started the unit with its own defaults
        .run(
            "restart user engine",
            StepPolicy::Fatal,
            &user(SystemctlVerb::Restart, &[USER_UNIT]),
        )
        .append_once(
            account.home_path(".bashrc"),
            ENV_MARKER_BEGIN,
            env_block(account, config),
        )
}

fn setup(config: &ProvisionConfig, action: SetupAction) -> SetupToolArgs {
    SetupToolArgs {
        bin_dir: config.bin_dir.clone(),
        action,
    }
}

fn user(verb: SystemctlVerb, units: &[&str]) -> SystemctlArgs {
    SystemctlArgs::new(ServiceScope::User, verb, units)
}

/// Create `dir` outside the account's home and hand it to the account.
/// An existing symlink at `dir` is refused.
pub fn prepare_data_root(paths: &HostPaths, account: &Account, dir: &Path) -> Result<()> {
    let host_dir = paths.host(dir);
    match fs::symlink_metadata(&host_dir) {
        Ok(meta) if meta.file_type().is_symlink() => {
            return Err(ProvisionError::UnsafePath(host_dir));
        }
        Ok(meta) if !meta.is_dir() => {
            return Err(ProvisionError::config(format!(
                "data_root {} exists and is not a directory",
                dir.display()
            )));
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => fs::create_dir_all(&host_dir)?,
        Err(e) => return Err(e.into()),
    }

    let handle = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_DIRECTORY)
        .open(&host_dir)?;
    fchown(&handle, Some(account.uid), Some(account.gid))?;
    info!("Data root {} belongs to {}", dir.display(), account.name);
    Ok(())
}

pub fn setup_rootless_engine(
    session: &Session<'_>,
    system: &dyn ServiceSupervisor,
    paths: &HostPaths,
    account: &Account,
    config: &ProvisionConfig,
    log: &mut StepLog,
) -> Result<()> {
    // Rendered before anything runs: a bad data_root must not leave a
    // half-configured engine behind.
    let daemon_json = DaemonConfig::from_config(config)?.to_json()?;

    let manager = format!("user@{}.service", account.uid);
    log.attempt(
        StepPolicy::Fatal,
        &format!("start {}", manager),
        system.start(&[manager.as_str()]),
    )?;

    if let Some(ref dir) = config.data_root {
        if dir.starts_with(&account.home) {
            let block = AccountBlock::new(account, &config.bin_dir).create_dir(dir.clone());
            session.run_block(&block, log)?;
        } else {
            prepare_data_root(paths, account, dir)?;
        }
    }

    session.run_block(&engine_block(account, config, daemon_json), log)?;
    info!("Rootless engine running for {}", account.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AccountAction;

    fn account() -> Account {
        Account {
            name: "svc".into(),
            uid: 1001,
            gid: 1001,
            home: PathBuf::from("/home/svc"),
            shell: PathBuf::from("/bin/bash"),
        }
    }

    #[test]
    fn test_env_block() {
        let block = env_block(&account(), &ProvisionConfig::default());
        assert!(block.starts_with(ENV_MARKER_BEGIN));
        assert!(block.contains("export XDG_RUNTIME_DIR=/run/user/1001\n"));
        assert!(block.contains("export PATH=/usr/bin:$PATH\n"));
        assert!(block.contains("export DOCKER_HOST=unix:///run/user/1001/docker.sock\n"));
        assert!(block.ends_with(&format!("{}\n", ENV_MARKER_END)));
    }

    #[test]
    fn test_install_precedes_config_and_service() {
        let block = engine_block(&account(), &ProvisionConfig::default(), "{}\n".into());
        let actions = block.actions();

        let install = actions
            .iter()
            .position(|a| matches!(a, AccountAction::Run { command, .. } if command.args == ["install"]))
            .expect("install action");
        let write = actions
            .iter()
            .position(|a| matches!(a, AccountAction::WriteFile { .. }))
            .expect("write action");
        let enable = actions
            .iter()
            .position(|a| matches!(a, AccountAction::Run { command, .. } if command.args.contains(&"--now".to_string())))
            .expect("enable action");

        assert!(install < write && write < enable);
        assert!(matches!(
            actions[0],
            AccountAction::Run { policy: StepPolicy::BestEffort, .. }
        ));
        assert!(matches!(
            actions[install],
            AccountAction::Run { policy: StepPolicy::Fatal, .. }
        ));
    }

    fn me() -> Account {
        Account {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            ..account()
        }
    }

    #[test]
    fn test_prepare_data_root_creates_and_is_repeatable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = HostPaths::new(dir.path());
        let data_root = Path::new("/srv/containers/docker");

        prepare_data_root(&paths, &me(), data_root).expect("create");
        prepare_data_root(&paths, &me(), data_root).expect("again");

        assert!(dir.path().join("srv/containers/docker").is_dir());
    }

    #[test]
    fn test_prepare_data_root_refuses_symlink_and_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = HostPaths::new(dir.path());
        fs::create_dir_all(dir.path().join("srv")).expect("srv");
        fs::create_dir_all(dir.path().join("etc")).expect("etc");
        std::os::unix::fs::symlink(dir.path().join("etc"), dir.path().join("srv/docker"))
            .expect("plant link");
        fs::write(dir.path().join("srv/file"), "").expect("file");

        let err = prepare_data_root(&paths, &me(), Path::new("/srv/docker")).unwrap_err();
        assert!(matches!(err, ProvisionError::UnsafePath(_)));
        let err = prepare_data_root(&paths, &me(), Path::new("/srv/file")).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_daemon_config_path() {
        assert_eq!(
            daemon_config_path(&account()),
            PathBuf::from("/home/svc/.config/docker/daemon.json")
        );
    }
}
