//! AppArmor profile for the rootless supervisor.
//!
//! The account generates the profile in its home directory; root reads it
//! back, installs it in the system profile directory and reloads AppArmor.
//! Both sides name the file with [`profile_name`] so they always agree.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::account::Account;
use crate::apparmor::{profile_name, render_profile, PROFILE_DIR};
use crate::backend::ServiceSupervisor;
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::host::HostPaths;
use crate::session::{AccountBlock, Session};
use crate::types::StepPolicy;

use super::StepLog;

pub const APPARMOR_UNIT: &str = "apparmor.service";

/// Generate the profile as `account` and install it system-wide.
/// Returns the installed path, or `None` when AppArmor is not present.
pub fn install_security_profile(
    session: &Session<'_>,
    services: &dyn ServiceSupervisor,
    paths: &HostPaths,
    account: &Account,
    config: &ProvisionConfig,
    log: &mut StepLog,
) -> Result<Option<PathBuf>> {
    if !paths.host(PROFILE_DIR).is_dir() {
        log.skip(format!("{} not present; AppArmor is not in use", PROFILE_DIR));
        return Ok(None);
    }

    let supervisor = &config.supervisor_binary;
    let profile = render_profile(supervisor);
    let staged = account.home_path(profile_name(supervisor));
    let block = AccountBlock::new(account, &config.bin_dir).write_file(
        staged.clone(),
        profile.clone(),
        0o644,
    );
    session.run_block(&block, log)?;

    // Read back with the account's credentials; only the text generated
    // above is ever installed.
    match session.read_file(account, &staged)? {
        Some(generated) if generated == profile => {}
        Some(_) => {
            return Err(ProvisionError::validation(format!(
                "generated profile {} changed before installation",
                staged.display()
            )));
        }
        None => {
            return Err(ProvisionError::validation(format!(
                "generated profile {} not found",
                staged.display()
            )));
        }
    }
    let installed = PathBuf::from(PROFILE_DIR).join(profile_name(supervisor));
    fs::write(paths.host(&installed), &profile)?;
    session.remove_file(account, &staged)?;
    info!("Installed AppArmor profile {}", installed.display());

    log.attempt(
        StepPolicy::BestEffort,
        "reload AppArmor",
        services.restart(&[APPARMOR_UNIT]),
    )?;
    Ok(Some(installed))
}
