//! Identity provisioning: the service account, its groups, subordinate ID
//! ranges and linger.
//!
//! Every action checks current state first, so a second run changes nothing.

use tracing::{debug, info};

use crate::account::Account;
use crate::backend::IdentityStore;
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::types::StepPolicy;

use super::StepLog;

/// Engine socket group. Membership grants access to a rootful daemon, so
/// it is opt-in.
pub const ENGINE_GROUP: &str = "docker";

/// Ensure the account exists and is ready to run a per-user engine.
/// Returns the account as the passwd database now reports it.
pub fn provision_identity(
    store: &dyn IdentityStore,
    config: &ProvisionConfig,
    log: &mut StepLog,
) -> Result<Account> {
    let account = ensure_account(store, config)?;

    if config.docker_group {
        log.attempt(
            StepPolicy::Fatal,
            &format!("add {} to {}", account.name, ENGINE_GROUP),
            store.add_to_group(&account.name, ENGINE_GROUP),
        )?;
    } else {
        debug!("{} group membership not requested", ENGINE_GROUP);
    }

    log.attempt(
        StepPolicy::BestEffort,
        &format!("add {} to {}", account.name, config.journal_group),
        store.add_to_group(&account.name, &config.journal_group),
    )?;

    let (uids, gids) = store.allocate_subids(&account, config.subid_floor, config.subid_range)?;
    if let Some(range) = uids {
        info!("Allocated subuids {} to {}", range.to_usermod_arg(), account.name);
    }
    if let Some(range) = gids {
        info!("Allocated subgids {} to {}", range.to_usermod_arg(), account.name);
    }

    log.attempt(
        StepPolicy::Fatal,
        "enable linger",
        store.enable_linger(&account.name),
    )?;
    Ok(account)
}

/// Look the account up, creating it first if absent.
pub fn ensure_account(store: &dyn IdentityStore, config: &ProvisionConfig) -> Result<Account> {
    if let Some(existing) = store.lookup(&config.service_user)? {
        debug!("Account {} exists (uid {})", existing.name, existing.uid);
        return Ok(existing);
    }

    store.create(&config.service_user, &config.login_shell)?;
    store.lookup(&config.service_user)?.ok_or_else(|| {
        ProvisionError::config(format!(
            "account {} still missing after useradd",
            config.service_user
        ))
    })
}

/// Look up an account that an earlier run must have created.
pub fn existing_account(store: &dyn IdentityStore, name: &str) -> Result<Account> {
    store.lookup(name)?.ok_or_else(|| {
        ProvisionError::validation(format!("account {} does not exist; run install first", name))
    })
}
