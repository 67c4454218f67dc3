//! Binary verification.
//!
//! The vendor setup tool and the rootless launcher must be present and
//! executable. The user-mode network helper is version-checked when present;
//! whether its absence is fatal depends on [`HelperRequirement`].

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::host::HostPaths;
use crate::runner::{run_tool_checked, CommandRunner, Identity};
use crate::tools::engine::{VersionProbeArgs, NETWORK_HELPER, ROOTLESS_LAUNCHER, SETUP_TOOL};
use crate::types::HelperRequirement;
use crate::version::Version;

use super::StepLog;

/// Directories searched for the network helper after `bin_dir`.
const HELPER_SEARCH_PATH: &[&str] = &["/usr/local/bin", "/usr/bin", "/bin"];

pub fn verify_binaries(
    runner: &dyn CommandRunner,
    paths: &HostPaths,
    config: &ProvisionConfig,
    log: &mut StepLog,
) -> Result<()> {
    for name in [SETUP_TOOL, ROOTLESS_LAUNCHER] {
        let binary = config.bin_dir.join(name);
        if !is_executable(&paths.host(&binary)) {
            return Err(ProvisionError::MissingBinary(binary));
        }
        debug!("Found {}", binary.display());
    }

    match find_helper(paths, &config.bin_dir) {
        Some(helper) => check_helper_version(runner, &helper, &config.min_helper_version()?),
        None => match config.network_helper {
            HelperRequirement::Required => Err(ProvisionError::MissingBinary(
                config.bin_dir.join(NETWORK_HELPER),
            )),
            HelperRequirement::Optional => {
                log.warn(format!(
                    "{} not found; rootless networking will fall back to the engine's default",
                    NETWORK_HELPER
                ));
                Ok(())
            }
        },
    }
}

/// Host path (not rebased) of the first executable network helper.
pub fn find_helper(paths: &HostPaths, bin_dir: &Path) -> Option<PathBuf> {
    std::iter::once(bin_dir)
        .chain(HELPER_SEARCH_PATH.iter().map(Path::new))
        .map(|dir| dir.join(NETWORK_HELPER))
        .find(|candidate| is_executable(&paths.host(candidate)))
}

fn check_helper_version(runner: &dyn CommandRunner, helper: &Path, minimum: &Version) -> Result<()> {
    let out = run_tool_checked(runner, &VersionProbeArgs::new(helper), &Identity::Root)?;
    let found = Version::find_in(&out.stdout).ok_or_else(|| {
        ProvisionError::validation(format!(
            "cannot parse version from `{} --version`: {}",
            helper.display(),
            out.stdout.trim()
        ))
    })?;

    if !found.satisfies(minimum) {
        return Err(ProvisionError::VersionTooOld {
            binary: NETWORK_HELPER.to_string(),
            found: found.to_string(),
            required: minimum.to_string(),
        });
    }
    info!("{} {} (>= {})", helper.display(), found, minimum);
    Ok(())
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
