//! Idempotent teardown of the privileged engine.
//!
//! # Failure Policy
//!
//! - Stopping/disabling units: best-effort. An absent or already stopped
//!   unit is the desired state.
//! - Removing installed conflicting packages: fatal. They would block the
//!   upstream packages from installing.
//! - Stale sockets: best-effort.
//!
//! There is no rollback.

use std::fs;
use std::io::ErrorKind;

use tracing::{debug, info};

use crate::backend::{PackageBackend, ServiceSupervisor};
use crate::error::Result;
use crate::host::HostPaths;
use crate::types::StepPolicy;

use super::StepLog;

/// Privileged engine units.
pub const ROOTFUL_UNITS: &[&str] = &["docker.service", "docker.socket"];

/// Sockets the privileged daemon leaves behind.
pub const STALE_SOCKETS: &[&str] = &["/var/run/docker.sock", "/run/docker.sock"];

pub fn teardown_rootful(
    services: &dyn ServiceSupervisor,
    packages: &dyn PackageBackend,
    paths: &HostPaths,
    log: &mut StepLog,
) -> Result<()> {
    stop_rootful(services, paths, log)?;

    let mut installed = Vec::new();
    for package in packages.conflicting_packages() {
        if packages.is_installed(&package)? {
            installed.push(package);
        }
    }
    if installed.is_empty() {
        debug!("No conflicting packages installed");
    } else {
        info!("Removing conflicting packages: {}", installed.join(", "));
        log.attempt(
            StepPolicy::Fatal,
            "remove conflicting packages",
            packages.remove(&installed),
        )?;
    }
    Ok(())
}

/// Stop and disable the privileged units and clear their sockets. Also run
/// after installation: package scripts enable and start the units again.
pub fn stop_rootful(
    services: &dyn ServiceSupervisor,
    paths: &HostPaths,
    log: &mut StepLog,
) -> Result<()> {
    log.attempt(
        StepPolicy::BestEffort,
        "stop rootful engine",
        services.stop(ROOTFUL_UNITS),
    )?;
    log.attempt(
        StepPolicy::BestEffort,
        "disable rootful engine",
        services.disable(ROOTFUL_UNITS),
    )?;
    for socket in STALE_SOCKETS {
        let removed = remove_stale_socket(paths, socket);
        log.attempt(StepPolicy::BestEffort, &format!("remove {}", socket), removed)?;
    }
    Ok(())
}

/// Remove `socket` if it is a non-directory entry. Symlinks are removed,
/// not followed; `/var/run` is usually a link to `/run`.
fn remove_stale_socket(paths: &HostPaths, socket: &str) -> Result<()> {
    let path = paths.host(socket);
    match fs::symlink_metadata(&path) {
        Ok(meta) if meta.is_dir() => {
            debug!("{} is a directory, leaving it", path.display());
            Ok(())
        }
        Ok(_) => {
            fs::remove_file(&path)?;
            info!("Removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
