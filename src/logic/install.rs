//! Package installation. Refreshing and installing are fatal; turning the
//! privileged engine back off afterwards is best-effort.

use tracing::info;

use crate::backend::{PackageBackend, ServiceSupervisor};
use crate::error::Result;
use crate::host::HostPaths;
use crate::types::StepPolicy;

use super::teardown::stop_rootful;
use super::StepLog;

pub fn install_packages(
    packages: &dyn PackageBackend,
    services: &dyn ServiceSupervisor,
    paths: &HostPaths,
    log: &mut StepLog,
) -> Result<()> {
    log.attempt(StepPolicy::Fatal, "refresh package index", packages.refresh())?;

    let wanted = packages.rootless_packages();
    info!(
        "Installing {} package(s) for {}: {}",
        wanted.len(),
        packages.family(),
        wanted.join(", ")
    );
    log.attempt(StepPolicy::Fatal, "install packages", packages.install(&wanted))?;

    // the engine package's install script starts the privileged daemon
    stop_rootful(services, paths, log)
}
