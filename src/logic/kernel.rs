//! Kernel module setup.
//!
//! Each module is loaded now with `modprobe` and persisted for later boots
//! with a one-line file in `/etc/modules-load.d/`. Loading is best-effort
//! (the module may be built in); persisting is not.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::error::Result;
use crate::host::HostPaths;
use crate::runner::{run_tool_checked, CommandRunner, Identity};
use crate::tools::service::ModprobeArgs;
use crate::types::StepPolicy;

use super::StepLog;

pub const MODULES_LOAD_DIR: &str = "/etc/modules-load.d";

/// `/etc/modules-load.d/<module>.conf`
pub fn persist_path(module: &str) -> PathBuf {
    PathBuf::from(MODULES_LOAD_DIR).join(format!("{}.conf", module))
}

pub fn setup_kernel_modules(
    runner: &dyn CommandRunner,
    paths: &HostPaths,
    modules: &[String],
    log: &mut StepLog,
) -> Result<()> {
    if modules.is_empty() {
        log.skip("no kernel modules configured");
        return Ok(());
    }

    for module in modules {
        let args = ModprobeArgs {
            module: module.clone(),
        };
        let loaded = run_tool_checked(runner, &args, &Identity::Root).map(|_| ());
        log.attempt(StepPolicy::BestEffort, &format!("modprobe {}", module), loaded)?;

        let target = paths.host(persist_path(module));
        fs::create_dir_all(paths.host(MODULES_LOAD_DIR))?;
        fs::write(&target, format!("{}\n", module))?;
        info!("Persisted kernel module {} in {}", module, target.display());
    }
    Ok(())
}
