//! Validation: the engine answers, runs rootless, and can run a container.
//!
//! Polling the daemon is the only retry in the pipeline.

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::account::Account;
use crate::backend::ServiceSupervisor;
use crate::config::{ProvisionConfig, ValidationConfig};
use crate::error::{ProvisionError, Result};
use crate::runner::{run_tool, run_tool_checked, CommandRunner, Identity};
use crate::tools::engine::{DockerArgs, DockerQuery};

use super::engine::USER_UNIT;

/// Marker the engine lists in its security options when running rootless.
pub const ROOTLESS_OPTION: &str = "name=rootless";

pub fn validate_engine(
    runner: &dyn CommandRunner,
    user_services: &dyn ServiceSupervisor,
    account: &Account,
    config: &ProvisionConfig,
) -> Result<()> {
    let identity = Identity::account(account, &config.bin_dir);

    wait_for_engine(runner, &identity, &config.validation)?;

    if !user_services.is_active(USER_UNIT)? {
        return Err(ProvisionError::validation(format!(
            "user unit {} is not active for {}",
            USER_UNIT, account.name
        )));
    }

    let info = run_tool_checked(
        runner,
        &DockerArgs {
            query: DockerQuery::SecurityOptions,
        },
        &identity,
    )?;
    if !info.stdout.contains(ROOTLESS_OPTION) {
        return Err(ProvisionError::validation(format!(
            "engine is not running rootless (security options: {})",
            info.stdout.trim()
        )));
    }

    let image = &config.validation.smoke_image;
    let smoke = run_tool(
        runner,
        &DockerArgs {
            query: DockerQuery::RunSmokeTest(image.clone()),
        },
        &identity,
    )?;
    if !smoke.success {
        return Err(ProvisionError::validation(format!(
            "smoke test `docker run --rm {}` failed: {}",
            image,
            smoke.stderr.trim()
        )));
    }

    info!("Rootless engine validated for {}", account.name);
    Ok(())
}

/// Poll `docker version` until it succeeds or attempts run out.
pub fn wait_for_engine(
    runner: &dyn CommandRunner,
    identity: &Identity,
    settings: &ValidationConfig,
) -> Result<()> {
    let args = DockerArgs {
        query: DockerQuery::Version,
    };
    let interval = Duration::from_secs(settings.poll_interval_secs);

    for attempt in 1..=settings.max_attempts {
        let out = run_tool(runner, &args, identity)?;
        if out.success {
            debug!("Engine answered on attempt {}", attempt);
            return Ok(());
        }
        debug!(
            "Engine not ready ({}/{}): {}",
            attempt,
            settings.max_attempts,
            out.stderr.trim()
        );
        if attempt < settings.max_attempts {
            thread::sleep(interval);
        }
    }

    Err(ProvisionError::validation(format!(
        "engine did not respond after {} attempt(s)",
        settings.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, ToolCommand};
    use std::cell::Cell;
    use std::path::PathBuf;

    /// Answers `docker version` after `ready_after` failures.
    struct SlowEngine {
        ready_after: u32,
        calls: Cell<u32>,
    }

    impl CommandRunner for SlowEngine {
        fn run(&self, _cmd: &ToolCommand) -> Result<CommandOutput> {
            let n = self.calls.get();
            self.calls.set(n + 1);
            if n >= self.ready_after {
                Ok(CommandOutput::ok("Server: Docker Engine"))
            } else {
                Ok(CommandOutput::failed(1, "Cannot connect to the Docker daemon"))
            }
        }
    }

    fn identity() -> Identity {
        let account = Account {
            name: "svc".into(),
            uid: 1001,
            gid: 1001,
            home: PathBuf::from("/home/svc"),
            shell: PathBuf::from("/bin/bash"),
        };
        Identity::account(&account, "/usr/bin")
    }

    fn fast(max_attempts: u32) -> ValidationConfig {
        ValidationConfig {
            poll_interval_secs: 0,
            max_attempts,
            ..Default::default()
        }
    }

    #[test]
    fn test_wait_succeeds_after_retries() {
        let engine = SlowEngine {
            ready_after: 2,
            calls: Cell::new(0),
        };
        wait_for_engine(&engine, &identity(), &fast(5)).expect("ready");
        assert_eq!(engine.calls.get(), 3);
    }

    #[test]
    fn test_wait_exhausts() {
        let engine = SlowEngine {
            ready_after: 10,
            calls: Cell::new(0),
        };
        let err = wait_for_engine(&engine, &identity(), &fast(3)).unwrap_err();
        assert_eq!(engine.calls.get(), 3);
        assert_eq!(err.exit_code(), 7);
    }
}
