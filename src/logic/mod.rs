//! Logic modules: one per provisioning step.
//!
//! # Modules
//!
//! - `kernel`: load and persist kernel modules
//! - `teardown`: stop the rootful engine, remove conflicting packages
//! - `install`: install engine and rootless packages
//! - `identity`: service account, groups, subordinate IDs, linger
//! - `binaries`: rootless helpers present and new enough
//! - `security`: AppArmor profile for the rootless supervisor
//! - `engine`: vendor setup, daemon config, per-user service
//! - `validation`: engine reachable, rootless, smoke test
//!
//! # Failure Policy
//!
//! Every fallible action inside a step is run through [`StepLog::attempt`]
//! with an explicit [`StepPolicy`]. `Fatal` failures abort the pipeline;
//! `BestEffort` failures are logged and recorded as warnings on the step.

pub mod binaries;
pub mod engine;
pub mod identity;
pub mod install;
pub mod kernel;
pub mod security;
pub mod teardown;
pub mod validation;

use std::fmt;

use strum::{Display, EnumIter};
use tracing::warn;

use crate::error::Result;
use crate::types::StepPolicy;

/// The pipeline's steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Step {
    #[strum(serialize = "preflight")]
    Preflight,
    #[strum(serialize = "os-detection")]
    OsDetection,
    #[strum(serialize = "kernel-modules")]
    KernelModules,
    #[strum(serialize = "teardown")]
    Teardown,
    #[strum(serialize = "install")]
    Install,
    #[strum(serialize = "identity")]
    Identity,
    #[strum(serialize = "binaries")]
    Binaries,
    #[strum(serialize = "security-profile")]
    SecurityProfile,
    #[strum(serialize = "rootless-engine")]
    RootlessEngine,
    #[strum(serialize = "validation")]
    Validation,
}

/// How a step ended, if it did not abort the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Every action succeeded.
    Completed,
    /// Finished, but best-effort actions failed.
    Degraded(Vec<String>),
    /// Nothing to do on this host.
    Skipped(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "ok"),
            Self::Degraded(warnings) => write!(f, "ok with {} warning(s)", warnings.len()),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

/// Per-step record of best-effort failures and skips.
#[derive(Debug, Default)]
pub struct StepLog {
    warnings: Vec<String>,
    skipped: Option<String>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `policy` to the result of an action described by `what`.
    ///
    /// - `Ok(v)` → `Ok(Some(v))`
    /// - `Err` under `Fatal` → the error
    /// - `Err` under `BestEffort` → warning recorded, `Ok(None)`
    pub fn attempt<T>(&mut self, policy: StepPolicy, what: &str, result: Result<T>) -> Result<Option<T>> {
        match (result, policy) {
            (Ok(value), _) => Ok(Some(value)),
            (Err(e), StepPolicy::Fatal) => Err(e),
            (Err(e), StepPolicy::BestEffort) => {
                let msg = format!("{}: {}", what, e);
                warn!("{} (continuing)", msg);
                self.warnings.push(msg);
                Ok(None)
            }
        }
    }

    /// Record a non-fatal problem that did not come from an `Err`.
    pub fn warn(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{}", msg);
        self.warnings.push(msg);
    }

    /// Mark the step as not applicable to this host.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.skipped = Some(reason.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn finish(self) -> StepOutcome {
        match self.skipped {
            Some(reason) => StepOutcome::Skipped(reason),
            None if self.warnings.is_empty() => StepOutcome::Completed,
            None => StepOutcome::Degraded(self.warnings),
        }
    }
}
