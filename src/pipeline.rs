//! The provisioning pipeline.
//!
//! [`Provisioner`] runs the steps in a fixed order against one host. Each
//! step either finishes (possibly with best-effort warnings) or returns the
//! error that aborts the run. Nothing is rolled back; every step is safe to
//! repeat, so the remedy for a failed run is to fix the cause and run again.

use std::fmt;

use tracing::{error, info};

use crate::account::Account;
use crate::backend::{backend_for, Systemd, SystemIdentityStore};
use crate::config::ProvisionConfig;
use crate::daemon_config::DaemonConfig;
use crate::error::Result;
use crate::host::{HostInfo, HostPaths};
use crate::logic::{
    binaries, engine, identity, install, kernel, security, teardown, validation, Step, StepLog,
    StepOutcome,
};
use crate::preflight::{effective_uid, require_root};
use crate::process_guard::ChildRegistry;
use crate::runner::{CommandRunner, Identity};
use crate::session::Session;

/// What a completed run did, step by step.
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    pub host: Option<HostInfo>,
    pub account: Option<Account>,
    pub steps: Vec<(Step, StepOutcome)>,
}

impl ProvisionReport {
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    /// All best-effort warnings, prefixed with their step.
    pub fn warnings(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|(step, outcome)| match outcome {
                StepOutcome::Degraded(w) => Some(w.iter().map(move |msg| format!("{}: {}", step, msg))),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref host) = self.host {
            writeln!(f, "Host: {}", host)?;
        }
        if let Some(ref account) = self.account {
            writeln!(f, "Account: {} (uid {})", account.name, account.uid)?;
        }
        for (step, outcome) in &self.steps {
            writeln!(f, "  {:<18} {}", step.to_string(), outcome)?;
        }
        Ok(())
    }
}

/// Runs the pipeline for one configuration on one host.
pub struct Provisioner<'a> {
    config: &'a ProvisionConfig,
    runner: &'a dyn CommandRunner,
    paths: HostPaths,
    euid: u32,
}

impl<'a> Provisioner<'a> {
    pub fn new(config: &'a ProvisionConfig, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            runner,
            paths: HostPaths::default(),
            euid: effective_uid(),
        }
    }

    /// Rebase every host path onto `paths`' root.
    pub fn with_paths(mut self, paths: HostPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Override the effective UID used for the privilege check.
    pub fn with_euid(mut self, euid: u32) -> Self {
        self.euid = euid;
        self
    }

    /// Configuration, privileges and OS. Touches nothing.
    pub fn preflight(&self) -> Result<HostInfo> {
        self.config.validate()?;
        require_root(self.euid)?;
        HostInfo::detect(&self.paths)
    }

    /// The daemon configuration `install` would write.
    pub fn daemon_config_json(&self) -> Result<String> {
        DaemonConfig::from_config(self.config)?.to_json()
    }

    /// Run every step.
    pub fn run(&self) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::default();
        let config = self.config;
        let runner = self.runner;
        let paths = &self.paths;

        self.step(&mut report, Step::Preflight, |_| {
            config.validate()?;
            require_root(self.euid)
        })?;
        let host = self.step(&mut report, Step::OsDetection, |_| HostInfo::detect(paths))?;
        report.host = Some(host.clone());
        info!("Provisioning rootless engine on {}", host);

        self.step(&mut report, Step::KernelModules, |log| {
            kernel::setup_kernel_modules(runner, paths, &config.kernel_modules, log)
        })?;

        let system = Systemd::system(runner);
        let packages = backend_for(host.family, runner);
        self.step(&mut report, Step::Teardown, |log| {
            teardown::teardown_rootful(&system, packages.as_ref(), paths, log)
        })?;
        self.step(&mut report, Step::Install, |log| {
            install::install_packages(packages.as_ref(), &system, paths, log)
        })?;

        let store = SystemIdentityStore::new(runner, paths);
        let account = self.step(&mut report, Step::Identity, |log| {
            identity::provision_identity(&store, config, log)
        })?;
        report.account = Some(account.clone());

        self.step(&mut report, Step::Binaries, |log| {
            binaries::verify_binaries(runner, paths, config, log)
        })?;

        let session = Session::new(runner, paths);
        self.step(&mut report, Step::SecurityProfile, |log| {
            security::install_security_profile(&session, &system, paths, &account, config, log)
        })?;
        self.step(&mut report, Step::RootlessEngine, |log| {
            engine::setup_rootless_engine(&session, &system, paths, &account, config, log)
        })?;

        let user = Systemd::user(runner, Identity::account(&account, &config.bin_dir));
        self.step(&mut report, Step::Validation, |_| {
            validation::validate_engine(runner, &user, &account, config)
        })?;

        info!("Provisioning complete for {}", account.name);
        Ok(report)
    }

    /// Re-run validation against an existing setup.
    pub fn validate_only(&self) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::default();
        let config = self.config;
        let runner = self.runner;

        let host = self.step(&mut report, Step::Preflight, |_| self.preflight())?;
        report.host = Some(host);

        let store = SystemIdentityStore::new(runner, &self.paths);
        let account = identity::existing_account(&store, &config.service_user)?;
        report.account = Some(account.clone());

        let user = Systemd::user(runner, Identity::account(&account, &config.bin_dir));
        self.step(&mut report, Step::Validation, |_| {
            validation::validate_engine(runner, &user, &account, config)
        })?;
        Ok(report)
    }

    fn step<T>(
        &self,
        report: &mut ProvisionReport,
        step: Step,
        body: impl FnOnce(&mut StepLog) -> Result<T>,
    ) -> Result<T> {
        info!("==> {}", step);
        ChildRegistry::with_global(|registry| registry.set_step(Some(step.to_string())));
        let mut log = StepLog::new();
        let result = body(&mut log);
        ChildRegistry::with_global(|registry| registry.set_step(None));
        match result {
            Ok(value) => {
                let outcome = log.finish();
                info!("<== {}: {}", step, outcome);
                report.steps.push((step, outcome));
                Ok(value)
            }
            Err(e) => {
                error!("Step {} failed: {}", step, e);
                Err(e)
            }
        }
    }
}
