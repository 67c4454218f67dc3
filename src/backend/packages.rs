//! Package backends for the supported OS families.

use tracing::{debug, info};

use crate::error::Result;
use crate::runner::{run_tool, run_tool_checked, CommandRunner, Identity};
use crate::tools::packages::{
    AptAction, AptGetArgs, DnfAction, DnfArgs, DpkgQueryArgs, RpmQueryArgs,
};
use crate::types::OsFamily;

/// Engine packages shared by both families (Docker's upstream repo names).
const ENGINE_PACKAGES: &[&str] = &[
    "docker-ce",
    "docker-ce-cli",
    "containerd.io",
    "docker-ce-rootless-extras",
];

/// Installs and removes packages through the host's package manager.
pub trait PackageBackend {
    fn family(&self) -> OsFamily;

    /// Refresh package indexes. A no-op where the manager refreshes on demand.
    fn refresh(&self) -> Result<()>;

    fn is_installed(&self, package: &str) -> Result<bool>;

    fn install(&self, packages: &[String]) -> Result<()>;

    fn remove(&self, packages: &[String]) -> Result<()>;

    /// Engine, rootless extras and ID-mapping tools for this family.
    fn rootless_packages(&self) -> Vec<String>;

    /// Distribution-packaged engines that conflict with the upstream packages.
    fn conflicting_packages(&self) -> Vec<String>;
}

/// Pick the backend for a detected family.
pub fn backend_for<'a>(family: OsFamily, runner: &'a dyn CommandRunner) -> Box<dyn PackageBackend + 'a> {
    match family {
        OsFamily::Apt => Box::new(AptBackend { runner }),
        OsFamily::Rpm => Box::new(DnfBackend { runner }),
    }
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// apt
// ============================================================================

/// Debian/Ubuntu backend (`apt-get`, `dpkg-query`).
pub struct AptBackend<'a> {
    runner: &'a dyn CommandRunner,
}

impl PackageBackend for AptBackend<'_> {
    fn family(&self) -> OsFamily {
        OsFamily::Apt
    }

    fn refresh(&self) -> Result<()> {
        let args = AptGetArgs {
            action: AptAction::Update,
        };
        run_tool_checked(self.runner, &args, &Identity::Root)?;
        Ok(())
    }

    fn is_installed(&self, package: &str) -> Result<bool> {
        let args = DpkgQueryArgs {
            package: package.to_string(),
        };
        let out = run_tool(self.runner, &args, &Identity::Root)?;
        let installed = out.success && out.stdout.trim() == DpkgQueryArgs::INSTALLED;
        debug!("dpkg: {} installed={}", package, installed);
        Ok(installed)
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        info!("apt-get install {:?}", packages);
        let args = AptGetArgs {
            action: AptAction::Install(packages.to_vec()),
        };
        run_tool_checked(self.runner, &args, &Identity::Root)?;
        Ok(())
    }

    fn remove(&self, packages: &[String]) -> Result<()> {
        info!("apt-get purge {:?}", packages);
        let args = AptGetArgs {
            action: AptAction::Purge(packages.to_vec()),
        };
        run_tool_checked(self.runner, &args, &Identity::Root)?;
        Ok(())
    }

    fn rootless_packages(&self) -> Vec<String> {
        let mut pkgs = owned(ENGINE_PACKAGES);
        pkgs.extend(owned(&["uidmap", "dbus-user-session", "slirp4netns"]));
        pkgs
    }

    fn conflicting_packages(&self) -> Vec<String> {
        owned(&[
            "docker.io",
            "docker-doc",
            "docker-compose",
            "podman-docker",
            "containerd",
            "runc",
        ])
    }
}

// ============================================================================
// dnf
// ============================================================================

/// Fedora/RHEL backend (`dnf`, `rpm`).
pub struct DnfBackend<'a> {
    runner: &'a dyn CommandRunner,
}

impl PackageBackend for DnfBackend<'_> {
    fn family(&self) -> OsFamily {
        OsFamily::Rpm
    }

    fn refresh(&self) -> Result<()> {
        // dnf refreshes expired metadata on every transaction
        Ok(())
    }

    fn is_installed(&self, package: &str) -> Result<bool> {
        let args = RpmQueryArgs {
            package: package.to_string(),
        };
        let installed = run_tool(self.runner, &args, &Identity::Root)?.success;
        debug!("rpm: {} installed={}", package, installed);
        Ok(installed)
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        info!("dnf install {:?}", packages);
        let args = DnfArgs {
            action: DnfAction::Install(packages.to_vec()),
        };
        run_tool_checked(self.runner, &args, &Identity::Root)?;
        Ok(())
    }

    fn remove(&self, packages: &[String]) -> Result<()> {
        info!("dnf remove {:?}", packages);
        let args = DnfArgs {
            action: DnfAction::Remove(packages.to_vec()),
        };
        run_tool_checked(self.runner, &args, &Identity::Root)?;
        Ok(())
    }

    fn rootless_packages(&self) -> Vec<String> {
        let mut pkgs = owned(ENGINE_PACKAGES);
        pkgs.extend(owned(&["shadow-utils", "fuse-overlayfs", "slirp4netns"]));
        pkgs
    }

    fn conflicting_packages(&self) -> Vec<String> {
        owned(&[
            "docker",
            "docker-client",
            "docker-common",
            "docker-latest",
            "docker-engine",
            "podman-docker",
        ])
    }
}
