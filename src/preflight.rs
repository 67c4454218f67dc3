//! Pre-flight checks and failure reporting
//!
//! The privilege check every mutating command runs first. OS detection
//! follows it in the pipeline's preflight.
//!
//! Failures are printed to stderr with a short remedy, and the process
//! exits with the error's exit code.

use nix::unistd::geteuid;

use crate::error::{ProvisionError, Result};

/// Effective UID of this process.
pub fn effective_uid() -> u32 {
    geteuid().as_raw()
}

/// Fail with `NotRoot` unless `euid` is 0.
pub fn require_root(euid: u32) -> Result<()> {
    if euid == 0 {
        Ok(())
    } else {
        Err(ProvisionError::NotRoot { euid })
    }
}

/// A one-line hint for how to fix `err`, if there is a standard one.
pub fn remedy(err: &ProvisionError) -> Option<&'static str> {
    match err {
        ProvisionError::NotRoot { .. } => Some("Run with sudo or as root: sudo rootless-setup"),
        ProvisionError::OsRelease { .. } | ProvisionError::UnsupportedOs(_) => {
            Some("Supported hosts: Debian/Ubuntu (apt) and Fedora/RHEL (dnf)")
        }
        ProvisionError::Config(_) => Some("Check the --config file; missing fields use defaults"),
        ProvisionError::MissingBinary(_) | ProvisionError::VersionTooOld { .. } => {
            Some("Install docker-ce-rootless-extras and slirp4netns from the distribution")
        }
        _ => None,
    }
}

/// Print a boxed failure report to stderr.
pub fn print_failure(err: &ProvisionError) {
    eprintln!();
    eprintln!("╔══════════════════════════════════════════════════════════════════╗");
    eprintln!("║              rootless-setup - Provisioning Failed                ║");
    eprintln!("╚══════════════════════════════════════════════════════════════════╝");
    eprintln!();
    eprintln!("❌ ERROR: {}", err);
    if let Some(hint) = remedy(err) {
        eprintln!();
        eprintln!("   Solution: {}", hint);
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_root() {
        assert!(require_root(0).is_ok());
        let err = require_root(1000).unwrap_err();
        assert!(matches!(err, ProvisionError::NotRoot { euid: 1000 }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_remedy_mapping() {
        assert!(remedy(&ProvisionError::NotRoot { euid: 1 }).is_some());
        assert!(remedy(&ProvisionError::validation("x")).is_none());
    }
}
