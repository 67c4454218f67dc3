//! End-to-end pipeline tests against a fake host
//!
//! These tests verify:
//! - A full run provisions the account and engine and is repeatable
//! - Unsupported hosts and bad configuration abort before any change
//! - A failed vendor install leaves no daemon configuration behind
//! - Binary and helper checks map to the right exit codes

mod common;

use common::{FakeHost, ARCH, FEDORA, UBUNTU};
use rootless_setup::apparmor::profile_name;
use rootless_setup::{HelperRequirement, ProvisionError, Provisioner, Step, StepOutcome};
use std::path::{Path, PathBuf};

fn provisioner<'a>(host: &'a FakeHost, config: &'a rootless_setup::ProvisionConfig) -> Provisioner<'a> {
    Provisioner::new(config, host)
        .with_paths(host.paths())
        .with_euid(0)
}

// =============================================================================
// Happy path
// =============================================================================

#[test]
fn test_full_run_provisions_engine() {
    let host = FakeHost::new(UBUNTU);
    let config = host.config();

    let report = provisioner(&host, &config).run().expect("pipeline succeeds");

    assert_eq!(report.steps.len(), 10, "{}", report);
    assert_eq!(report.account.as_ref().map(|a| a.name.as_str()), Some("rootless"));
    assert!(host.ran("useradd", &["--create-home"]));
    assert!(host.ran("loginctl", &["enable-linger", "rootless"]));
    assert!(host.ran("systemctl", &["--user", "enable", "--now", "docker"]));
    assert!(host.ran("docker", &["run", "--rm", "hello-world"]));

    let daemon = host.read("home/rootless/.config/docker/daemon.json");
    let json: serde_json::Value = serde_json::from_str(&daemon).expect("daemon.json is JSON");
    assert_eq!(json["no-new-privileges"], true);
    assert_eq!(json["storage-driver"], "overlay2");

    assert_eq!(host.read("etc/modules-load.d/br_netfilter.conf"), "br_netfilter\n");
    assert!(host.read("home/rootless/.bashrc").contains("export DOCKER_HOST=unix:///run/user/"));
}

#[test]
fn test_account_commands_run_as_account() {
    let host = FakeHost::new(UBUNTU);
    let config = host.config();
    provisioner(&host, &config).run().expect("pipeline succeeds");

    let calls = host.calls.borrow();
    for call in calls.iter() {
        let as_account = call.tool_name() == "docker"
            || call.tool_name() == "dockerd-rootless-setuptool.sh"
            || call.args.first().map(String::as_str) == Some("--user");
        let expected = if as_account { "rootless" } else { "root" };
        assert_eq!(call.identity.name(), expected, "{}", call);
    }
}

#[test]
fn test_second_run_changes_nothing() {
    let host = FakeHost::new(UBUNTU);
    let config = host.config();

    provisioner(&host, &config).run().expect("first run");
    let daemon = host.read("home/rootless/.config/docker/daemon.json");
    let subuid = host.read("etc/subuid");
    let subgid = host.read("etc/subgid");

    provisioner(&host, &config).run().expect("second run");

    let bashrc = host.read("home/rootless/.bashrc");
    assert_eq!(bashrc.matches("# >>> rootless-setup >>>").count(), 1);
    assert_eq!(host.read("etc/subuid"), subuid);
    assert_eq!(host.read("etc/subgid"), subgid);
    assert_eq!(subuid.lines().count(), 1);
    assert_eq!(host.read("home/rootless/.config/docker/daemon.json"), daemon);

    let creates = host.calls.borrow().iter().filter(|c| c.matches("useradd", &[])).count();
    assert_eq!(creates, 1);
}

#[test]
fn test_rootful_engine_stays_off_after_install() {
    let host = FakeHost::new(UBUNTU);
    let config = host.config();

    provisioner(&host, &config).run().expect("first run");
    assert!(!host.state.borrow().system_engine_active);
    assert!(!host.path("run/docker.sock").exists());
    assert!(!host.ran("dockerd-rootless-setuptool.sh", &["install", "--force"]));

    provisioner(&host, &config).run().expect("second run");
    assert!(!host.state.borrow().system_engine_active);
    assert!(!host.path("run/docker.sock").exists());
}

#[test]
fn test_rpm_family_uses_dnf() {
    let host = FakeHost::new(FEDORA);
    let config = host.config();
    provisioner(&host, &config).run().expect("pipeline succeeds");

    assert!(host.ran("dnf", &["-y", "-q", "install"]));
    assert!(!host.ran("apt-get", &[]));
    assert!(host.state.borrow().installed.contains("fuse-overlayfs"));
}

#[test]
fn test_conflicting_packages_purged() {
    let host = FakeHost::new(UBUNTU);
    host.state.borrow_mut().installed.insert("docker.io".to_string());
    let config = host.config();

    provisioner(&host, &config).run().expect("pipeline succeeds");

    assert!(host.ran("apt-get", &["-q", "-y", "purge", "docker.io"]));
    assert!(!host.state.borrow().installed.contains("docker.io"));
}

// =============================================================================
// Aborts before mutation
// =============================================================================

#[test]
fn test_unsupported_os_aborts_before_changes() {
    let host = FakeHost::new(ARCH);
    let config = host.config();

    let err = provisioner(&host, &config).run().unwrap_err();

    assert!(matches!(err, ProvisionError::UnsupportedOs(_)));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(host.call_count(), 0, "{}", host.transcript());
    assert!(!host.path("etc/modules-load.d").exists());
}

#[test]
fn test_missing_os_release_aborts() {
    let host = FakeHost::new(UBUNTU);
    std::fs::remove_file(host.path("etc/os-release")).expect("remove");
    let config = host.config();

    let err = provisioner(&host, &config).run().unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert_eq!(host.call_count(), 0);
}

#[test]
fn test_not_root_aborts_first() {
    let host = FakeHost::new(UBUNTU);
    let config = host.config();

    let err = provisioner(&host, &config).with_euid(1000).run().unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert_eq!(host.call_count(), 0);
}

#[test]
fn test_relative_data_root_aborts_before_daemon_config() {
    let host = FakeHost::new(UBUNTU);
    let mut config = host.config();
    config.data_root = Some(PathBuf::from("var/lib/docker"));

    let err = provisioner(&host, &config).run().unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert_eq!(host.call_count(), 0);
    assert!(!host.path("home/rootless/.config/docker/daemon.json").exists());
}

#[test]
fn test_custom_data_root_created_for_account() {
    let host = FakeHost::new(UBUNTU);
    let mut config = host.config();
    config.data_root = Some(PathBuf::from("/srv/docker"));

    provisioner(&host, &config).run().expect("pipeline succeeds");

    assert!(host.path("srv/docker").is_dir());
    let daemon = host.read("home/rootless/.config/docker/daemon.json");
    let json: serde_json::Value = serde_json::from_str(&daemon).expect("daemon.json is JSON");
    assert_eq!(json["data-root"], "/srv/docker");
}

#[test]
fn test_vendor_install_failure_stops_before_config() {
    let host = FakeHost::new(UBUNTU);
    host.state.borrow_mut().setup_tool_fails = true;
    let config = host.config();

    let err = provisioner(&host, &config).run().unwrap_err();

    assert!(matches!(err, ProvisionError::ToolFailed { ref tool, .. } if tool == "dockerd-rootless-setuptool.sh"));
    assert_eq!(err.exit_code(), 6);
    assert!(!host.path("home/rootless/.config/docker/daemon.json").exists());
    assert!(!host.ran("systemctl", &["--user", "enable"]));
    assert!(!host.path("home/rootless/.bashrc").exists());
}

// =============================================================================
// Binaries and helper
// =============================================================================

#[test]
fn test_missing_setup_tool_is_fatal() {
    let host = FakeHost::new(UBUNTU);
    std::fs::remove_file(host.path("usr/bin/dockerd-rootless-setuptool.sh")).expect("remove");
    let config = host.config();

    let err = provisioner(&host, &config).run().unwrap_err();
    assert_eq!(err.exit_code(), 5);
    assert!(!host.ran("dockerd-rootless-setuptool.sh", &[]));
}

#[test]
fn test_old_helper_rejected() {
    let host = FakeHost::new(UBUNTU);
    host.state.borrow_mut().helper_version = "0.3.9".to_string();
    let config = host.config();

    let err = provisioner(&host, &config).run().unwrap_err();
    assert!(matches!(err, ProvisionError::VersionTooOld { .. }));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_missing_helper_depends_on_requirement() {
    let host = FakeHost::new(UBUNTU);
    std::fs::remove_file(host.path("usr/bin/slirp4netns")).expect("remove");

    let required = host.config();
    let err = provisioner(&host, &required).run().unwrap_err();
    assert!(matches!(err, ProvisionError::MissingBinary(ref p) if p.ends_with("slirp4netns")));

    let mut optional = host.config();
    optional.network_helper = HelperRequirement::Optional;
    let report = provisioner(&host, &optional).run().expect("optional helper");
    assert!(matches!(report.outcome(Step::Binaries), Some(StepOutcome::Degraded(_))));
}

// =============================================================================
// Security profile
// =============================================================================

#[test]
fn test_profile_generated_and_installed_under_same_name() {
    let host = FakeHost::new(UBUNTU);
    let config = host.config();
    provisioner(&host, &config).run().expect("pipeline succeeds");

    let name = profile_name(Path::new("/usr/bin/rootlesskit"));
    assert_eq!(name, "usr.bin.rootlesskit");
    let installed = host.read(&format!("etc/apparmor.d/{}", name));
    assert!(installed.contains("\"/usr/bin/rootlesskit\" flags=(unconfined)"));
    assert!(installed.contains("userns,"));
    assert!(!host.path(&format!("home/rootless/{}", name)).exists());
    assert!(host.ran("systemctl", &["restart", "apparmor.service"]));
}

#[test]
fn test_symlinked_staged_profile_is_refused() {
    let host = FakeHost::new(UBUNTU);
    common::write(host.root(), "etc/shadow", "root:*:19000::::::\n");
    std::fs::create_dir_all(host.path("home/rootless")).expect("home");
    std::os::unix::fs::symlink(host.path("etc/shadow"), host.path("home/rootless/usr.bin.rootlesskit"))
        .expect("plant link");
    let config = host.config();

    let err = provisioner(&host, &config).run().unwrap_err();

    assert!(matches!(err, ProvisionError::UnsafePath(_)), "{}", err);
    assert_eq!(host.read("etc/shadow"), "root:*:19000::::::\n");
    assert!(!host.path("etc/apparmor.d/usr.bin.rootlesskit").exists());
}

#[test]
fn test_no_apparmor_skips_profile() {
    let host = FakeHost::new(FEDORA);
    std::fs::remove_dir(host.path("etc/apparmor.d")).expect("remove");
    let config = host.config();

    let report = provisioner(&host, &config).run().expect("pipeline succeeds");
    assert!(matches!(report.outcome(Step::SecurityProfile), Some(StepOutcome::Skipped(_))));
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_engine_not_rootless_fails_validation() {
    let host = FakeHost::new(UBUNTU);
    host.state.borrow_mut().engine_rootless = false;
    let config = host.config();

    let err = provisioner(&host, &config).run().unwrap_err();
    assert_eq!(err.exit_code(), 7);
    assert!(!host.ran("docker", &["run"]));
}

#[test]
fn test_validate_only_requires_existing_account() {
    let host = FakeHost::new(UBUNTU);
    let config = host.config();

    let err = provisioner(&host, &config).validate_only().unwrap_err();
    assert_eq!(err.exit_code(), 7);

    provisioner(&host, &config).run().expect("install");
    let report = provisioner(&host, &config).validate_only().expect("healthy");
    assert_eq!(report.outcome(Step::Validation), Some(&StepOutcome::Completed));
}
