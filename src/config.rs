//! Provisioning configuration: loading, defaults and up-front validation.
//!
//! Every tunable the pipeline reads lives here. The file format is JSON and
//! every field is optional; omitted fields take the defaults below.
//! [`ProvisionConfig::validate`] runs before any step touches the host.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};
use crate::types::HelperRequirement;
use crate::version::Version;

/// Remote log shipping via the engine's syslog driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLogging {
    /// Syslog endpoint, e.g. `udp://logs.example.net:514`
    pub address: String,
    /// Tag template attached to every record
    #[serde(default = "default_log_tag")]
    pub tag: String,
}

fn default_log_tag() -> String {
    "{{.Name}}".to_string()
}

/// Default per-container resource limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub nofile_soft: u64,
    pub nofile_hard: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            nofile_soft: 65536,
            nofile_hard: 65536,
        }
    }
}

/// Post-setup validation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Seconds between `docker version` polls
    pub poll_interval_secs: u64,
    /// Poll budget before validation fails
    pub max_attempts: u32,
    /// Image used for the smoke-test container
    pub smoke_image: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            max_attempts: 30,
            smoke_image: "hello-world".to_string(),
        }
    }
}

/// Everything the provisioning pipeline needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    // Account
    pub service_user: String,
    pub login_shell: PathBuf,
    /// Join the privileged `docker` group. Grants root-equivalent access to
    /// any rootful daemon on the host, so it stays off unless asked for.
    pub docker_group: bool,
    pub journal_group: String,
    pub subid_floor: u32,
    pub subid_range: u32,

    // Engine
    pub data_root: Option<PathBuf>,
    pub storage_driver: String,
    pub remote_logging: Option<RemoteLogging>,
    pub limits: ResourceLimits,

    // Host
    pub kernel_modules: Vec<String>,
    pub bin_dir: PathBuf,
    pub supervisor_binary: PathBuf,
    pub network_helper: HelperRequirement,
    pub min_helper_version: String,

    pub validation: ValidationConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            service_user: "rootless".to_string(),
            login_shell: PathBuf::from("/bin/bash"),
            docker_group: false,
            journal_group: "systemd-journal".to_string(),
            subid_floor: 100_000,
            subid_range: 65_536,
            data_root: None,
            storage_driver: "overlay2".to_string(),
            remote_logging: None,
            limits: ResourceLimits::default(),
            kernel_modules: vec!["br_netfilter".to_string()],
            bin_dir: PathBuf::from("/usr/bin"),
            supervisor_binary: PathBuf::from("/usr/bin/rootlesskit"),
            network_helper: HelperRequirement::Required,
            min_helper_version: "0.4.0".to_string(),
            validation: ValidationConfig::default(),
        }
    }
}

impl ProvisionConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Parsed minimum version for the user-mode network helper.
    pub fn min_helper_version(&self) -> Result<Version> {
        self.min_helper_version.parse()
    }

    /// Validate the configuration. Nothing on the host is touched before this passes.
    pub fn validate(&self) -> Result<()> {
        validate_username(&self.service_user)?;

        if !self.login_shell.is_absolute() {
            return Err(ProvisionError::config("login_shell must be an absolute path"));
        }

        if self.journal_group.trim().is_empty() {
            return Err(ProvisionError::config("journal_group must not be empty"));
        }

        if self.subid_range == 0 {
            return Err(ProvisionError::config("subid_range must be greater than zero"));
        }

        if let Some(ref root) = self.data_root {
            if !root.is_absolute() {
                return Err(ProvisionError::config(format!(
                    "data_root must be an absolute path, got {:?}",
                    root
                )));
            }
        }

        if self.storage_driver.trim().is_empty() {
            return Err(ProvisionError::config("storage_driver must not be empty"));
        }

        if let Some(ref remote) = self.remote_logging {
            let addr = remote.address.trim();
            let valid_scheme = ["udp://", "tcp://", "tcp+tls://", "unix://", "unixgram://"]
                .iter()
                .any(|scheme| addr.starts_with(scheme) && addr.len() > scheme.len());
            if !valid_scheme {
                return Err(ProvisionError::config(format!(
                    "remote_logging.address must start with udp://, tcp://, tcp+tls://, unix:// or unixgram://, got '{}'",
                    remote.address
                )));
            }
        }

        if self.limits.nofile_soft > self.limits.nofile_hard {
            return Err(ProvisionError::config(
                "limits.nofile_soft must not exceed limits.nofile_hard",
            ));
        }

        for module in &self.kernel_modules {
            if module.is_empty() || module.contains(['/', ' ']) {
                return Err(ProvisionError::config(format!(
                    "invalid kernel module name '{}'",
                    module
                )));
            }
        }

        if !self.bin_dir.is_absolute() {
            return Err(ProvisionError::config("bin_dir must be an absolute path"));
        }
        if !self.supervisor_binary.is_absolute() {
            return Err(ProvisionError::config(
                "supervisor_binary must be an absolute path",
            ));
        }

        self.min_helper_version()?;

        if self.validation.max_attempts == 0 {
            return Err(ProvisionError::config(
                "validation.max_attempts must be greater than zero",
            ));
        }
        if self.validation.smoke_image.trim().is_empty() {
            return Err(ProvisionError::config("validation.smoke_image must not be empty"));
        }

        Ok(())
    }
}

/// POSIX-portable login name: starts with a lowercase letter or underscore,
/// then lowercase letters, digits, `_` or `-`; at most 32 characters.
fn validate_username(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProvisionError::config("service_user must be specified"));
    }
    if name.len() > 32 {
        return Err(ProvisionError::config("service_user must be at most 32 characters"));
    }
    if name == "root" {
        return Err(ProvisionError::config("service_user must not be root"));
    }
    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        if !(first.is_ascii_lowercase() || first == '_') {
            return Err(ProvisionError::config(
                "service_user must start with a lowercase letter or underscore",
            ));
        }
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(ProvisionError::config(
            "service_user can only contain lowercase letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProvisionConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.docker_group, "privileged group must be opt-in");
    }

    #[test]
    fn test_relative_data_root_rejected() {
        let config = ProvisionConfig {
            data_root: Some(PathBuf::from("var/lib/docker")),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
        assert!(err.to_string().contains("data_root"));
    }

    #[test]
    fn test_absolute_data_root_accepted() {
        let config = ProvisionConfig {
            data_root: Some(PathBuf::from("/srv/docker")),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_username_rules() {
        for bad in ["", "root", "Svc", "1svc", "svc user", "svc/x"] {
            let config = ProvisionConfig {
                service_user: bad.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "'{}' should be rejected", bad);
        }
        for good in ["svc", "_svc", "docker-rl", "ci_runner2"] {
            let config = ProvisionConfig {
                service_user: good.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "'{}' should be accepted", good);
        }
    }

    #[test]
    fn test_remote_logging_address_scheme() {
        let mut config = ProvisionConfig {
            remote_logging: Some(RemoteLogging {
                address: "logs.example.net:514".to_string(),
                tag: default_log_tag(),
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.remote_logging = Some(RemoteLogging {
            address: "udp://logs.example.net:514".to_string(),
            tag: default_log_tag(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_min_version_rejected() {
        let config = ProvisionConfig {
            min_helper_version: "zero".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ProvisionConfig =
            serde_json::from_str(r#"{"service_user": "ci", "docker_group": true}"#)
                .expect("parse");
        assert_eq!(config.service_user, "ci");
        assert!(config.docker_group);
        assert_eq!(config.subid_range, 65_536);
        assert_eq!(config.network_helper, HelperRequirement::Required);
        assert_eq!(config.validation.smoke_image, "hello-world");
    }

    #[test]
    fn test_load_pretty_printed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rootless.json");
        let config = ProvisionConfig {
            service_user: "builder".to_string(),
            data_root: Some(PathBuf::from("/srv/engine")),
            ..Default::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&config).expect("serialize"))
            .expect("write");
        let loaded = ProvisionConfig::load_from_file(&path).expect("load");
        assert_eq!(loaded, config);
    }
}
