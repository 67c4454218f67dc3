//! The rootless daemon's `daemon.json`.
//!
//! Built from a handful of [`ProvisionConfig`] toggles and written wholesale
//! on every run; an existing file is replaced, never merged.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};

/// `daemon.json` as the engine reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DaemonConfig {
    pub no_new_privileges: bool,
    pub icc: bool,
    pub userland_proxy: bool,
    pub live_restore: bool,
    pub storage_driver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,
    pub log_driver: String,
    pub log_opts: BTreeMap<String, String>,
    pub default_ulimits: BTreeMap<String, Ulimit>,
}

/// One entry of `default-ulimits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ulimit {
    pub name: String,
    pub soft: u64,
    pub hard: u64,
}

impl DaemonConfig {
    /// Build the document from the provisioning config.
    ///
    /// A relative `data_root` is rejected here too, so nothing is written
    /// even if validation was bypassed.
    pub fn from_config(config: &ProvisionConfig) -> Result<Self> {
        if let Some(ref root) = config.data_root {
            if !root.is_absolute() {
                return Err(ProvisionError::config(format!(
                    "data_root must be an absolute path, got {:?}",
                    root
                )));
            }
        }

        let (log_driver, log_opts) = match config.remote_logging {
            Some(ref remote) => (
                "syslog".to_string(),
                BTreeMap::from([
                    ("syslog-address".to_string(), remote.address.clone()),
                    ("tag".to_string(), remote.tag.clone()),
                ]),
            ),
            None => (
                "json-file".to_string(),
                BTreeMap::from([
                    ("max-size".to_string(), "10m".to_string()),
                    ("max-file".to_string(), "3".to_string()),
                ]),
            ),
        };

        let default_ulimits = BTreeMap::from([(
            "nofile".to_string(),
            Ulimit {
                name: "nofile".to_string(),
                soft: config.limits.nofile_soft,
                hard: config.limits.nofile_hard,
            },
        )]);

        Ok(Self {
            no_new_privileges: true,
            icc: false,
            userland_proxy: false,
            live_restore: true,
            storage_driver: config.storage_driver.clone(),
            data_root: config.data_root.clone(),
            log_driver,
            log_opts,
            default_ulimits,
        })
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}
