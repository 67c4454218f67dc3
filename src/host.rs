//! Host environment detection.
//!
//! Reads `/etc/os-release` to pick a package backend, and maps absolute host
//! paths onto a configurable root so the whole pipeline can run against a
//! scratch directory (tests, image builds) instead of `/`.
//!
//! # Design
//!
//! - **Fail Fast**: a missing identity file or an unknown family is fatal
//! - **Pure Rust**: detection reads files directly, no shelling out

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ProvisionError, Result};
use crate::types::OsFamily;

/// Location of the OS identity file, relative to the host root.
pub const OS_RELEASE: &str = "/etc/os-release";

/// Maps absolute host paths onto a root directory.
///
/// With the default root `/` this is the identity mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    root: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self::new("/")
    }
}

impl HostPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebase an absolute host path onto the root.
    pub fn host(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.root.join(relative)
    }
}

/// Parsed `/etc/os-release`.
#[derive(Debug, Clone, Default)]
pub struct OsRelease {
    fields: HashMap<String, String>,
}

impl OsRelease {
    /// Parse `KEY=value` lines. Values may be single- or double-quoted.
    pub fn parse(content: &str) -> Self {
        let fields = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
            .collect();
        Self { fields }
    }

    /// Read and parse the identity file under `paths`.
    pub fn load(paths: &HostPaths) -> Result<Self> {
        let path = paths.host(OS_RELEASE);
        let content = fs::read_to_string(&path)
            .map_err(|source| ProvisionError::OsRelease { path, source })?;
        Ok(Self::parse(&content))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Best human-readable name for log lines.
    pub fn pretty_name(&self) -> &str {
        self.get("PRETTY_NAME")
            .or_else(|| self.get("NAME"))
            .or_else(|| self.get("ID"))
            .unwrap_or("unknown")
    }

    /// Resolve the package family from `ID`, then each `ID_LIKE` entry.
    pub fn family(&self) -> Result<OsFamily> {
        let id = self.get("ID").unwrap_or_default();
        let like = self.get("ID_LIKE").unwrap_or_default();

        std::iter::once(id)
            .chain(like.split_whitespace())
            .find_map(OsFamily::from_os_id)
            .ok_or_else(|| {
                let shown = if like.is_empty() {
                    format!("ID={}", if id.is_empty() { "<unset>" } else { id })
                } else {
                    format!("ID={} ID_LIKE={}", id, like)
                };
                ProvisionError::UnsupportedOs(shown)
            })
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Detected facts about the host.
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub family: OsFamily,
    pub pretty_name: String,
}

impl HostInfo {
    /// Detect the OS family. Fails if the identity file is absent or the
    /// family is not supported.
    pub fn detect(paths: &HostPaths) -> Result<Self> {
        let release = OsRelease::load(paths)?;
        debug!("os-release: {:?}", release.fields);
        let family = release.family()?;
        let info = Self {
            family,
            pretty_name: release.pretty_name().to_string(),
        };
        info!("Host detection: {}", info);
        Ok(info)
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} family)", self.pretty_name, self.family)
    }
}
