//! Type-safe configuration types for rootless-setup
//!
//! Stringly-typed knobs (OS family names, failure policies, helper strictness)
//! are modelled as enums so matches are exhaustive and config files are
//! validated at parse time.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Package-manager family of the host, derived from `/etc/os-release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Debian, Ubuntu and derivatives (`apt-get`, `dpkg-query`)
    Apt,
    /// Fedora, RHEL and derivatives (`dnf`, `rpm`)
    Rpm,
}

impl OsFamily {
    /// Map an os-release `ID` (or one `ID_LIKE` entry) to a family.
    pub fn from_os_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "debian" | "ubuntu" | "linuxmint" | "pop" | "raspbian" => Some(Self::Apt),
            "fedora" | "rhel" | "centos" | "rocky" | "almalinux" | "ol" | "amzn" => {
                Some(Self::Rpm)
            }
            _ => None,
        }
    }
}

/// What happens when an action fails.
///
/// `Fatal` aborts the pipeline; `BestEffort` logs a warning and continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StepPolicy {
    #[strum(serialize = "fatal")]
    Fatal,
    #[strum(serialize = "best-effort")]
    BestEffort,
}

/// Whether a missing user-mode network helper (`slirp4netns`) is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HelperRequirement {
    #[default]
    Required,
    Optional,
}

/// Scope a `systemctl` invocation talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ServiceScope {
    /// The system manager (PID 1)
    #[strum(serialize = "system")]
    System,
    /// The per-account manager (`systemctl --user`)
    #[strum(serialize = "user")]
    User,
}
