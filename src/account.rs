//! The unprivileged service account the engine runs as.

use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};

/// A resolved POSIX account (one `passwd` entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: PathBuf,
}

impl Account {
    /// Parse a `getent passwd` line: `name:x:uid:gid:gecos:home:shell`.
    pub fn from_passwd_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split(':').collect();
        if fields.len() != 7 {
            return Err(ProvisionError::config(format!(
                "malformed passwd entry: '{}'",
                line.trim()
            )));
        }
        let parse_id = |s: &str, what: &str| {
            s.parse::<u32>().map_err(|_| {
                ProvisionError::config(format!("invalid {} '{}' in passwd entry", what, s))
            })
        };
        Ok(Self {
            name: fields[0].to_string(),
            uid: parse_id(fields[2], "uid")?,
            gid: parse_id(fields[3], "gid")?,
            home: PathBuf::from(fields[5]),
            shell: PathBuf::from(fields[6]),
        })
    }

    /// `/run/user/<uid>`, created by logind once linger is enabled.
    pub fn runtime_dir(&self) -> PathBuf {
        PathBuf::from(format!("/run/user/{}", self.uid))
    }

    /// Socket the rootless daemon listens on.
    pub fn docker_host(&self) -> String {
        format!("unix://{}/docker.sock", self.runtime_dir().display())
    }

    /// Environment every command run as this account needs to reach its
    /// session bus and per-user service manager.
    pub fn session_env(&self, bin_dir: &Path) -> Vec<(String, String)> {
        let runtime = self.runtime_dir();
        vec![
            ("HOME".to_string(), self.home.display().to_string()),
            ("USER".to_string(), self.name.clone()),
            ("LOGNAME".to_string(), self.name.clone()),
            ("XDG_RUNTIME_DIR".to_string(), runtime.display().to_string()),
            (
                "DBUS_SESSION_BUS_ADDRESS".to_string(),
                format!("unix:path={}/bus", runtime.display()),
            ),
            (
                "PATH".to_string(),
                format!("{}:/usr/local/bin:/usr/bin:/bin", bin_dir.display()),
            ),
            ("DOCKER_HOST".to_string(), self.docker_host()),
        ]
    }

    /// Resolve a `~`-relative path inside the home directory.
    pub fn home_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.home.join(relative)
    }
}
