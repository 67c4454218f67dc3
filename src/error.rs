//! Error handling module for rootless-setup
//!
//! Provides the typed error used by every provisioning step. Each variant maps
//! to a distinct process exit code so callers (and CI wrappers) can tell a
//! privilege problem from an unsupported host or a failed validation.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the provisioning pipeline
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Not running with elevated privileges
    #[error("Root privileges required (effective UID is {euid})")]
    NotRoot { euid: u32 },

    /// OS identity file could not be read
    #[error("Cannot read OS identity file {}: {source}", path.display())]
    OsRelease {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// OS family is not one we have a package backend for
    #[error("Unsupported OS family: {0}")]
    UnsupportedOs(String),

    /// Configuration errors (loading, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required binary is missing or not executable
    #[error("Required binary missing or not executable: {}", .0.display())]
    MissingBinary(PathBuf),

    /// A helper binary reports a version below the minimum
    #[error("{binary} version {found} is older than required {required}")]
    VersionTooOld {
        binary: String,
        found: String,
        required: String,
    },

    /// A delegated tool could not be spawned at all
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A delegated tool ran and exited non-zero
    #[error("{tool} failed (exit code {code}): {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// The finished setup did not pass validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// IO errors (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A path under the account's home crosses a symlink
    #[error("Refusing to follow symlink at {}", .0.display())]
    UnsafePath(PathBuf),

    /// Switching to or back from the account's credentials
    #[error("Cannot switch credentials for {account}: {source}")]
    Credentials {
        account: String,
        #[source]
        source: nix::Error,
    },
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Process exit code for this error.
    ///
    /// | Code | Meaning |
    /// |------|---------|
    /// | 2 | not root |
    /// | 3 | unsupported or undetectable OS |
    /// | 4 | invalid configuration |
    /// | 5 | missing or too-old binary |
    /// | 6 | delegated tool failure |
    /// | 7 | validation failure |
    /// | 1 | anything else |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotRoot { .. } => 2,
            Self::OsRelease { .. } | Self::UnsupportedOs(_) => 3,
            Self::Config(_) => 4,
            Self::MissingBinary(_) | Self::VersionTooOld { .. } => 5,
            Self::Spawn { .. } | Self::ToolFailed { .. } => 6,
            Self::Validation(_) => 7,
            Self::Io(_) | Self::Json(_) | Self::UnsafePath(_) | Self::Credentials { .. } => 1,
        }
    }
}
