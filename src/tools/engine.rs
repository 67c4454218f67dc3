//! Type-safe arguments for the container engine's own tools.
//!
//! - `SetupToolArgs` for `dockerd-rootless-setuptool.sh`
//! - `DockerArgs` for the `docker` CLI
//! - `VersionProbeArgs` for `<helper> --version`

use std::path::{Path, PathBuf};

use crate::tool_args::ToolArgs;

/// Vendor rootless setup tool.
pub const SETUP_TOOL: &str = "dockerd-rootless-setuptool.sh";
/// Launcher script the per-user unit runs.
pub const ROOTLESS_LAUNCHER: &str = "dockerd-rootless.sh";
/// User-mode network helper.
pub const NETWORK_HELPER: &str = "slirp4netns";

// ============================================================================
// dockerd-rootless-setuptool.sh
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupAction {
    Install,
    Uninstall,
}

/// Type-safe arguments for `dockerd-rootless-setuptool.sh`.
#[derive(Debug, Clone)]
pub struct SetupToolArgs {
    pub bin_dir: PathBuf,
    pub action: SetupAction,
}

impl ToolArgs for SetupToolArgs {
    fn program(&self) -> String {
        self.bin_dir.join(SETUP_TOOL).display().to_string()
    }

    /// No `--force`: the tool's own check for a running privileged daemon
    /// stays in effect.
    fn to_cli_args(&self) -> Vec<String> {
        match self.action {
            SetupAction::Install => vec!["install".to_string()],
            SetupAction::Uninstall => vec!["uninstall".to_string()],
        }
    }
}

// ============================================================================
// docker
// ============================================================================

/// Queries and workloads run through the `docker` CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerQuery {
    /// `docker version`; succeeds only when the daemon answers
    Version,
    /// `docker info --format '{{json .SecurityOptions}}'`
    SecurityOptions,
    /// `docker run --rm <image>`
    RunSmokeTest(String),
}

/// Type-safe arguments for the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerArgs {
    pub query: DockerQuery,
}

impl ToolArgs for DockerArgs {
    fn program(&self) -> String {
        "docker".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        match self.query {
            DockerQuery::Version => vec!["version".to_string()],
            DockerQuery::SecurityOptions => vec![
                "info".to_string(),
                "--format".to_string(),
                "{{json .SecurityOptions}}".to_string(),
            ],
            DockerQuery::RunSmokeTest(ref image) => {
                vec!["run".to_string(), "--rm".to_string(), image.clone()]
            }
        }
    }
}

// ============================================================================
// <helper> --version
// ============================================================================

/// Type-safe arguments for asking a helper binary its version.
#[derive(Debug, Clone)]
pub struct VersionProbeArgs {
    pub binary: PathBuf,
}

impl VersionProbeArgs {
    pub fn new(binary: &Path) -> Self {
        Self {
            binary: binary.to_path_buf(),
        }
    }
}

impl ToolArgs for VersionProbeArgs {
    fn program(&self) -> String {
        self.binary.display().to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["--version".to_string()]
    }
}
