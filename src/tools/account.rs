//! Type-safe arguments for account-management tools.
//!
//! - `GetentPasswdArgs` for `getent passwd`
//! - `UseraddArgs` for `useradd`
//! - `UsermodArgs` for `usermod`
//! - `LoginctlArgs` for `loginctl`

use std::path::PathBuf;

use crate::subid::SubIdRange;
use crate::tool_args::ToolArgs;

// ============================================================================
// getent
// ============================================================================

/// Type-safe arguments for `getent passwd <name>`. Exit code 2 means "no such key".
#[derive(Debug, Clone)]
pub struct GetentPasswdArgs {
    pub name: String,
}

impl GetentPasswdArgs {
    pub const NOT_FOUND: i32 = 2;
}

impl ToolArgs for GetentPasswdArgs {
    fn program(&self) -> String {
        "getent".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["passwd".to_string(), self.name.clone()]
    }
}

// ============================================================================
// useradd
// ============================================================================

/// Type-safe arguments for `useradd`.
#[derive(Debug, Clone)]
pub struct UseraddArgs {
    /// Login name to create.
    pub name: String,
    /// Login shell.
    pub shell: PathBuf,
}

impl ToolArgs for UseraddArgs {
    fn program(&self) -> String {
        "useradd".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "--create-home".to_string(),
            "--shell".to_string(),
            self.shell.display().to_string(),
            self.name.clone(),
        ]
    }
}

// ============================================================================
// usermod
// ============================================================================

/// What `usermod` should change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsermodChange {
    /// Append a supplementary group (`-aG`); a no-op if already a member.
    AppendGroup(String),
    /// Add subordinate uid and gid ranges.
    AddSubIds {
        uids: Option<SubIdRange>,
        gids: Option<SubIdRange>,
    },
}

/// Type-safe arguments for `usermod`.
#[derive(Debug, Clone)]
pub struct UsermodArgs {
    pub name: String,
    pub change: UsermodChange,
}

impl UsermodArgs {
    pub fn append_group(name: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            change: UsermodChange::AppendGroup(group.to_string()),
        }
    }
}

impl ToolArgs for UsermodArgs {
    fn program(&self) -> String {
        "usermod".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self.change {
            UsermodChange::AppendGroup(ref group) => {
                args.push("-aG".to_string());
                args.push(group.clone());
            }
            UsermodChange::AddSubIds { uids, gids } => {
                if let Some(range) = uids {
                    args.push("--add-subuids".to_string());
                    args.push(range.to_usermod_arg());
                }
                if let Some(range) = gids {
                    args.push("--add-subgids".to_string());
                    args.push(range.to_usermod_arg());
                }
            }
        }
        args.push(self.name.clone());
        args
    }
}

// ============================================================================
// loginctl
// ============================================================================

/// Type-safe arguments for `loginctl enable-linger <name>`.
#[derive(Debug, Clone)]
pub struct LoginctlArgs {
    pub name: String,
}

impl ToolArgs for LoginctlArgs {
    fn program(&self) -> String {
        "loginctl".to_string()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["enable-linger".to_string(), self.name.clone()]
    }
}
