//! Process execution for delegated tools.
//!
//! All external programs go through a [`CommandRunner`]. The production
//! implementation, [`SystemRunner`], spawns each child in its own process
//! group, registers it with the global [`ChildRegistry`], and switches to the
//! service account with `runuser` when the command's [`Identity`] asks for it.
//! Tests substitute a fake runner and never touch the host.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::account::Account;
use crate::error::{ProvisionError, Result};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use crate::tool_args::ToolArgs;

/// Who a command runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// The (privileged) caller
    Root,
    /// The service account, with its session environment
    Account {
        account: Account,
        bin_dir: PathBuf,
    },
}

impl Identity {
    pub fn account(account: &Account, bin_dir: impl Into<PathBuf>) -> Self {
        Self::Account {
            account: account.clone(),
            bin_dir: bin_dir.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Root => "root",
            Self::Account { account, .. } => &account.name,
        }
    }
}

/// A fully resolved command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub identity: Identity,
}

impl ToolCommand {
    pub fn new<T: ToolArgs>(args: &T, identity: Identity) -> Self {
        Self {
            program: args.program(),
            args: args.to_cli_args(),
            env: args.get_env_vars(),
            identity,
        }
    }

    /// Program basename, used in error messages.
    pub fn tool_name(&self) -> &str {
        self.program.rsplit('/').next().unwrap_or(&self.program)
    }

    /// True if the program and leading arguments match `prefix`.
    pub fn matches(&self, program: &str, prefix: &[&str]) -> bool {
        self.tool_name() == program
            && self.args.len() >= prefix.len()
            && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.identity.name(), self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output from the tool.
    pub stdout: String,
    /// Standard error from the tool.
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the tool exited successfully (exit code 0).
    pub success: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
            success: false,
        }
    }

    /// Check if the tool succeeded and return an error if not.
    pub fn ensure_success(self, tool: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(ProvisionError::ToolFailed {
                tool: tool.to_string(),
                code: self.exit_code.unwrap_or(-1),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// The process boundary.
///
/// `Err` means the program could not be run at all; a non-zero exit is an
/// `Ok` with `success == false` so callers decide what it means.
pub trait CommandRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<CommandOutput>;
}

/// Run typed args as `identity`, returning the raw output.
pub fn run_tool<T: ToolArgs>(
    runner: &dyn CommandRunner,
    args: &T,
    identity: &Identity,
) -> Result<CommandOutput> {
    runner.run(&ToolCommand::new(args, identity.clone()))
}

/// Run typed args as `identity` and fail on non-zero exit.
pub fn run_tool_checked<T: ToolArgs>(
    runner: &dyn CommandRunner,
    args: &T,
    identity: &Identity,
) -> Result<CommandOutput> {
    let cmd = ToolCommand::new(args, identity.clone());
    runner.run(&cmd)?.ensure_success(cmd.tool_name())
}

/// Runs commands on the real host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn build(cmd: &ToolCommand) -> Command {
        match cmd.identity {
            Identity::Root => {
                let mut command = Command::new(&cmd.program);
                command.args(&cmd.args).envs(cmd.env.iter().cloned());
                command
            }
            Identity::Account {
                ref account,
                ref bin_dir,
            } => {
                // runuser resets nothing we rely on; pass the session env
                // explicitly through env(1) so it survives the switch.
                let mut command = Command::new("runuser");
                command.args(["-u", account.name.as_str(), "--", "env"]);
                for (key, value) in account.session_env(bin_dir).iter().chain(&cmd.env) {
                    command.arg(format!("{}={}", key, value));
                }
                command.arg(&cmd.program).args(&cmd.args);
                if account.home.is_dir() {
                    command.current_dir(&account.home);
                } else {
                    command.current_dir("/");
                }
                command
            }
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<CommandOutput> {
        info!("exec: {} env={:?}", cmd, cmd.env);

        let mut command = Self::build(cmd);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        let child = command.spawn().map_err(|source| ProvisionError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        let pid = child.id();

        ChildRegistry::with_global(|registry| registry.register(pid, cmd.tool_name()));
        let output = child.wait_with_output();
        ChildRegistry::with_global(|registry| registry.unregister(pid));
        let output = output?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        for line in stdout.lines().chain(stderr.lines()) {
            debug!("  {}: {}", cmd.tool_name(), line);
        }

        let exit_code = output.status.code();
        let success = output.status.success();
        if !success {
            warn!(
                "{} exited with code {}",
                cmd.tool_name(),
                exit_code.unwrap_or(-1)
            );
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
            success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl ToolArgs for Echo {
        fn program(&self) -> String {
            "echo".to_string()
        }
        fn to_cli_args(&self) -> Vec<String> {
            vec!["hello".to_string()]
        }
    }

    #[test]
    fn test_ensure_success() {
        assert!(CommandOutput::ok("x").ensure_success("t").is_ok());
        let err = CommandOutput::failed(3, "boom\n").ensure_success("t").unwrap_err();
        assert!(matches!(err, ProvisionError::ToolFailed { code: 3, ref stderr, .. } if stderr == "boom"));
    }

    #[test]
    fn test_tool_command_matches() {
        let cmd = ToolCommand {
            program: "/usr/bin/systemctl".to_string(),
            args: vec!["--user".into(), "enable".into(), "--now".into(), "docker".into()],
            env: vec![],
            identity: Identity::Root,
        };
        assert_eq!(cmd.tool_name(), "systemctl");
        assert!(cmd.matches("systemctl", &["--user", "enable"]));
        assert!(!cmd.matches("systemctl", &["enable"]));
        assert_eq!(cmd.to_string(), "[root] /usr/bin/systemctl --user enable --now docker");
    }

    #[test]
    fn test_system_runner_runs_echo() {
        let out = run_tool(&SystemRunner, &Echo, &Identity::Root).expect("echo runs");
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_system_runner_spawn_failure() {
        let cmd = ToolCommand {
            program: "this_binary_definitely_does_not_exist_12345".to_string(),
            args: vec![],
            env: vec![],
            identity: Identity::Root,
        };
        let err = SystemRunner.run(&cmd).unwrap_err();
        assert!(matches!(err, ProvisionError::Spawn { .. }));
    }

    #[test]
    fn test_account_command_goes_through_runuser() {
        let account = Account::from_passwd_line("svc:x:1001:1001::/nonexistent/svc:/bin/bash")
            .expect("parse");
        let cmd = ToolCommand::new(&Echo, Identity::account(&account, "/usr/bin"));
        let built = SystemRunner::build(&cmd);
        assert_eq!(built.get_program(), "runuser");
        let args: Vec<String> = built
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(&args[..4], ["-u", "svc", "--", "env"]);
        assert!(args.contains(&"XDG_RUNTIME_DIR=/run/user/1001".to_string()));
        assert_eq!(args[args.len() - 2..], ["echo".to_string(), "hello".to_string()]);
    }
}
