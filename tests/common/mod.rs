//! Shared fixtures: a temp-dir host root and a fake runner that simulates
//! the tools the pipeline drives.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use rootless_setup::{
    CommandOutput, CommandRunner, HostPaths, ProvisionConfig, Result, ToolCommand,
};

pub const UBUNTU: &str = "PRETTY_NAME=\"Ubuntu 24.04 LTS\"\nID=ubuntu\nID_LIKE=debian\n";
pub const FEDORA: &str = "NAME=\"Fedora Linux\"\nID=fedora\nVERSION_ID=40\n";
pub const ARCH: &str = "NAME=\"Arch Linux\"\nID=arch\n";

/// Simulated host state the fake tools read and change.
#[derive(Debug, Default)]
pub struct HostState {
    pub account_exists: bool,
    pub installed: BTreeSet<String>,
    pub user_engine_active: bool,
    /// Privileged `docker.service`, started by the engine package's install script.
    pub system_engine_active: bool,
    pub setup_tool_fails: bool,
    pub helper_version: String,
    pub engine_rootless: bool,
}

/// A host rooted in a temp dir.
pub struct FakeHost {
    pub dir: tempfile::TempDir,
    pub state: RefCell<HostState>,
    pub calls: RefCell<Vec<ToolCommand>>,
}

impl FakeHost {
    /// A supported host with the rootless tools installed and AppArmor present.
    pub fn new(os_release: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "etc/os-release", os_release);
        fs::create_dir_all(dir.path().join("etc/apparmor.d")).expect("apparmor.d");
        fs::create_dir_all(dir.path().join("home")).expect("home");
        for tool in ["dockerd-rootless-setuptool.sh", "dockerd-rootless.sh", "slirp4netns"] {
            executable(dir.path(), &format!("usr/bin/{}", tool));
        }
        Self {
            dir,
            state: RefCell::new(HostState {
                helper_version: "1.2.1".to_string(),
                engine_rootless: true,
                ..Default::default()
            }),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> HostPaths {
        HostPaths::new(self.root())
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel.trim_start_matches('/'))
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap_or_default()
    }

    /// Config with fast polling.
    pub fn config(&self) -> ProvisionConfig {
        let mut config = ProvisionConfig::default();
        config.validation.poll_interval_secs = 0;
        config.validation.max_attempts = 3;
        config
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// True if any recorded command matches `program` and leading `args`.
    pub fn ran(&self, program: &str, args: &[&str]) -> bool {
        self.calls.borrow().iter().any(|c| c.matches(program, args))
    }

    /// Every recorded command, rendered for assertion messages.
    pub fn transcript(&self) -> String {
        self.calls
            .borrow()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn passwd_line(&self, name: &str) -> String {
        format!(
            "{}:x:{}:{}::/home/{}:/bin/bash\n",
            name,
            nix::unistd::getuid().as_raw(),
            nix::unistd::getgid().as_raw(),
            name
        )
    }

    fn append_subids(&self, file: &str, owner: &str, arg: &str) {
        let (first, last) = arg.split_once('-').expect("first-last");
        let first: u64 = first.parse().expect("first");
        let last: u64 = last.parse().expect("last");
        let path = self.path(file);
        let mut out = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("open subid file");
        writeln!(out, "{}:{}:{}", owner, first, last - first + 1).expect("append");
    }

    fn package_args(args: &[String], verb: &str) -> Vec<String> {
        args.iter()
            .skip_while(|a| a.as_str() != verb)
            .skip(1)
            .cloned()
            .collect()
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, cmd: &ToolCommand) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(cmd.clone());
        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
        let mut state = self.state.borrow_mut();

        let out = match cmd.tool_name() {
            "getent" => {
                let name = args.last().copied().unwrap_or_default();
                if state.account_exists {
                    CommandOutput::ok(self.passwd_line(name))
                } else {
                    CommandOutput::failed(2, "")
                }
            }
            "useradd" => {
                state.account_exists = true;
                CommandOutput::ok("")
            }
            "usermod" => {
                let owner = args.last().copied().unwrap_or_default();
                for (flag, file) in [("--add-subuids", "etc/subuid"), ("--add-subgids", "etc/subgid")] {
                    if let Some(pos) = args.iter().position(|a| *a == flag) {
                        self.append_subids(file, owner, args[pos + 1]);
                    }
                }
                CommandOutput::ok("")
            }
            "loginctl" | "modprobe" => CommandOutput::ok(""),
            "apt-get" | "dnf" => {
                for pkg in Self::package_args(&cmd.args, "install") {
                    if pkg == "docker-ce" {
                        state.system_engine_active = true;
                        write(self.root(), "run/docker.sock", "");
                    }
                    state.installed.insert(pkg);
                }
                for verb in ["purge", "remove"] {
                    for pkg in Self::package_args(&cmd.args, verb) {
                        state.installed.remove(&pkg);
                    }
                }
                CommandOutput::ok("")
            }
            "dpkg-query" => match args.last() {
                Some(pkg) if state.installed.contains(*pkg) => {
                    CommandOutput::ok("install ok installed")
                }
                _ => CommandOutput::failed(1, "no packages found"),
            },
            "rpm" => match args.last() {
                Some(pkg) if state.installed.contains(*pkg) => CommandOutput::ok(""),
                _ => CommandOutput::failed(1, "package is not installed"),
            },
            "systemctl" => match args.as_slice() {
                ["--user", "is-active", ..] if !state.user_engine_active => {
                    CommandOutput::failed(3, "")
                }
                ["--user", "enable", "--now", ..] => {
                    state.user_engine_active = true;
                    CommandOutput::ok("")
                }
                ["stop", units @ ..] if units.contains(&"docker.service") => {
                    state.system_engine_active = false;
                    CommandOutput::ok("")
                }
                _ => CommandOutput::ok(""),
            },
            "dockerd-rootless-setuptool.sh" => match args.first() {
                Some(&"install") if state.setup_tool_fails => {
                    CommandOutput::failed(1, "[ERROR] Missing system requirements")
                }
                Some(&"install") if state.system_engine_active => CommandOutput::failed(
                    1,
                    "[ERROR] Aborting because rootful Docker (/var/run/docker.sock) is running and accessible.",
                ),
                _ => CommandOutput::ok("[INFO] Installed docker.service successfully."),
            },
            "slirp4netns" => CommandOutput::ok(format!(
                "slirp4netns version {}\ncommit: 0000000\n",
                state.helper_version
            )),
            "docker" => match args.first() {
                Some(&"version") if state.user_engine_active => CommandOutput::ok("Server: Docker Engine - Community"),
                Some(&"version") => CommandOutput::failed(1, "Cannot connect to the Docker daemon"),
                Some(&"info") if state.engine_rootless => {
                    CommandOutput::ok("[\"name=seccomp,profile=builtin\",\"name=rootless\",\"name=cgroupns\"]")
                }
                Some(&"info") => CommandOutput::ok("[\"name=seccomp,profile=builtin\"]"),
                Some(&"run") => CommandOutput::ok("Hello from Docker!"),
                _ => CommandOutput::failed(1, "unknown docker command"),
            },
            other => CommandOutput::failed(127, format!("{}: command not found", other)),
        };
        Ok(out)
    }
}

pub fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, contents).expect("write");
}

pub fn executable(root: &Path, rel: &str) {
    write(root, rel, "#!/bin/sh\nexit 0\n");
    fs::set_permissions(root.join(rel), fs::Permissions::from_mode(0o755)).expect("chmod");
}
