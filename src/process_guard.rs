//! Child process control for an interruptible provisioning run.
//!
//! Package managers and the vendor setup tool can run for minutes. When the
//! run is interrupted those children have to stop with it, and the operator
//! needs to know which step was cut short before running again.
//!
//! - [`CommandProcessGroup`] starts each child in its own process group and
//!   has the kernel signal it if the provisioner dies first.
//! - [`ChildRegistry`] tracks running children with their tool names, plus
//!   the pipeline step currently executing.
//! - [`init_signal_handlers`] and [`ProcessGuard`] stop whatever is left.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use nix::libc;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

static REGISTRY: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();

/// Children spawned by the runner that have not been reaped yet.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    running: BTreeMap<u32, String>,
    step: Option<String>,
    stopped: bool,
}

impl ChildRegistry {
    /// Run `f` against the process-wide registry. A poisoned lock is taken
    /// over: the PID map is still accurate after a panicking holder.
    pub fn with_global<R>(f: impl FnOnce(&mut ChildRegistry) -> R) -> R {
        let registry = REGISTRY.get_or_init(Mutex::default);
        let mut guard = registry.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn register(&mut self, pid: u32, tool: &str) {
        debug!("Tracking {} (pid {})", tool, pid);
        self.running.insert(pid, tool.to_string());
    }

    pub fn unregister(&mut self, pid: u32) {
        if let Some(tool) = self.running.remove(&pid) {
            debug!("{} (pid {}) finished", tool, pid);
        }
    }

    pub fn count(&self) -> usize {
        self.running.len()
    }

    /// Record the pipeline step now executing; `None` between steps.
    pub fn set_step(&mut self, step: Option<String>) {
        self.step = step;
    }

    /// Where the run is right now, for interruption messages.
    pub fn interrupted(&self) -> String {
        let step = match self.step {
            Some(ref step) => format!("step '{}'", step),
            None => "startup".to_string(),
        };
        if self.running.is_empty() {
            return step;
        }
        let tools: Vec<String> = self
            .running
            .iter()
            .map(|(pid, tool)| format!("{} (pid {})", tool, pid))
            .collect();
        format!("{} while running {}", step, tools.join(", "))
    }

    /// SIGTERM every child's process group, wait up to `grace`, then SIGKILL
    /// the groups still running. Only the first call does anything.
    pub fn terminate_all(&mut self, grace: Duration) {
        if std::mem::replace(&mut self.stopped, true) {
            return;
        }
        let running = std::mem::take(&mut self.running);
        if running.is_empty() {
            return;
        }

        for (pid, tool) in &running {
            info!("Stopping {} (pid {})", tool, pid);
            signal_group(*pid, Signal::SIGTERM);
        }
        let survivors = wait_for_exit(running.keys().copied().collect(), grace);
        for pid in survivors {
            let tool = running.get(&pid).map(String::as_str).unwrap_or("child");
            warn!("{} (pid {}) ignored SIGTERM, killing it", tool, pid);
            signal_group(pid, Signal::SIGKILL);
        }
    }
}

/// Signal the group led by `pid`, or just `pid` if it never got a group.
fn signal_group(pid: u32, signal: Signal) {
    let raw = pid as i32;
    if let Err(group_err) = kill(Pid::from_raw(-raw), signal) {
        if let Err(e) = kill(Pid::from_raw(raw), signal) {
            warn!("Cannot send {} to pid {}: {} / {}", signal, pid, group_err, e);
        }
    }
}

/// PIDs from `pids` still running once `grace` has passed.
fn wait_for_exit(mut pids: Vec<u32>, grace: Duration) -> Vec<u32> {
    let deadline = Instant::now() + grace;
    loop {
        pids.retain(|&pid| is_running(pid));
        if pids.is_empty() || Instant::now() >= deadline {
            return pids;
        }
        thread::sleep(Duration::from_millis(100));
    }
}

/// Exists and is neither a zombie nor dead.
fn is_running(pid: u32) -> bool {
    if kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    // the state follows the parenthesised command name, which may hold spaces
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let rest = stat.rsplit_once(')')?.1.to_string();
            rest.split_whitespace().next().map(str::to_string)
        })
        .is_none_or(|state| state != "Z" && state != "X")
}

/// Stops any remaining children when dropped. `main` holds one for the
/// whole run, so an error return still cleans up.
#[derive(Debug)]
pub struct ProcessGuard {
    grace: Duration,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            grace: Duration::from_secs(5),
        }
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        ChildRegistry::with_global(|registry| registry.terminate_all(self.grace));
    }
}

/// Exit `128 + signal` on SIGINT, SIGTERM or SIGHUP after stopping every
/// child, logging the step that was interrupted. Call once at startup.
pub fn init_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                let name = Signal::try_from(sig).map(Signal::as_str).unwrap_or("signal");
                ChildRegistry::with_global(|registry| {
                    warn!(
                        "{} during {}; the host may be partially provisioned, run again to converge",
                        name,
                        registry.interrupted()
                    );
                    registry.terminate_all(Duration::from_secs(3));
                });
                std::process::exit(128 + sig);
            }
        })?;
    Ok(())
}

/// Process-group setup for `std::process::Command`.
pub trait CommandProcessGroup {
    /// Lead a new process group and receive SIGTERM when the parent dies.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: setpgid and prctl are async-signal-safe, which is all
        // that may run between fork and exec.
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
