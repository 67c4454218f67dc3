//! rootless-setup Library
//!
//! Provisions a rootless container engine for a dedicated service account:
//! OS detection, teardown of the privileged engine, package installation,
//! identity and subordinate-ID setup, AppArmor profile, per-user engine
//! service and validation.

pub mod account;
pub mod apparmor;
pub mod backend;
pub mod cli;
pub mod config;
pub mod daemon_config;
pub mod error;
pub mod host;
pub mod logic;
pub mod pipeline;
pub mod preflight;
pub mod process_guard;
pub mod runner;
pub mod session;
pub mod subid;
pub mod tool_args;
pub mod tools;
pub mod types;
pub mod version;

// Re-export main types for convenience
pub use account::Account;
pub use backend::{IdentityStore, PackageBackend, ServiceSupervisor};
pub use config::ProvisionConfig;
pub use daemon_config::DaemonConfig;
pub use error::{ProvisionError, Result};
pub use host::{HostInfo, HostPaths, OsRelease};
pub use logic::{Step, StepLog, StepOutcome};
pub use pipeline::{ProvisionReport, Provisioner};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use runner::{CommandOutput, CommandRunner, Identity, SystemRunner, ToolCommand};
pub use session::{AccountAction, AccountBlock, Session};
pub use tool_args::ToolArgs;
pub use types::{HelperRequirement, OsFamily, ServiceScope, StepPolicy};
pub use version::Version;
