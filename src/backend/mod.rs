//! Collaborators standing between the pipeline and the host's tools.
//!
//! Each trait covers one family of external tools; the `System*` / distro
//! implementations drive real programs through a [`CommandRunner`]. Steps
//! only see the traits.
//!
//! [`CommandRunner`]: crate::runner::CommandRunner

pub mod identity;
pub mod packages;
pub mod services;

pub use identity::{IdentityStore, SubIdStatus, SystemIdentityStore};
pub use packages::{backend_for, AptBackend, DnfBackend, PackageBackend};
pub use services::{ServiceSupervisor, Systemd};
