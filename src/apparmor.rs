//! AppArmor profile for the rootless supervisor binary.
//!
//! Ubuntu 23.10+ restricts unprivileged user namespaces unless the calling
//! binary has a profile granting `userns`. The profile is generated as the
//! service account and installed by root; both sides derive the file name
//! with [`profile_name`].

use std::path::Path;

/// System-wide profile directory.
pub const PROFILE_DIR: &str = "/etc/apparmor.d";

/// Derive the profile name for a binary: `/home/svc/bin/rootlesskit` ->
/// `home.svc.bin.rootlesskit`.
pub fn profile_name(binary: &Path) -> String {
    let path = binary.to_string_lossy();
    path.strip_prefix('/').unwrap_or(&path).replace('/', ".")
}

/// Render the policy document that unconfines `userns` for exactly `binary`.
pub fn render_profile(binary: &Path) -> String {
    let name = profile_name(binary);
    format!(
        "# Managed by rootless-setup. Local additions go in local/{name}.\n\
         abi <abi/4.0>,\n\
         include <tunables/global>\n\
         \n\
         \"{path}\" flags=(unconfined) {{\n\
         \x20 userns,\n\
         \n\
         \x20 include if exists <local/{name}>\n\
         }}\n",
        name = name,
        path = binary.display(),
    )
}
