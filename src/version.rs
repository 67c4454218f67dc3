//! Dotted version triples for helper binary checks.
//!
//! Comparison is numeric per component (`0.10.0 > 0.9.9`), never lexical.
//! Missing components count as zero, so `1.0` equals `1.0.0`.

use std::fmt;
use std::str::FromStr;

use crate::error::ProvisionError;

/// A `major.minor.patch` version.
///
/// Field order matters: the derived `Ord` compares major first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Find the first version-looking token in a tool's `--version` output.
    ///
    /// Handles `slirp4netns version 1.2.1`, `v0.4.0`, and multi-line output
    /// where later lines carry commit hashes or libslirp versions.
    pub fn find_in(output: &str) -> Option<Self> {
        output
            .split_whitespace()
            .map(|tok| tok.trim_start_matches('v'))
            .filter(|tok| tok.starts_with(|c: char| c.is_ascii_digit()) && tok.contains('.'))
            .find_map(|tok| tok.parse().ok())
    }

    /// True if `self` is at least `minimum`.
    pub fn satisfies(&self, minimum: &Version) -> bool {
        self >= minimum
    }
}

impl FromStr for Version {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('v');
        // Drop pre-release/build suffixes: 1.2.0-beta.1+git -> 1.2.0
        let core = s.split(['-', '+']).next().unwrap_or_default();

        let mut parts = [0u64; 3];
        for (i, piece) in core.split('.').enumerate() {
            if i >= 3 {
                return Err(ProvisionError::config(format!(
                    "version '{}' has more than three components",
                    s
                )));
            }
            parts[i] = piece.parse().map_err(|_| {
                ProvisionError::config(format!("invalid version component '{}' in '{}'", piece, s))
            })?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
