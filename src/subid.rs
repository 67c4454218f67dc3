//! Subordinate UID/GID maps (`/etc/subuid`, `/etc/subgid`).
//!
//! Each line is `owner:start:count`, where `owner` is a login name or a
//! numeric UID. A new range is only allocated when the account has no line
//! yet, and it never overlaps any existing range.

use tracing::debug;

use crate::error::{ProvisionError, Result};

/// One `owner:start:count` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubIdEntry {
    pub owner: String,
    pub range: SubIdRange,
}

/// A contiguous block of subordinate IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubIdRange {
    pub start: u32,
    pub count: u32,
}

impl SubIdRange {
    /// First ID past the end of the block.
    fn end(&self) -> u64 {
        u64::from(self.start) + u64::from(self.count)
    }

    fn overlaps(&self, other: &SubIdRange) -> bool {
        u64::from(self.start) < other.end() && u64::from(other.start) < self.end()
    }

    /// `first-last` form accepted by `usermod --add-subuids`.
    pub fn to_usermod_arg(&self) -> String {
        let last = self.end() - 1;
        format!("{}-{}", self.start, last)
    }
}

/// Parsed contents of a subordinate ID file.
#[derive(Debug, Clone, Default)]
pub struct SubIdMap {
    entries: Vec<SubIdEntry>,
}

impl SubIdMap {
    /// Parse file contents. Blank lines, comments and malformed lines are skipped.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let entry = parse_line(line);
                if entry.is_none() {
                    debug!("Skipping malformed subordinate id line: {}", line);
                }
                entry
            })
            .collect();
        Self { entries }
    }

    /// True if `name` (or its numeric `uid`) already owns a range.
    pub fn has_owner(&self, name: &str, uid: u32) -> bool {
        let uid = uid.to_string();
        self.entries
            .iter()
            .any(|e| e.owner == name || e.owner == uid)
    }

    /// Lowest block of `count` IDs at or above `floor` that overlaps nothing.
    pub fn next_free(&self, floor: u32, count: u32) -> Result<SubIdRange> {
        if count == 0 {
            return Err(ProvisionError::config("subordinate id range size must be > 0"));
        }

        let mut taken: Vec<SubIdRange> = self.entries.iter().map(|e| e.range).collect();
        taken.sort_by_key(|r| r.start);

        let mut candidate = SubIdRange { start: floor, count };
        for existing in &taken {
            if candidate.overlaps(existing) {
                let next = existing.end();
                candidate.start = u32::try_from(next).map_err(|_| exhausted(count))?;
            }
        }

        if candidate.end() > u64::from(u32::MAX) {
            return Err(exhausted(count));
        }
        Ok(candidate)
    }
}

fn exhausted(count: u32) -> ProvisionError {
    ProvisionError::config(format!(
        "no free block of {} subordinate ids below {}",
        count,
        u32::MAX
    ))
}

fn parse_line(line: &str) -> Option<SubIdEntry> {
    let mut fields = line.split(':');
    let owner = fields.next()?.trim();
    let start = fields.next()?.trim().parse().ok()?;
    let count = fields.next()?.trim().parse().ok()?;
    if owner.is_empty() || fields.next().is_some() {
        return None;
    }
    Some(SubIdEntry {
        owner: owner.to_string(),
        range: SubIdRange { start, count },
    })
}
