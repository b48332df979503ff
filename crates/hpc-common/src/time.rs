//! ---
//! hpc_section: "01-core-functionality"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Shared agent plumbing."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// The next quarter-hour boundary strictly after `now`. An instant
/// exactly on a boundary yields the following one, so a timer re-armed
/// at its own fire time never fires twice.
pub fn next_quarter(now: DateTime<Utc>) -> DateTime<Utc> {
    let quarter = TimeDelta::minutes(15);
    match now.duration_trunc(quarter) {
        Ok(floor) => floor + quarter,
        // Out-of-range timestamps cannot be truncated; a plain offset
        // keeps the loop alive.
        Err(_) => now + quarter,
    }
}

/// How long to sleep until the next quarter-hour boundary.
pub fn until_next_quarter(now: DateTime<Utc>) -> Duration {
    (next_quarter(now) - now).to_std().unwrap_or(Duration::ZERO)
}
