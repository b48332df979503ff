//! ---
//! hpc_section: "03-cloud-synchronization"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Cloud API data model shared across the agent."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// One price/availability directive. The cloud delivers these keyed by
/// timestamp; lookups always go through the map key, the embedded
/// `time` field is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub heating: bool,
    pub hotwater: bool,
    pub hotwater_force: bool,
}

/// Wire shape of `GET schedule-v1`: timestamp key to directive.
pub type ScheduleBatch = HashMap<DateTime<Utc>, ScheduleEntry>;

/// In-memory price/availability table with resolution auto-detection
/// and point-in-time lookup.
#[derive(Debug, Default, Clone)]
pub struct Schedule {
    entries: ScheduleBatch,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a freshly fetched batch. Existing keys are replaced,
    /// never deleted; last writer wins per timestamp.
    pub fn merge(&mut self, batch: ScheduleBatch) {
        self.entries.extend(batch);
    }

    /// Drop entries older than `window` relative to wall-clock now,
    /// evaluated at call time.
    pub fn purge_older_than(&mut self, window: TimeDelta) {
        let cutoff = Utc::now() - window;
        self.entries.retain(|key, _| *key >= cutoff);
    }

    /// Heuristic resolution detection: quarter-hour if any key sits on
    /// a :15 boundary, hourly otherwise. A table holding only :00 and
    /// :30 keys is classified hourly even if it is really 30-minute
    /// data.
    pub fn is_quarter_resolution(&self) -> bool {
        self.entries.keys().any(|key| key.minute() == 15)
    }

    fn resolution_width(&self) -> TimeDelta {
        if self.is_quarter_resolution() {
            TimeDelta::minutes(15)
        } else {
            TimeDelta::hours(1)
        }
    }

    /// The entry whose half-open window `[key, key + width)` contains
    /// `at`, or `None` when the table cannot answer (callers must skip
    /// the cycle rather than assume a safe default). Should two
    /// windows ever overlap the instant, whichever the map iterates
    /// first wins; that tie-break is arbitrary and not part of the
    /// contract.
    pub fn current_at(&self, at: DateTime<Utc>) -> Option<&ScheduleEntry> {
        let width = self.resolution_width();
        self.entries
            .iter()
            .find(|(key, _)| at >= **key && at < **key + width)
            .map(|(_, entry)| entry)
    }

    /// The entry valid right now.
    pub fn current(&self) -> Option<&ScheduleEntry> {
        self.current_at(Utc::now())
    }

    /// The most recent entry by key, used as a fallback diagnostic.
    pub fn last(&self) -> Option<&ScheduleEntry> {
        self.entries
            .iter()
            .max_by_key(|(key, _)| **key)
            .map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
