//! ---
//! hpc_section: "01-core-functionality"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Active-alarm delivery tracking."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use std::collections::HashSet;

use parking_lot::Mutex;

/// Alarms the cloud already knows about. Deduplicates delivery so a
/// persistent alarm is posted once when it appears, not every 30
/// seconds while it stays raised.
#[derive(Debug, Default)]
pub struct ActiveAlarms {
    inner: Mutex<HashSet<String>>,
}

impl ActiveAlarms {
    /// Record an alarm as active. Returns true when it was newly
    /// raised and must be delivered.
    pub fn add(&self, alarm: &str) -> bool {
        self.inner.lock().insert(alarm.to_owned())
    }

    /// Forget all active alarms. Returns true when any were active,
    /// meaning the cloud must be told to clear.
    pub fn clear(&self) -> bool {
        let mut inner = self.inner.lock();
        let had_active = !inner.is_empty();
        inner.clear();
        had_active
    }
}
