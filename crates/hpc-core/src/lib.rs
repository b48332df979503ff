//! ---
//! hpc_section: "01-core-functionality"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Core agent orchestration."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! The agent: one device, one cloud account, a handful of timers.
//!
//! Startup wires identity and configuration, builds the driver and
//! spawns two tasks: the control loop (telemetry, alarms, reconcile,
//! schedule and token refresh) and the retry-queue drain worker.

mod agent;
mod alarm;

pub use agent::{Agent, AgentHandle};
pub use alarm::ActiveAlarms;
