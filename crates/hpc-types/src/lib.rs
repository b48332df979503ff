//! ---
//! hpc_section: "03-cloud-synchronization"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Cloud API data model shared across the agent."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! Data model for the controller cloud API (v1) and the in-process
//! caches shared between the periodic activities.

pub mod config;
pub mod meter;
pub mod schedule;
pub mod state;

pub use config::{CloudConfig, ControlType, HeatCurve, MeterDescriptor};
pub use meter::{MeterCache, MeterReading, P1ibPayload};
pub use schedule::{Schedule, ScheduleBatch, ScheduleEntry};
pub use state::{DeviceState, StateCache};
