//! ---
//! hpc_section: "01-core-functionality"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Shared agent plumbing."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! Plumbing shared by the daemon and the core agent: CLI configuration,
//! the token and serial identity files, tracing setup and wall-clock
//! helpers.

pub mod config;
pub mod logging;
pub mod time;
