//! ---
//! hpc_section: "01-core-functionality"
//! hpc_subsection: "binary"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Binary entrypoint for the agent daemon."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use anyhow::Result;
use clap::Parser;
use hpc_common::config::AgentConfig;
use hpc_common::logging::init_tracing;
use hpc_core::Agent;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AgentConfig::parse();
    init_tracing(config.log_format);

    info!(server = %config.server, "starting heat-pump controller agent");
    let handle = Agent::start(config).await?;

    wait_for_termination().await?;
    info!("termination signal received; shutting down");
    handle.shutdown().await;

    Ok(())
}

/// Block until ctrl-c or, on unix, SIGTERM (what the service manager
/// sends on stop).
async fn wait_for_termination() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok(())
    }
}
