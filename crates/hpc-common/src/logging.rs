//! ---
//! hpc_section: "01-core-functionality"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Shared agent plumbing."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use clap::ValueEnum;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

const LOG_ENV: &str = "HPC_LOG";

/// Log output formats of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable output for interactive use.
    #[default]
    Pretty,
    /// One JSON object per line for log shippers.
    Json,
}

/// Initialize the tracing subscriber.
///
/// `HPC_LOG` overrides the filter, falling back to the standard
/// `RUST_LOG`, finally to `info`. Safe to call more than once; later
/// calls are ignored.
pub fn init_tracing(format: LogFormat) {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); defaulting to info");
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let fmt_layer = match format {
        LogFormat::Pretty => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().with_target(false).json().boxed(),
    };

    let _ = Registry::default().with(filter).with(fmt_layer).try_init();
}
