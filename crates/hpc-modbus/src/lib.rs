//! ---
//! hpc_section: "02-device-control"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Modbus register access and decoding."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! Register-level access to heat pumps over Modbus TCP.
//!
//! Drivers speak to the device through the [`RegisterIo`] trait. The
//! production implementation is [`TcpRegisterClient`]; tests and the
//! dummy controller use the in-memory [`SimulatedRegisters`].

mod codec;
mod sim;
mod tcp;

use async_trait::async_trait;
use thiserror::Error;

pub use codec::{coil_pattern, decode_be, words_to_bytes, COIL_OFF, COIL_ON};
pub use sim::SimulatedRegisters;
pub use tcp::TcpRegisterClient;
pub use tokio_modbus::slave::Slave;

/// Error surfaced by every register operation, always carrying the
/// address that was attempted.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// Transport-level failure (connect, I/O, timeout).
    #[error("register {address}: {source}")]
    Transport {
        address: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The device answered with a Modbus exception.
    #[error("register {address}: device exception: {message}")]
    Exception { address: u16, message: String },
}

impl RegisterError {
    pub fn address(&self) -> u16 {
        match self {
            RegisterError::Transport { address, .. } => *address,
            RegisterError::Exception { address, .. } => *address,
        }
    }
}

/// Register-level device access shared by all drivers.
///
/// Numeric reads return the raw register content decoded as a signed
/// big-endian integer; scaling into physical units is the driver's
/// concern.
#[async_trait]
pub trait RegisterIo: Send + Sync {
    async fn read_input_16(&self, address: u16) -> Result<i64, RegisterError>;
    async fn read_holding_16(&self, address: u16) -> Result<i64, RegisterError>;
    async fn read_holding_32(&self, address: u16) -> Result<i64, RegisterError>;
    /// Raw multi-register read, decoded register-by-register by the
    /// caller.
    async fn read_holding_block(&self, address: u16, count: u16)
        -> Result<Vec<u16>, RegisterError>;
    async fn read_discrete_block(&self, address: u16, count: u16)
        -> Result<Vec<bool>, RegisterError>;
    async fn write_holding_16(&self, address: u16, value: u16) -> Result<(), RegisterError>;
    async fn write_coil(&self, address: u16, value: bool) -> Result<(), RegisterError>;
}
