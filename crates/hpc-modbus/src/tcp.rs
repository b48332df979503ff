//! ---
//! hpc_section: "02-device-control"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Modbus register access and decoding."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::lookup_host;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context, Reader, Writer};
use tokio_modbus::slave::Slave;
use tracing::{debug, warn};

use crate::codec::{coil_pattern, decode_be, words_to_bytes};
use crate::{RegisterError, RegisterIo};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Lazily connected Modbus TCP client.
///
/// The underlying master library does not always recover from a
/// half-open TCP session, so any error that looks like a broken or
/// stalled connection drops the cached context; the next call
/// reconnects. Dropping twice is safe.
pub struct TcpRegisterClient {
    address: String,
    slave: Slave,
    context: Mutex<Option<Context>>,
}

impl TcpRegisterClient {
    pub fn new(address: impl Into<String>, slave: Slave) -> Self {
        Self {
            address: address.into(),
            slave,
            context: Mutex::new(None),
        }
    }

    async fn connect(&self) -> io::Result<Context> {
        let addr = lookup_host(&self.address)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no socket address for {}", self.address),
                )
            })?;
        debug!(address = %self.address, "connecting modbus tcp");
        tcp::connect_slave(addr, self.slave)
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))
    }

    async fn ensure_connected<'a>(
        &self,
        guard: &'a mut Option<Context>,
        address: u16,
    ) -> Result<&'a mut Context, RegisterError> {
        match guard {
            Some(context) => Ok(context),
            None => {
                let context = self.connect().await.map_err(|err| RegisterError::Transport {
                    address,
                    source: Box::new(err),
                })?;
                Ok(guard.insert(context))
            }
        }
    }

    /// Collapse the timeout/transport/exception layers of one device
    /// call, dropping the connection when the error indicates it is
    /// broken or stalled.
    fn finish<T, E>(
        &self,
        address: u16,
        guard: &mut Option<Context>,
        outcome: Result<Result<Result<T, tokio_modbus::Exception>, E>, tokio::time::error::Elapsed>,
    ) -> Result<T, RegisterError>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match outcome {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(exception))) => Err(RegisterError::Exception {
                address,
                message: format!("{exception:?}"),
            }),
            Ok(Err(err)) => {
                if connection_is_broken(&err) {
                    warn!(address, error = %err, "dropping modbus connection for reconnect");
                    *guard = None;
                }
                Err(RegisterError::Transport {
                    address,
                    source: Box::new(err),
                })
            }
            Err(_elapsed) => {
                warn!(address, "modbus call timed out, dropping connection for reconnect");
                *guard = None;
                Err(RegisterError::Transport {
                    address,
                    source: Box::new(io::Error::new(io::ErrorKind::TimedOut, "modbus call timed out")),
                })
            }
        }
    }
}

/// Whether an error indicates a connection that will not recover on
/// its own (half-open socket or stalled peer).
fn connection_is_broken(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(inner) = current {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            return matches!(
                io_err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::TimedOut
            );
        }
        current = inner.source();
    }
    false
}

#[async_trait]
impl RegisterIo for TcpRegisterClient {
    async fn read_input_16(&self, address: u16) -> Result<i64, RegisterError> {
        let mut guard = self.context.lock().await;
        let context = self.ensure_connected(&mut guard, address).await?;
        let outcome = timeout(CALL_TIMEOUT, context.read_input_registers(address, 1)).await;
        let words = self.finish(address, &mut guard, outcome)?;
        Ok(decode_be(&words_to_bytes(&words)))
    }

    async fn read_holding_16(&self, address: u16) -> Result<i64, RegisterError> {
        let mut guard = self.context.lock().await;
        let context = self.ensure_connected(&mut guard, address).await?;
        let outcome = timeout(CALL_TIMEOUT, context.read_holding_registers(address, 1)).await;
        let words = self.finish(address, &mut guard, outcome)?;
        Ok(decode_be(&words_to_bytes(&words)))
    }

    async fn read_holding_32(&self, address: u16) -> Result<i64, RegisterError> {
        let mut guard = self.context.lock().await;
        let context = self.ensure_connected(&mut guard, address).await?;
        let outcome = timeout(CALL_TIMEOUT, context.read_holding_registers(address, 2)).await;
        let words = self.finish(address, &mut guard, outcome)?;
        Ok(decode_be(&words_to_bytes(&words)))
    }

    async fn read_holding_block(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, RegisterError> {
        let mut guard = self.context.lock().await;
        let context = self.ensure_connected(&mut guard, address).await?;
        let outcome = timeout(CALL_TIMEOUT, context.read_holding_registers(address, count)).await;
        self.finish(address, &mut guard, outcome)
    }

    async fn read_discrete_block(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, RegisterError> {
        let mut guard = self.context.lock().await;
        let context = self.ensure_connected(&mut guard, address).await?;
        let outcome = timeout(CALL_TIMEOUT, context.read_discrete_inputs(address, count)).await;
        self.finish(address, &mut guard, outcome)
    }

    async fn write_holding_16(&self, address: u16, value: u16) -> Result<(), RegisterError> {
        let mut guard = self.context.lock().await;
        let context = self.ensure_connected(&mut guard, address).await?;
        let outcome = timeout(CALL_TIMEOUT, context.write_single_register(address, value)).await;
        self.finish(address, &mut guard, outcome)
    }

    async fn write_coil(&self, address: u16, value: bool) -> Result<(), RegisterError> {
        let mut guard = self.context.lock().await;
        let context = self.ensure_connected(&mut guard, address).await?;
        debug!(
            address,
            raw = format_args!("{:#06x}", coil_pattern(value)),
            "write coil"
        );
        let outcome = timeout(CALL_TIMEOUT, context.write_single_coil(address, value)).await;
        self.finish(address, &mut guard, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_connection_detection() {
        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe");
        assert!(connection_is_broken(&broken));
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(connection_is_broken(&reset));
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(!connection_is_broken(&refused));
    }

    #[tokio::test]
    async fn errors_carry_the_attempted_address() {
        // Unresolvable host: every call fails at connect time but must
        // still report which register was being accessed.
        let client = TcpRegisterClient::new("nonexistent.invalid:502", Slave(0xFF));
        let err = client.read_holding_16(551).await.unwrap_err();
        assert_eq!(err.address(), 551);
        assert!(err.to_string().contains("551"));
    }
}
