//! ---
//! hpc_section: "02-device-control"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Modbus register access and decoding."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::codec::{decode_be, words_to_bytes};
use crate::{RegisterError, RegisterIo};

#[derive(Debug, Default)]
struct SimState {
    input: HashMap<u16, u16>,
    holding: HashMap<u16, u16>,
    coils: HashMap<u16, bool>,
    discrete: HashMap<u16, bool>,
}

/// In-memory register map implementing [`RegisterIo`].
///
/// Used by driver tests and the integration suite in place of a real
/// device; unset registers read as 0, unset bits as false.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRegisters {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_input(&self, address: u16, value: i16) {
        self.state.lock().await.input.insert(address, value as u16);
    }

    pub async fn set_holding(&self, address: u16, value: i16) {
        self.state
            .lock()
            .await
            .holding
            .insert(address, value as u16);
    }

    /// Store a 32-bit value across two consecutive holding registers,
    /// high word first.
    pub async fn set_holding_32(&self, address: u16, value: i32) {
        let raw = value as u32;
        let mut state = self.state.lock().await;
        state.holding.insert(address, (raw >> 16) as u16);
        state.holding.insert(address + 1, raw as u16);
    }

    pub async fn set_discrete(&self, address: u16, value: bool) {
        self.state.lock().await.discrete.insert(address, value);
    }

    pub async fn holding(&self, address: u16) -> u16 {
        *self
            .state
            .lock()
            .await
            .holding
            .get(&address)
            .unwrap_or(&0)
    }

    /// Last written coil value, `None` when never written.
    pub async fn coil(&self, address: u16) -> Option<bool> {
        self.state.lock().await.coils.get(&address).copied()
    }

    async fn read_words(
        &self,
        holding: bool,
        address: u16,
        count: u16,
    ) -> Vec<u16> {
        let state = self.state.lock().await;
        let bank = if holding { &state.holding } else { &state.input };
        (0..count)
            .map(|offset| *bank.get(&(address + offset)).unwrap_or(&0))
            .collect()
    }
}

#[async_trait]
impl RegisterIo for SimulatedRegisters {
    async fn read_input_16(&self, address: u16) -> Result<i64, RegisterError> {
        let words = self.read_words(false, address, 1).await;
        Ok(decode_be(&words_to_bytes(&words)))
    }

    async fn read_holding_16(&self, address: u16) -> Result<i64, RegisterError> {
        let words = self.read_words(true, address, 1).await;
        Ok(decode_be(&words_to_bytes(&words)))
    }

    async fn read_holding_32(&self, address: u16) -> Result<i64, RegisterError> {
        let words = self.read_words(true, address, 2).await;
        Ok(decode_be(&words_to_bytes(&words)))
    }

    async fn read_holding_block(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, RegisterError> {
        Ok(self.read_words(true, address, count).await)
    }

    async fn read_discrete_block(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, RegisterError> {
        let state = self.state.lock().await;
        Ok((0..count)
            .map(|offset| *state.discrete.get(&(address + offset)).unwrap_or(&false))
            .collect())
    }

    async fn write_holding_16(&self, address: u16, value: u16) -> Result<(), RegisterError> {
        self.state.lock().await.holding.insert(address, value);
        Ok(())
    }

    async fn write_coil(&self, address: u16, value: bool) -> Result<(), RegisterError> {
        self.state.lock().await.coils.insert(address, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_decode_signed_values() {
        let sim = SimulatedRegisters::new();
        sim.set_input(13, -1550).await;
        assert_eq!(sim.read_input_16(13).await.unwrap(), -1550);
        assert_eq!(sim.read_input_16(99).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn holding_32_spans_two_registers() {
        let sim = SimulatedRegisters::new();
        sim.set_holding_32(1933, 123_456).await;
        assert_eq!(sim.read_holding_32(1933).await.unwrap(), 123_456);
    }

    #[tokio::test]
    async fn coil_writes_are_observable() {
        let sim = SimulatedRegisters::new();
        assert_eq!(sim.coil(9).await, None);
        sim.write_coil(9, true).await.unwrap();
        assert_eq!(sim.coil(9).await, Some(true));
    }
}
