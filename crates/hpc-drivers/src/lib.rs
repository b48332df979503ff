//! ---
//! hpc_section: "02-device-control"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Heat-pump family drivers."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! Device drivers for the supported heat-pump families.
//!
//! A [`Driver`] translates schedule directives and cloud settings into
//! register traffic for one device. The agent holds exactly one boxed
//! driver at a time and rebuilds it when the cloud changes the control
//! type or the device address.

mod dummy;
mod genesis;
mod gst;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use hpc_modbus::{Slave, TcpRegisterClient};
use hpc_types::{CloudConfig, ControlType, DeviceState, HeatCurve, MeterReading, ScheduleEntry};
use tracing::info;

pub use dummy::DummyDriver;
pub use genesis::GenesisDriver;
pub use gst::GstDriver;

/// One heat-pump family behind a register map.
///
/// Settings methods have unsupported defaults because only the Genesis
/// family exposes curve and season-stop registers; callers treat the
/// error as "nothing to report".
#[async_trait]
pub trait Driver: Send {
    /// Apply one schedule directive to the device.
    async fn reconcile(&mut self, entry: &ScheduleEntry) -> Result<()>;

    /// Read the full telemetry snapshot. Fails on the first register
    /// that cannot be read.
    async fn state(&mut self) -> Result<DeviceState>;

    /// Currently raised alarm descriptions, empty when the device has
    /// none (or the family exposes no alarm table).
    async fn alarms(&mut self) -> Result<Vec<String>>;

    async fn heat_curve(&mut self) -> Result<HeatCurve> {
        bail!("heat curve is not supported by this controller");
    }

    async fn set_heat_curve(&mut self, _curve: &HeatCurve) -> Result<()> {
        bail!("heat curve is not supported by this controller");
    }

    async fn heating_season_stop_temperature(&mut self) -> Result<f64> {
        bail!("heating season stop temperature is not supported by this controller");
    }

    async fn set_heating_season_stop_temperature(&mut self, _value: f64) -> Result<()> {
        bail!("heating season stop temperature is not supported by this controller");
    }

    /// Built-in energy meters, empty for families without any.
    async fn meter_readings(&mut self) -> Result<Vec<MeterReading>> {
        Ok(Vec::new())
    }
}

/// Build the driver selected by the cloud configuration.
pub fn build_driver(config: Arc<CloudConfig>) -> Box<dyn Driver> {
    info!(
        controller = %config.control_type,
        address = %config.address,
        "building driver"
    );
    match config.control_type {
        ControlType::ThermiaGenesis => {
            // Genesis gateways answer on the broadcast unit id only.
            let io = TcpRegisterClient::new(config.address.clone(), Slave(0xFF));
            Box::new(GenesisDriver::new(Box::new(io), config))
        }
        ControlType::HogforsGst => {
            let io = TcpRegisterClient::new(config.address.clone(), Slave(1));
            Box::new(GstDriver::new(Box::new(io), config))
        }
        ControlType::Dummy => Box::new(DummyDriver::new()),
    }
}
