//! ---
//! hpc_section: "02-device-control"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Heat-pump family drivers."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! Driver for the GST district-exchange family.
//!
//! The device has no enable coils; blocking it means switching on the
//! external-control register and forcing a supply setpoint low enough
//! that the pump never starts. The allow decision divides the current
//! electricity price by a running COP average sampled from the device
//! itself.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use hpc_modbus::RegisterIo;
use hpc_types::{CloudConfig, DeviceState, MeterReading, ScheduleEntry};
use tracing::{debug, info, warn};

use crate::Driver;

// Register numbers in the vendor list are 1-based.
const REG_EXTERNAL_CONTROL: u16 = 4031 - 1;
const REG_EXTERNAL_SETPOINT: u16 = 4051 - 1;

/// Supply setpoint in °C low enough to keep the heat pump off.
const OFF_SETPOINT: u16 = 20;

/// 1200 samples at the 30 second telemetry cadence is 10 hours.
const COP_WINDOW: usize = 1200;
/// Standard COP assumed until real samples arrive.
const COP_SEED: f64 = 3.5;
/// Averages below this are treated as measurement noise.
const COP_FLOOR: f64 = 2.0;

/// Ring of recent COP samples. Seeded with one standard value so the
/// average is defined from the first reconcile.
struct CopHistory {
    samples: Vec<Option<f64>>,
    cursor: usize,
}

impl CopHistory {
    fn new(capacity: usize, seed: f64) -> Self {
        let mut samples = vec![None; capacity];
        samples[0] = Some(seed);
        Self { samples, cursor: 1 }
    }

    fn record(&mut self, cop: f64) {
        self.samples[self.cursor] = Some(cop);
        self.cursor = (self.cursor + 1) % self.samples.len();
    }

    /// Mean over the populated slots only.
    fn average(&self) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for sample in self.samples.iter().flatten() {
            sum += sample;
            count += 1;
        }
        sum / count as f64
    }
}

pub struct GstDriver {
    io: Box<dyn RegisterIo>,
    config: Arc<CloudConfig>,
    cop_history: CopHistory,

    heating_allowed: bool,
    hotwater_allowed: bool,
}

impl GstDriver {
    pub fn new(io: Box<dyn RegisterIo>, config: Arc<CloudConfig>) -> Self {
        Self {
            io,
            config,
            cop_history: CopHistory::new(COP_WINDOW, COP_SEED),
            heating_allowed: false,
            hotwater_allowed: false,
        }
    }

    async fn holding(&self, address: u16) -> Result<f64> {
        Ok(self.io.read_holding_16(address).await? as f64)
    }

    async fn holding_32(&self, address: u16) -> Result<f64> {
        Ok(self.io.read_holding_32(address).await? as f64)
    }

    fn heat_pump_allowed(&self, price: f64) -> bool {
        let average = self.cop_history.average();
        let cop = if average < COP_FLOOR {
            warn!(average, "gst: average COP below floor, clamping");
            COP_FLOOR
        } else {
            average
        };
        let allow = price / cop < self.config.district_heating_price;
        info!(
            cop = average,
            price,
            district_price = self.config.district_heating_price,
            allow,
            "gst: heat pump economics"
        );
        allow
    }
}

#[async_trait]
impl Driver for GstDriver {
    async fn reconcile(&mut self, entry: &ScheduleEntry) -> Result<()> {
        if !self.heat_pump_allowed(entry.price) {
            self.heating_allowed = false;
            self.hotwater_allowed = false;
            self.io.write_holding_16(REG_EXTERNAL_CONTROL, 1).await?;
            self.io
                .write_holding_16(REG_EXTERNAL_SETPOINT, OFF_SETPOINT)
                .await?;
            return Ok(());
        }

        self.heating_allowed = true;
        self.hotwater_allowed = true;
        // Hand control back to the device's own curve.
        self.io.write_holding_16(REG_EXTERNAL_CONTROL, 0).await?;
        Ok(())
    }

    async fn state(&mut self) -> Result<DeviceState> {
        let mut state = DeviceState {
            time: Utc::now(),
            ..DeviceState::default()
        };

        state.brine_in = Some(self.holding(551).await? / 10.0);
        state.brine_out = Some(self.holding(553).await? / 10.0);
        state.heat_carrier_forward = Some(self.holding(555).await? / 10.0);
        state.pump_brine = Some(self.holding(563).await?);
        state.radiator_forward = Some(self.holding(283).await? / 10.0);
        state.radiator_return = Some(self.holding(281).await? / 10.0);
        state.outdoor = Some(self.holding(275).await? / 10.0);

        let gear = self.holding(565).await? / 10.0;
        // The compressor has 10 gears.
        let speed = gear / 10.0 * 100.0;
        state.compressor = Some(speed);

        state.heating_allowed = Some(self.heating_allowed);
        state.hotwater_allowed = Some(self.hotwater_allowed);

        let cop = self.holding(408).await? / 10.0;
        state.cop = Some(cop);
        if speed > 0.0 {
            // An idle pump reads COP 0, keep it out of the average.
            self.cop_history.record(cop);
        }

        Ok(state)
    }

    async fn alarms(&mut self) -> Result<Vec<String>> {
        // The GST register list exposes no alarm table over this
        // interface.
        Ok(Vec::new())
    }

    async fn meter_readings(&mut self) -> Result<Vec<MeterReading>> {
        let now = Utc::now();

        let mut electricity = MeterReading {
            id: "1000".to_owned(),
            model: "hogforsgst_electric".to_owned(),
            time: now,
            ..MeterReading::default()
        };
        electricity.current_w = self.holding_32(1935).await? / 10.0 * 1000.0; // kW
        let total = self.holding_32(1933).await?; // kWh
        if total == 0.0 {
            bail!("got zero cumulative energy from holding register 1933");
        }
        electricity.total_wh = total / 10.0 * 1000.0;

        let mut heat = MeterReading {
            id: "1001".to_owned(),
            model: "hogforsgst_heat".to_owned(),
            time: now,
            ..MeterReading::default()
        };
        heat.current_w = self.holding_32(974).await? / 10.0 * 1000.0; // kW
        let total = self.holding_32(1603).await?; // MWh
        if total == 0.0 {
            bail!("got zero cumulative energy from holding register 1603");
        }
        heat.total_wh = total / 100.0 * 1_000_000.0;

        let mut hot_gas = MeterReading {
            id: "1002".to_owned(),
            model: "hogforsgst_heat_hgw".to_owned(),
            time: now,
            ..MeterReading::default()
        };
        hot_gas.current_w = self.holding_32(970).await? / 10.0 * 1000.0; // kW
        let total = self.holding_32(972).await?; // MWh
        if total == 0.0 {
            bail!("got zero cumulative energy from holding register 972");
        }
        hot_gas.total_wh = total / 100.0 * 1_000_000.0;

        debug!(
            electricity_w = electricity.current_w,
            heat_w = heat.current_w,
            hot_gas_w = hot_gas.current_w,
            "gst: meter readings"
        );
        Ok(vec![electricity, heat, hot_gas])
    }
}
