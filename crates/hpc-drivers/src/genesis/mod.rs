//! ---
//! hpc_section: "02-device-control"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Heat-pump family drivers."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! Driver for the Genesis ground-source family.
//!
//! Heating and hot water are gated through two enable coils; setpoints
//! and the heat curve live in holding registers scaled by 100. The
//! comfort wheel register doubles as the curve adjust: the factory
//! baseline is 20 °C and the wheel offset from it shifts the whole
//! curve.

mod catalog;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use hpc_modbus::RegisterIo;
use hpc_types::{CloudConfig, DeviceState, HeatCurve, ScheduleEntry};
use tracing::{debug, info};

use crate::Driver;

const REG_COMFORT_WHEEL: u16 = 5;
const REG_HEAT_CURVE: u16 = 6; // 7 consecutive registers, coldest point first
const REG_SEASON_STOP: u16 = 16;
const REG_HOT_WATER_START: u16 = 22;
const REG_HOT_WATER_STOP: u16 = 23;

const COIL_TAP_WATER: u16 = 8;
const COIL_HEATING: u16 = 9;

/// Comfort wheel factory setting; the offset from it is the curve
/// adjust.
const COMFORT_WHEEL_BASELINE: f64 = 20.0;

/// Discrete inputs 0..202 cover the whole alarm table.
const ALARM_BITS: u16 = 203;

/// Linear COP model against the heat-carrier forward temperature,
/// anchored at 3.45 for a 60 °C forward.
const COP_BASE: f64 = 3.45;
const COP_PER_DEGREE: f64 = 0.098;

pub struct GenesisDriver {
    io: Box<dyn RegisterIo>,
    config: Arc<CloudConfig>,

    /// Last heat-carrier forward reading, 0.0 until the first
    /// successful state fetch. Feeds the COP estimate.
    heat_carrier_forward: f64,

    heating_allowed: bool,
    hotwater_allowed: bool,
}

impl GenesisDriver {
    pub fn new(io: Box<dyn RegisterIo>, config: Arc<CloudConfig>) -> Self {
        Self {
            io,
            config,
            heat_carrier_forward: 0.0,
            heating_allowed: false,
            hotwater_allowed: false,
        }
    }

    async fn input(&self, address: u16) -> Result<f64> {
        Ok(self.io.read_input_16(address).await? as f64)
    }

    async fn holding(&self, address: u16) -> Result<f64> {
        Ok(self.io.read_holding_16(address).await? as f64)
    }

    /// Write the hot-water start/stop window for the requested mode.
    /// Unconfigured setpoints would write 0 °C and block hot water
    /// entirely, so they are an error instead.
    async fn write_hot_water_setpoints(&mut self, boost: bool) -> Result<()> {
        let (start, stop) = self.config.hot_water_setpoints(boost);
        if start == 0 || stop == 0 {
            bail!("hot water setpoints are not configured (start {start}, stop {stop})");
        }
        self.io
            .write_holding_16(REG_HOT_WATER_START, (start * 100) as u16)
            .await?;
        self.io
            .write_holding_16(REG_HOT_WATER_STOP, (stop * 100) as u16)
            .await?;
        Ok(())
    }

    fn estimated_cop(&self) -> f64 {
        COP_BASE + COP_PER_DEGREE * (60.0 - self.heat_carrier_forward)
    }

    /// Whether running the heat pump beats buying district heat at the
    /// given electricity price. Without a forward reading the COP is
    /// unknown and the pump is allowed to run.
    fn heat_pump_cheaper(&self, price: f64) -> bool {
        if self.heat_carrier_forward == 0.0 {
            return true;
        }
        let cop = self.estimated_cop();
        let allow = price / cop < self.config.district_heating_price;
        info!(
            cop,
            price,
            district_price = self.config.district_heating_price,
            allow,
            "genesis: heat pump economics"
        );
        allow
    }
}

/// Decode raw curve registers into setpoints, backing out the adjust
/// already baked into the device values.
fn decode_curve_points(words: &[u16], adjust: f64) -> [f64; HeatCurve::POINTS] {
    let mut points = [0.0; HeatCurve::POINTS];
    for (point, word) in points.iter_mut().zip(words) {
        *point = f64::from(*word as i16) / 100.0 - adjust;
    }
    points
}

#[async_trait]
impl Driver for GenesisDriver {
    async fn reconcile(&mut self, entry: &ScheduleEntry) -> Result<()> {
        self.write_hot_water_setpoints(entry.hotwater_force).await?;

        let (heating, hotwater) = if self.config.district_heating_price == 0.0 {
            // No district heating to compare against, follow the
            // schedule flags as delivered.
            (entry.heating, entry.hotwater)
        } else {
            let allow = self.heat_pump_cheaper(entry.price);
            (allow, allow)
        };

        self.io.write_coil(COIL_HEATING, heating).await?;
        self.io.write_coil(COIL_TAP_WATER, hotwater).await?;
        self.heating_allowed = heating;
        self.hotwater_allowed = hotwater;
        debug!(heating, hotwater, "genesis: reconciled");
        Ok(())
    }

    async fn state(&mut self) -> Result<DeviceState> {
        let mut state = DeviceState {
            time: Utc::now(),
            ..DeviceState::default()
        };

        state.brine_in = Some(self.input(10).await? / 100.0);
        state.brine_out = Some(self.input(11).await? / 100.0);
        state.radiator_return = Some(self.input(12).await? / 100.0);
        state.outdoor = Some(self.input(13).await? / 100.0);
        state.radiator_forward = Some(self.input(15).await? / 100.0);
        state.warm_water = Some(self.input(17).await? / 100.0);
        state.hot_gas_compressor = Some(self.input(6).await? / 100.0);

        let forward = self.input(7).await? / 100.0;
        state.heat_carrier_forward = Some(forward);
        state.heat_carrier_return = Some(self.input(8).await? / 100.0);

        state.super_heat_temperature = Some(self.input(29).await? / 100.0);
        state.suction_gas_temperature = Some(self.input(30).await? / 100.0);
        state.low_pressure_side_pressure = Some(self.input(31).await? / 100.0);
        state.high_pressure_side_pressure = Some(self.input(32).await? / 100.0);

        state.pump_heat = Some(self.input(39).await? / 100.0);
        state.pump_brine = Some(self.input(40).await? / 100.0);
        state.pump_radiator = Some(self.input(41).await? / 100.0);
        state.compressor = Some(self.input(54).await? / 100.0);
        state.indoor = Some(self.input(131).await? / 100.0);
        state.indoor_setpoint = Some(self.holding(REG_COMFORT_WHEEL).await? / 100.0);

        state.heating_allowed = Some(self.heating_allowed);
        state.hotwater_allowed = Some(self.hotwater_allowed);

        self.heat_carrier_forward = forward;
        Ok(state)
    }

    async fn alarms(&mut self) -> Result<Vec<String>> {
        let bits = self.io.read_discrete_block(0, ALARM_BITS).await?;
        let mut active = Vec::new();
        for (position, description) in catalog::ALARMS {
            if bits.get(*position).copied().unwrap_or(false) {
                active.push((*description).to_owned());
            }
        }
        Ok(active)
    }

    async fn heat_curve(&mut self) -> Result<HeatCurve> {
        let wheel = self.holding(REG_COMFORT_WHEEL).await? / 100.0;
        let adjust = wheel - COMFORT_WHEEL_BASELINE;
        let words = self
            .io
            .read_holding_block(REG_HEAT_CURVE, HeatCurve::POINTS as u16)
            .await?;
        Ok(HeatCurve {
            points: decode_curve_points(&words, adjust),
            adjust,
        })
    }

    async fn set_heat_curve(&mut self, curve: &HeatCurve) -> Result<()> {
        info!(adjust = curve.adjust, "genesis: writing heat curve");
        let wheel = (COMFORT_WHEEL_BASELINE + curve.adjust) * 100.0;
        self.io
            .write_holding_16(REG_COMFORT_WHEEL, wheel.round() as u16)
            .await?;
        for (offset, point) in curve.points.iter().enumerate() {
            let raw = ((point + curve.adjust) * 100.0).round() as u16;
            self.io
                .write_holding_16(REG_HEAT_CURVE + offset as u16, raw)
                .await?;
        }
        Ok(())
    }

    async fn heating_season_stop_temperature(&mut self) -> Result<f64> {
        Ok(self.holding(REG_SEASON_STOP).await? / 100.0)
    }

    async fn set_heating_season_stop_temperature(&mut self, value: f64) -> Result<()> {
        info!(value, "genesis: writing heating season stop temperature");
        self.io
            .write_holding_16(REG_SEASON_STOP, (value * 100.0).round() as u16)
            .await?;
        Ok(())
    }
}
