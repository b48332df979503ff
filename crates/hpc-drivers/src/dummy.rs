//! ---
//! hpc_section: "02-device-control"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Heat-pump family drivers."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! No-op driver used when no real device is configured. Remembers what
//! it was told so the control loops behave normally end to end.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use hpc_types::{DeviceState, HeatCurve, ScheduleEntry};
use tracing::info;

use crate::Driver;

#[derive(Default)]
pub struct DummyDriver {
    last_entry: Option<ScheduleEntry>,
    heat_curve: Option<HeatCurve>,
    heating_season_stop_temperature: f64,
}

impl DummyDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for DummyDriver {
    async fn reconcile(&mut self, entry: &ScheduleEntry) -> Result<()> {
        info!(
            heating = entry.heating,
            hotwater = entry.hotwater,
            hotwater_force = entry.hotwater_force,
            price = entry.price,
            "dummy: reconciled"
        );
        self.last_entry = Some(entry.clone());
        Ok(())
    }

    async fn state(&mut self) -> Result<DeviceState> {
        Ok(DeviceState {
            time: Utc::now(),
            heating_allowed: self.last_entry.as_ref().map(|entry| entry.heating),
            hotwater_allowed: self.last_entry.as_ref().map(|entry| entry.hotwater),
            ..DeviceState::default()
        })
    }

    async fn alarms(&mut self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn heat_curve(&mut self) -> Result<HeatCurve> {
        Ok(self.heat_curve.clone().unwrap_or(HeatCurve {
            points: [0.0; HeatCurve::POINTS],
            adjust: 0.0,
        }))
    }

    async fn set_heat_curve(&mut self, curve: &HeatCurve) -> Result<()> {
        self.heat_curve = Some(curve.clone());
        Ok(())
    }

    async fn heating_season_stop_temperature(&mut self) -> Result<f64> {
        Ok(self.heating_season_stop_temperature)
    }

    async fn set_heating_season_stop_temperature(&mut self, value: f64) -> Result<()> {
        self.heating_season_stop_temperature = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remembers_last_directive() {
        let mut dummy = DummyDriver::new();
        assert_eq!(dummy.state().await.unwrap().heating_allowed, None);

        dummy
            .reconcile(&ScheduleEntry {
                time: Utc::now(),
                price: 0.417,
                heating: true,
                hotwater: false,
                hotwater_force: false,
            })
            .await
            .unwrap();

        let state = dummy.state().await.unwrap();
        assert_eq!(state.heating_allowed, Some(true));
        assert_eq!(state.hotwater_allowed, Some(false));
    }

    #[tokio::test]
    async fn settings_roundtrip() {
        let mut dummy = DummyDriver::new();
        let curve = HeatCurve {
            points: [19.0, 26.0, 31.0, 35.0, 38.0, 45.0, 52.0],
            adjust: 1.0,
        };
        dummy.set_heat_curve(&curve).await.unwrap();
        assert_eq!(dummy.heat_curve().await.unwrap(), curve);

        dummy.set_heating_season_stop_temperature(13.0).await.unwrap();
        assert_eq!(dummy.heating_season_stop_temperature().await.unwrap(), 13.0);
    }
}
