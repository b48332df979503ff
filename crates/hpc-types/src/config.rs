//! ---
//! hpc_section: "03-cloud-synchronization"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Cloud API data model shared across the agent."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Heat-pump family selector delivered by the cloud. Picks both the
/// register map and the economic-control strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ControlType {
    ThermiaGenesis,
    HogforsGst,
    #[default]
    Dummy,
}

/// One configured auxiliary meter: how to reach it and which decoder
/// applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeterDescriptor {
    pub interface_type: String,
    pub model: String,
    #[serde(rename = "primaryId")]
    pub primary_id: String,
    pub address: String,
}

/// Device configuration owned by the cloud. Replaced atomically as a
/// whole on sync; drivers receive a shared reference and never mutate
/// it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudConfig {
    pub controller_id: String,

    #[serde(rename = "heatControlType")]
    pub control_type: ControlType,
    pub address: String,
    pub district_heating_price: f64,

    pub hot_water_boost_start_temperature: i64,
    pub hot_water_boost_stop_temperature: i64,
    pub hot_water_normal_start_temperature: i64,
    pub hot_water_normal_stop_temperature: i64,

    pub allowed_min_indoor_temp: f64,
    pub allowed_max_indoor_temp: f64,
    pub allowed_min_hot_water_temp: f64,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub meters: Vec<MeterDescriptor>,

    pub heat_curve_adjust: f64,
    pub heat_curve_control_enabled: bool,
    pub heat_curve: Vec<f64>,
    pub heating_season_stop_temperature: f64,
}

impl CloudConfig {
    /// Whether swapping from `old` to `new` requires tearing down and
    /// rebuilding the active driver. Only the control type and the
    /// device address matter; everything else is consumed in place.
    pub fn needs_driver_rebuild(old: Option<&CloudConfig>, new: &CloudConfig) -> bool {
        match old {
            None => true,
            Some(old) => old.control_type != new.control_type || old.address != new.address,
        }
    }

    /// The hot-water start/stop setpoint pair for the requested mode.
    pub fn hot_water_setpoints(&self, boost: bool) -> (i64, i64) {
        if boost {
            (
                self.hot_water_boost_start_temperature,
                self.hot_water_boost_stop_temperature,
            )
        } else {
            (
                self.hot_water_normal_start_temperature,
                self.hot_water_normal_stop_temperature,
            )
        }
    }
}

/// A 7-point outdoor-temperature to supply-setpoint curve plus the
/// scalar adjust offset, as exchanged with both the cloud and the
/// device drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatCurve {
    pub points: [f64; 7],
    pub adjust: f64,
}

impl HeatCurve {
    pub const POINTS: usize = 7;

    /// Build a curve from a cloud-supplied slice. Returns `None` when
    /// the cloud did not deliver a complete 7-point curve.
    pub fn from_slice(points: &[f64], adjust: f64) -> Option<Self> {
        let points: [f64; 7] = points.try_into().ok()?;
        Some(Self { points, adjust })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&ControlType::ThermiaGenesis).unwrap(),
            "\"thermiagenesis\""
        );
        assert_eq!(
            serde_json::from_str::<ControlType>("\"hogforsgst\"").unwrap(),
            ControlType::HogforsGst
        );
        assert_eq!(ControlType::Dummy.to_string(), "dummy");
    }

    #[test]
    fn cloud_config_tolerates_unknown_and_missing_fields() {
        let config: CloudConfig = serde_json::from_str(
            r#"{
                "controllerId": "88e7f9b7",
                "heatControlType": "thermiagenesis",
                "address": "10.0.0.1:502",
                "hotWaterBoostStartTemperature": 52,
                "hotWaterBoostStopTemperature": 58,
                "consideredCheap": 0,
                "levelFormula": ""
            }"#,
        )
        .unwrap();
        assert_eq!(config.control_type, ControlType::ThermiaGenesis);
        assert_eq!(config.hot_water_setpoints(true), (52, 58));
        assert_eq!(config.hot_water_setpoints(false), (0, 0));
        assert!(config.meters.is_empty());
    }

    #[test]
    fn driver_rebuild_only_on_identity_change() {
        let old = CloudConfig {
            control_type: ControlType::HogforsGst,
            address: "10.0.0.1:502".into(),
            ..CloudConfig::default()
        };
        let mut new = old.clone();
        new.district_heating_price = 0.8;
        assert!(!CloudConfig::needs_driver_rebuild(Some(&old), &new));

        new.address = "10.0.0.2:502".into();
        assert!(CloudConfig::needs_driver_rebuild(Some(&old), &new));
        assert!(CloudConfig::needs_driver_rebuild(None, &old));
    }

    #[test]
    fn heat_curve_requires_seven_points() {
        assert!(HeatCurve::from_slice(&[19.0, 26.0, 31.0, 35.0, 38.0, 45.0, 52.0], 0.0).is_some());
        assert!(HeatCurve::from_slice(&[19.0, 26.0], 0.0).is_none());
        assert!(HeatCurve::from_slice(&[], 0.0).is_none());
    }
}
