//! ---
//! hpc_section: "03-cloud-synchronization"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Cloud API data model shared across the agent."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Telemetry snapshot POSTed to `metrics-v1`. Every field is optional
/// because the two heat-pump families expose disjoint register sets;
/// absent values are omitted from the JSON payload entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceState {
    pub time: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub indoor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdoor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heat_carrier_forward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heat_carrier_return: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radiator_forward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radiator_return: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brine_in: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brine_out: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot_gas_compressor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warm_water: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_valve: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pump_brine: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pump_heat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pump_radiator: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_heat_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suction_gas_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_pressure_side_pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_pressure_side_pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indoor_setpoint: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub heating_allowed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotwater_allowed: Option<bool>,
}

/// Last-known device state, shared between the telemetry loop (writer)
/// and the reconcile loop (reader of the indoor temperature for the
/// minimum-indoor safety override).
#[derive(Debug, Default)]
pub struct StateCache {
    inner: RwLock<Option<DeviceState>>,
}

impl StateCache {
    pub fn get(&self) -> Option<DeviceState> {
        self.inner.read().clone()
    }

    pub fn set(&self, state: DeviceState) {
        *self.inner.write() = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_omitted() {
        let state = DeviceState {
            outdoor: Some(-15.5),
            heating_allowed: Some(true),
            ..DeviceState::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"outdoor\":-15.5"));
        assert!(json.contains("\"heatingAllowed\":true"));
        assert!(!json.contains("indoor"));
        assert!(!json.contains("cop"));
    }

    #[test]
    fn cache_roundtrip() {
        let cache = StateCache::default();
        assert!(cache.get().is_none());
        cache.set(DeviceState {
            indoor: Some(19.5),
            ..DeviceState::default()
        });
        assert_eq!(cache.get().unwrap().indoor, Some(19.5));
    }
}
