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

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

/// Generic meter reading POSTed to `meter-v1`. Instantaneous values in
/// W/V/A, cumulative energy in Wh; zero-valued fields are omitted from
/// the payload (cloud contract).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterReading {
    pub id: String,
    pub model: String,
    pub time: DateTime<Utc>,
    #[serde(rename = "w", skip_serializing_if = "is_zero")]
    pub current_w: f64,
    #[serde(rename = "vll", skip_serializing_if = "is_zero")]
    pub current_vll: f64,
    #[serde(rename = "vln", skip_serializing_if = "is_zero")]
    pub current_vln: f64,
    #[serde(rename = "wh", skip_serializing_if = "is_zero")]
    pub total_wh: f64,
    #[serde(rename = "l1_a", skip_serializing_if = "is_zero")]
    pub l1_a: f64,
    #[serde(rename = "l2_a", skip_serializing_if = "is_zero")]
    pub l2_a: f64,
    #[serde(rename = "l3_a", skip_serializing_if = "is_zero")]
    pub l3_a: f64,
    #[serde(rename = "l1_v", skip_serializing_if = "is_zero")]
    pub l1_v: f64,
    #[serde(rename = "l2_v", skip_serializing_if = "is_zero")]
    pub l2_v: f64,
    #[serde(rename = "l3_v", skip_serializing_if = "is_zero")]
    pub l3_v: f64,
}

/// Latest externally ingested meter reading (MQTT path), shared
/// between the ingestion activity (writer) and the telemetry loop
/// (reader).
#[derive(Debug, Default)]
pub struct MeterCache {
    inner: RwLock<Option<MeterReading>>,
}

impl MeterCache {
    pub fn get(&self) -> Option<MeterReading> {
        self.inner.read().clone()
    }

    pub fn set(&self, reading: MeterReading) {
        *self.inner.write() = Some(reading);
    }
}

/// Externally defined JSON payload published by a p1ib P1-port bridge.
/// Only the fields consumed by the agent are declared; everything else
/// in the payload is ignored. Power and energy arrive in kW/kWh and
/// are converted to W/Wh on mapping.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct P1ibPayload {
    #[serde(rename = "p1ib_hourly_active_import_q1_q4")]
    pub hourly_active_import_kwh: f64,
    #[serde(rename = "p1ib_import_export")]
    pub import_export_kw: f64,
    #[serde(rename = "p1ib_current_l1")]
    pub current_l1: f64,
    #[serde(rename = "p1ib_current_l2")]
    pub current_l2: f64,
    #[serde(rename = "p1ib_current_l3")]
    pub current_l3: f64,
    #[serde(rename = "p1ib_voltage_l1")]
    pub voltage_l1: f64,
    #[serde(rename = "p1ib_voltage_l2")]
    pub voltage_l2: f64,
    #[serde(rename = "p1ib_voltage_l3")]
    pub voltage_l3: f64,
}

impl P1ibPayload {
    /// Map the payload into the generic meter reading shape under the
    /// configured primary id.
    pub fn into_reading(self, id: &str) -> MeterReading {
        MeterReading {
            id: id.to_owned(),
            model: "p1ib".to_owned(),
            time: Utc::now(),
            current_w: self.import_export_kw * 1000.0,
            total_wh: self.hourly_active_import_kwh * 1000.0,
            l1_a: self.current_l1,
            l2_a: self.current_l2,
            l3_a: self.current_l3,
            l1_v: self.voltage_l1,
            l2_v: self.voltage_l2,
            l3_v: self.voltage_l3,
            ..MeterReading::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fields_are_omitted() {
        let reading = MeterReading {
            id: "1000".into(),
            model: "hogforsgst_electric".into(),
            current_w: 1500.0,
            ..MeterReading::default()
        };
        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"w\":1500.0"));
        assert!(!json.contains("\"wh\""));
        assert!(!json.contains("\"l1_a\""));
    }

    #[test]
    fn p1ib_payload_maps_to_reading() {
        let payload: P1ibPayload = serde_json::from_str(
            r#"{
                "p1ib_import_export": 1.5,
                "p1ib_hourly_active_import_q1_q4": 2.25,
                "p1ib_current_l1": 4.2,
                "p1ib_voltage_l2": 231.0,
                "p1ib_firmware": "1.0.0",
                "p1ib_rssi": "-60"
            }"#,
        )
        .unwrap();
        let reading = payload.into_reading("1");
        assert_eq!(reading.model, "p1ib");
        assert_eq!(reading.current_w, 1500.0);
        assert_eq!(reading.total_wh, 2250.0);
        assert_eq!(reading.l1_a, 4.2);
        assert_eq!(reading.l2_v, 231.0);
        assert_eq!(reading.l3_v, 0.0);
    }
}
