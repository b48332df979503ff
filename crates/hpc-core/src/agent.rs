//! ---
//! hpc_section: "01-core-functionality"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Core agent orchestration."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{TimeDelta, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info};

use hpc_cloud::{
    retry_channel, run_cloud_retry_worker, CloudClient, CloudError, RetrySender, ALARMS_PATH,
    ALARM_PATH, CONFIG_PATH, DEFAULT_QUEUE_CAPACITY, METER_PATH, METRICS_PATH, REFETCH_CONFIG,
};
use hpc_common::config::{load_serial, load_token, persist_token, AgentConfig};
use hpc_common::time::until_next_quarter;
use hpc_drivers::{build_driver, Driver};
use hpc_modbus::{RegisterIo, Slave, TcpRegisterClient};
use hpc_types::{
    CloudConfig, DeviceState, HeatCurve, MeterCache, MeterDescriptor, MeterReading, P1ibPayload,
    Schedule, ScheduleEntry, StateCache,
};

use crate::alarm::ActiveAlarms;

const TELEMETRY_PERIOD: Duration = Duration::from_secs(30);
const SCHEDULE_REFRESH_PERIOD: Duration = Duration::from_secs(6 * 60 * 60);
const TOKEN_REFRESH_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
enum TelemetryError {
    /// The device did not answer; distinct from cloud failures because
    /// it triggers a config re-sync (the device may have been moved).
    #[error("fetching device state: {0}")]
    Device(anyhow::Error),
    #[error(transparent)]
    Delivery(#[from] CloudError),
}

/// Device settings pushed up to the cloud at startup so the UI shows
/// what the pump actually runs with.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    heat_curve: Option<[f64; HeatCurve::POINTS]>,
    heat_curve_adjust: f64,
    #[serde(skip_serializing_if = "unconfigured")]
    heating_season_stop_temperature: f64,
}

fn unconfigured(value: &f64) -> bool {
    *value == 0.0
}

pub struct Agent {
    cloud: Arc<CloudClient>,
    retry: RetrySender,

    /// Replaced as a whole on cloud sync. Drivers keep the snapshot
    /// they were built with until a rebuild.
    config: RwLock<Arc<CloudConfig>>,
    schedule: parking_lot::Mutex<Schedule>,
    driver: Mutex<Box<dyn Driver>>,

    state_cache: StateCache,
    meter_cache: MeterCache,
    active_alarms: ActiveAlarms,

    token_file: PathBuf,
}

/// Running agent; dropping it does not stop the tasks, call
/// [`AgentHandle::shutdown`].
pub struct AgentHandle {
    agent: Arc<Agent>,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    pub fn agent(&self) -> Arc<Agent> {
        self.agent.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl Agent {
    /// Full startup: identity files, initial configuration, schedule,
    /// driver and first reconcile, then the background tasks.
    pub async fn start(cli: AgentConfig) -> Result<AgentHandle> {
        let token = load_token(&cli.token_file)?.unwrap_or_default();
        let serial = load_serial(&cli.serial_file)?;
        let cloud = Arc::new(CloudClient::new(&cli.server, token, serial)?);

        let initial = match cli.controller_override() {
            Some((control_type, address)) => {
                info!(%control_type, address, "using controller from command line");
                CloudConfig {
                    control_type,
                    address: address.to_owned(),
                    ..CloudConfig::default()
                }
            }
            None => cloud
                .fetch_config(None)
                .await
                .context("fetching initial configuration")?,
        };
        let initial = Arc::new(initial);

        let (retry, retry_rx) = retry_channel(DEFAULT_QUEUE_CAPACITY);
        let (shutdown, _) = broadcast::channel(16);

        let agent = Arc::new(Agent {
            cloud: cloud.clone(),
            retry: retry.clone(),
            config: RwLock::new(initial.clone()),
            schedule: parking_lot::Mutex::new(Schedule::new()),
            driver: Mutex::new(build_driver(initial)),
            state_cache: StateCache::default(),
            meter_cache: MeterCache::default(),
            active_alarms: ActiveAlarms::default(),
            token_file: cli.token_file.clone(),
        });

        agent.schedule_tick().await;
        agent.reconcile_tick().await;
        agent.send_current_settings().await;

        let tasks = vec![
            tokio::spawn(Agent::control_loop(agent.clone(), shutdown.subscribe())),
            tokio::spawn(run_cloud_retry_worker(
                cloud,
                retry_rx,
                retry,
                shutdown.subscribe(),
            )),
        ];

        Ok(AgentHandle {
            agent,
            shutdown,
            tasks,
        })
    }

    /// Single-task dispatch of all periodic work. The reconcile timer
    /// is re-armed to the next wall-clock quarter boundary after each
    /// fire so reconciliation tracks schedule windows, not process
    /// uptime.
    async fn control_loop(agent: Arc<Agent>, mut shutdown: broadcast::Receiver<()>) {
        agent.telemetry_tick().await;

        let mut telemetry = interval_at(Instant::now() + TELEMETRY_PERIOD, TELEMETRY_PERIOD);
        let mut schedule_refresh = interval_at(
            Instant::now() + SCHEDULE_REFRESH_PERIOD,
            SCHEDULE_REFRESH_PERIOD,
        );
        let mut token_refresh =
            interval_at(Instant::now() + TOKEN_REFRESH_PERIOD, TOKEN_REFRESH_PERIOD);

        let first_delay = until_next_quarter(Utc::now());
        debug!(?first_delay, "scheduling first reconcile");
        let reconcile_at = sleep(first_delay);
        tokio::pin!(reconcile_at);

        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = telemetry.tick() => {
                    agent.telemetry_tick().await;
                    agent.alarm_tick().await;
                }
                () = &mut reconcile_at => {
                    reconcile_at
                        .as_mut()
                        .reset(Instant::now() + until_next_quarter(Utc::now()));
                    agent.reconcile_tick().await;
                }
                _ = schedule_refresh.tick() => agent.schedule_tick().await,
                _ = token_refresh.tick() => agent.token_tick().await,
            }
        }
    }

    pub async fn reconcile_tick(&self) {
        if let Err(err) = self.reconcile().await {
            error!(error = %err, "reconcile failed");
        }
    }

    async fn telemetry_tick(&self) {
        self.send_meter_values().await;
        if let Err(err) = self.send_metrics().await {
            error!(error = %err, "sending metrics");
            if matches!(err, TelemetryError::Device(_)) {
                // The device may answer on a new address; pick up
                // fresh config instead of reconnecting forever.
                if let Err(err) = self.sync_cloud_config(None).await {
                    error!(error = %err, "syncing cloud config after state failure");
                }
            }
        }
    }

    async fn alarm_tick(&self) {
        if let Err(err) = self.send_alarms().await {
            error!(error = %err, "sending alarms");
        }
    }

    async fn schedule_tick(&self) {
        if let Err(err) = self.update_schedule().await {
            error!(error = %err, "updating schedule");
        }
    }

    async fn token_tick(&self) {
        if let Err(err) = self.refresh_token().await {
            error!(error = %err, "refreshing token");
        }
    }

    /// Feed an externally received p1ib payload into the meter cache,
    /// keyed by the configured meter id.
    pub fn ingest_p1ib(&self, payload: P1ibPayload) {
        let config = self.config.read().clone();
        let Some(meter) = config
            .meters
            .iter()
            .find(|meter| meter.interface_type == "mqtt" && meter.model == "p1ib")
        else {
            debug!("p1ib payload received but no mqtt p1ib meter configured");
            return;
        };
        self.meter_cache.set(payload.into_reading(&meter.primary_id));
    }

    async fn reconcile(&self) -> Result<()> {
        debug!("reconcile heat pump");
        let entry = {
            let schedule = self.schedule.lock();
            schedule.current().cloned()
        };
        let Some(mut entry) = entry else {
            bail!("no current schedule entry");
        };

        let config = self.config.read().clone();
        apply_safety_overrides(&mut entry, self.state_cache.get().as_ref(), &config);

        let mut driver = self.driver.lock().await;
        driver.reconcile(&entry).await
    }

    async fn send_metrics(&self) -> Result<(), TelemetryError> {
        let mut state = {
            let mut driver = self.driver.lock().await;
            driver.state().await.map_err(TelemetryError::Device)?
        };
        state.time = Utc::now();

        // A cache entry with indoor but no outdoor came from an
        // external indoor meter, not from the device; fold it in.
        if let Some(cached) = self.state_cache.get() {
            if cached.indoor.is_some() && cached.outdoor.is_none() {
                state.indoor = cached.indoor;
            }
        }
        self.state_cache.set(state.clone());

        let refetch = self
            .cloud
            .post_with_retry(METRICS_PATH, &state, &self.retry)
            .await?;
        self.handle_refetch(&refetch).await;
        Ok(())
    }

    async fn send_alarms(&self) -> Result<()> {
        let alarms = {
            let mut driver = self.driver.lock().await;
            driver.alarms().await?
        };

        if alarms.is_empty() {
            if self.active_alarms.clear() {
                self.cloud.delete(ALARMS_PATH).await?;
            }
            return Ok(());
        }

        for alarm in alarms {
            if !self.active_alarms.add(&alarm) {
                continue;
            }
            info!(alarm, "delivering newly raised alarm");
            if let Err(err) = self.cloud.post(ALARM_PATH, &alarm).await {
                error!(alarm, error = %err, "delivering alarm");
            }
        }
        Ok(())
    }

    /// Collect and deliver meter readings: the driver's built-in
    /// meters first, then the externally configured ones.
    async fn send_meter_values(&self) {
        let readings = {
            let mut driver = self.driver.lock().await;
            driver.meter_readings().await
        };
        match readings {
            Ok(readings) => {
                for reading in readings {
                    self.deliver_meter(reading).await;
                }
            }
            Err(err) => error!(error = %err, "fetching driver meter readings"),
        }

        let config = self.config.read().clone();
        for meter in &config.meters {
            match meter.interface_type.as_str() {
                "mqtt" => {
                    if meter.model != "p1ib" {
                        continue;
                    }
                    match self.meter_cache.get() {
                        Some(reading) => self.deliver_meter(reading).await,
                        None => debug!(
                            id = %meter.primary_id,
                            "no ingested reading for p1ib meter yet"
                        ),
                    }
                }
                "modbus-tcp" => {
                    if meter.model != "holdingreg-10scale-16bit" {
                        continue;
                    }
                    self.read_indoor_meter(meter).await;
                }
                other => {
                    debug!(interface = other, id = %meter.primary_id, "meter handled externally");
                }
            }
        }
    }

    async fn deliver_meter(&self, reading: MeterReading) {
        match self
            .cloud
            .post_with_retry(METER_PATH, &reading, &self.retry)
            .await
        {
            Ok(refetch) => self.handle_refetch(&refetch).await,
            Err(err) => {
                error!(model = %reading.model, id = %reading.id, error = %err, "delivering meter reading");
            }
        }
    }

    /// One-shot read of an external indoor thermometer exposed as a
    /// single holding register scaled by 10. The value only seeds the
    /// state cache; it reaches the cloud inside the next metrics POST.
    async fn read_indoor_meter(&self, meter: &MeterDescriptor) {
        let address = match meter.primary_id.parse::<u16>() {
            Ok(address) => address,
            Err(_) => {
                error!(id = %meter.primary_id, "indoor meter register id is not numeric");
                return;
            }
        };
        let client = TcpRegisterClient::new(meter.address.clone(), Slave(0xFF));
        match client.read_holding_16(address).await {
            Ok(raw) => {
                self.state_cache.set(DeviceState {
                    indoor: Some(raw as f64 / 10.0),
                    ..DeviceState::default()
                });
            }
            Err(err) => {
                error!(address = %meter.address, id = %meter.primary_id, error = %err, "reading external indoor meter");
            }
        }
    }

    async fn update_schedule(&self) -> Result<(), CloudError> {
        let retention = TimeDelta::hours(24);
        match self.cloud.fetch_schedule().await {
            Ok(response) => {
                {
                    let mut schedule = self.schedule.lock();
                    schedule.merge(response.value);
                    schedule.purge_older_than(retention);
                }
                self.handle_refetch(&response.refetch).await;
                Ok(())
            }
            Err(err) => {
                // Keep trimming even when the fetch failed so a long
                // cloud outage does not leave stale directives live.
                self.schedule.lock().purge_older_than(retention);
                Err(err)
            }
        }
    }

    async fn refresh_token(&self) -> Result<()> {
        let response = self.cloud.refresh_token().await?;
        persist_token(&self.token_file, &response.value)?;
        self.handle_refetch(&response.refetch).await;
        Ok(())
    }

    /// Fetch fresh config and apply the differences: driver rebuild on
    /// identity change, curve and cutoff pushes when curve control is
    /// on.
    async fn sync_cloud_config(&self, refetch_tag: Option<&str>) -> Result<(), CloudError> {
        let fresh = self.cloud.fetch_config(refetch_tag).await?;
        let previous = self.config.read().clone();

        let needs_rebuild = CloudConfig::needs_driver_rebuild(Some(&previous), &fresh);
        let curve_changed = previous.heat_curve != fresh.heat_curve
            || previous.heat_curve_adjust != fresh.heat_curve_adjust;
        let stop_changed =
            previous.heating_season_stop_temperature != fresh.heating_season_stop_temperature;

        let fresh = Arc::new(fresh);
        *self.config.write() = fresh.clone();

        if needs_rebuild {
            self.rebuild_driver(fresh.clone()).await;
        }

        if fresh.heat_curve_control_enabled {
            if curve_changed {
                match HeatCurve::from_slice(&fresh.heat_curve, fresh.heat_curve_adjust) {
                    Some(curve) => {
                        let mut driver = self.driver.lock().await;
                        if let Err(err) = driver.set_heat_curve(&curve).await {
                            error!(error = %err, "writing heat curve to device");
                        }
                    }
                    None => debug!(
                        points = fresh.heat_curve.len(),
                        "cloud heat curve is not a 7-point curve, skipping"
                    ),
                }
            }
            if stop_changed {
                let mut driver = self.driver.lock().await;
                if let Err(err) = driver
                    .set_heating_season_stop_temperature(fresh.heating_season_stop_temperature)
                    .await
                {
                    error!(error = %err, "writing heating season stop temperature to device");
                }
            }
        }
        Ok(())
    }

    async fn rebuild_driver(&self, config: Arc<CloudConfig>) {
        {
            let mut driver = self.driver.lock().await;
            *driver = build_driver(config);
        }
        // A fresh driver starts with allow flags down; reconcile right
        // away so reported state matches the schedule.
        self.reconcile_tick().await;
    }

    /// Push the device's own curve and cutoff up to the cloud.
    /// Families without those registers just report the adjust.
    async fn send_current_settings(&self) {
        let (curve, stop) = {
            let mut driver = self.driver.lock().await;
            let curve = match driver.heat_curve().await {
                Ok(curve) => Some(curve),
                Err(err) => {
                    error!(error = %err, "fetching heat curve");
                    None
                }
            };
            let stop = match driver.heating_season_stop_temperature().await {
                Ok(value) => value,
                Err(err) => {
                    error!(error = %err, "fetching heating season stop temperature");
                    0.0
                }
            };
            (curve, stop)
        };

        let settings = CurrentSettings {
            heat_curve: curve.as_ref().map(|curve| curve.points),
            heat_curve_adjust: curve.map(|curve| curve.adjust).unwrap_or(0.0),
            heating_season_stop_temperature: stop,
        };
        match self
            .cloud
            .post_with_retry(CONFIG_PATH, &settings, &self.retry)
            .await
        {
            Ok(refetch) => self.handle_refetch(&refetch).await,
            Err(err) => error!(error = %err, "sending current settings"),
        }
    }

    /// React to refetch tags the cloud attached to a response. Only
    /// the config object is known so far.
    async fn handle_refetch(&self, tags: &[String]) {
        for tag in tags {
            if tag != REFETCH_CONFIG {
                debug!(tag, "ignoring unknown refetch tag");
                continue;
            }
            if let Err(err) = self.sync_cloud_config(Some(tag)).await {
                error!(error = %err, "syncing cloud config");
            }
        }
    }
}

/// Never let economics or the schedule freeze the house or the tap
/// water: force the flags back on below the configured minimums.
fn apply_safety_overrides(
    entry: &mut ScheduleEntry,
    state: Option<&DeviceState>,
    config: &CloudConfig,
) {
    let Some(state) = state else { return };
    if let Some(indoor) = state.indoor {
        if indoor < config.allowed_min_indoor_temp {
            entry.heating = true;
        }
    }
    if let Some(warm_water) = state.warm_water {
        if warm_water < config.allowed_min_hot_water_temp {
            entry.hotwater = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ScheduleEntry {
        ScheduleEntry {
            time: Utc::now(),
            price: 0.417,
            heating: false,
            hotwater: false,
            hotwater_force: false,
        }
    }

    fn config() -> CloudConfig {
        CloudConfig {
            allowed_min_indoor_temp: 16.0,
            allowed_min_hot_water_temp: 40.0,
            ..CloudConfig::default()
        }
    }

    #[test]
    fn cold_house_forces_heating_on() {
        let mut current = entry();
        let state = DeviceState {
            indoor: Some(15.0),
            warm_water: Some(45.0),
            ..DeviceState::default()
        };
        apply_safety_overrides(&mut current, Some(&state), &config());
        assert!(current.heating);
        assert!(!current.hotwater);
    }

    #[test]
    fn cold_tap_water_forces_hotwater_on() {
        let mut current = entry();
        let state = DeviceState {
            indoor: Some(21.0),
            warm_water: Some(39.0),
            ..DeviceState::default()
        };
        apply_safety_overrides(&mut current, Some(&state), &config());
        assert!(!current.heating);
        assert!(current.hotwater);
    }

    #[test]
    fn no_cached_state_means_no_override() {
        let mut current = entry();
        apply_safety_overrides(&mut current, None, &config());
        assert!(!current.heating);
        assert!(!current.hotwater);
    }

    #[test]
    fn warm_readings_leave_the_schedule_alone() {
        let mut current = entry();
        let state = DeviceState {
            indoor: Some(21.0),
            warm_water: Some(50.0),
            ..DeviceState::default()
        };
        apply_safety_overrides(&mut current, Some(&state), &config());
        assert!(!current.heating);
        assert!(!current.hotwater);
    }

    #[test]
    fn current_settings_wire_shape() {
        let settings = CurrentSettings {
            heat_curve: Some([20.0, 21.0, 22.0, 23.0, 24.0, 25.0, 26.0]),
            heat_curve_adjust: 1.0,
            heating_season_stop_temperature: 13.0,
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"heatCurve\":[20.0,21.0,22.0,23.0,24.0,25.0,26.0]"));
        assert!(json.contains("\"heatCurveAdjust\":1.0"));
        assert!(json.contains("\"heatingSeasonStopTemperature\":13.0"));

        // Families without the registers report only the adjust.
        let settings = CurrentSettings {
            heat_curve: None,
            heat_curve_adjust: 0.0,
            heating_season_stop_temperature: 0.0,
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, "{\"heatCurveAdjust\":0.0}");
    }
}
