//! Deterministic run over recorded readings.
//!
//! The same assembly as [`crate::Runtime`], driven synchronously: the clock
//! follows the readings, sensor silence is checked against the recorded
//! timestamps and schedule periods are re-evaluated before every reading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use zf_config::SystemConfig;
use zf_core::{Clock, ManualClock, Signal, SignalError, SignalProcessor, Timestamp};
use zf_filters::RateLimiter;
use zf_model::{
    Economizer, HvacCommand, HvacDevice, HvacMode, NullDevice, UnitControlSignal, Zone, ZoneController, ZoneState, ZoneStatus,
};
use zf_scheduler::{ScheduleEvent, Scheduler};

use crate::build::{build_schedules, build_zone, scheduler_config, unit_command};
use crate::error::{AppError, AppResult};
use crate::sensor::{SensorChain, SensorReading};

/// One recorded sensor reading. A reading without a value is a sensor
/// failure, described by `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub at: Timestamp,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reading {
    pub fn to_signal(&self) -> SensorReading {
        match self.value {
            Some(value) => Signal::with_payload(self.at, value, self.source.clone()),
            None => Signal::failure(
                self.at,
                Some(self.source.clone()),
                SignalError::sensor(self.error.as_deref().unwrap_or("no value")),
            ),
        }
    }
}

/// Readings as JSON lines. Blank lines and lines starting with `#` are
/// skipped.
pub fn parse_readings(text: &str) -> AppResult<Vec<Reading>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| AppError::InvalidInput(format!("line {}: {}", index + 1, e)))
        })
        .collect()
}

/// A command issued to the unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRecord {
    pub at: Timestamp,
    pub demand: f64,
    pub command: HvacCommand,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    /// Every command that got past the rate limiter, in order.
    pub commands: Vec<UnitRecord>,
    /// Final state of every zone that reported.
    pub zones: BTreeMap<String, ZoneState>,
    /// Schedule changes, rendered.
    pub schedule: Vec<String>,
    pub readings: usize,
    /// Readings from sources no chain listens to.
    pub unrouted: usize,
}

struct Replay {
    clock: Arc<ManualClock>,
    mode: HvacMode,
    unit: Arc<NullDevice>,
    zones: Vec<Arc<Zone>>,
    chains: Vec<SensorChain>,
    routes: BTreeMap<String, usize>,
    ambient: Option<SensorChain>,
    economizers: Vec<Arc<Economizer>>,
    controller: ZoneController,
    limiter: RateLimiter<UnitControlSignal>,
    scheduler: Scheduler,
    report: ReplayReport,
}

impl Replay {
    fn new(config: &SystemConfig, start: Timestamp) -> AppResult<Self> {
        let clock = Arc::new(ManualClock::new(start));
        let shared: Arc<dyn Clock> = clock.clone();

        let mut zones = Vec::new();
        let mut chains = Vec::new();
        let mut routes = BTreeMap::new();
        for (index, def) in config.zones.iter().enumerate() {
            let device = def.economizer.as_ref().map(|eco| {
                Arc::new(NullDevice::new(format!("{} economizer", def.name), [eco.mode])) as Arc<dyn HvacDevice>
            });
            zones.push(build_zone(def, device, shared.clone())?);
            let chain = SensorChain::new(&def.name, &def.sensor)?;
            routes.extend(chain.sources().map(|source| (source.clone(), index)));
            chains.push(chain);
        }
        let ambient = config
            .ambient
            .as_ref()
            .map(|def| SensorChain::new("ambient", def))
            .transpose()?;

        let scheduler = Scheduler::new(zones.iter().cloned(), shared, scheduler_config(&config.scheduler))?;
        let mut replay = Self {
            mode: config.unit.mode,
            unit: Arc::new(NullDevice::new(&config.unit.name, [config.unit.mode])),
            economizers: zones.iter().filter_map(|z| z.economizer().cloned()).collect(),
            controller: ZoneController::new(zones.iter().cloned())?,
            limiter: RateLimiter::by_value(Duration::from_millis(config.unit.rate_limit_ms)),
            clock,
            zones,
            chains,
            routes,
            ambient,
            scheduler,
            report: ReplayReport::default(),
        };

        let events = replay.scheduler.update(build_schedules(config)?);
        replay.apply_schedule(events);
        Ok(replay)
    }

    fn apply_schedule(&mut self, events: Vec<ScheduleEvent>) {
        for event in events {
            info!(%event, "schedule");
            self.report.schedule.push(event.to_string());
            let replayed = self.controller.zone(&event.zone).and_then(|zone| zone.replay());
            if let Some(status) = replayed {
                self.arbitrate(status);
            }
        }
    }

    fn arbitrate(&mut self, status: Signal<ZoneStatus, String>) {
        let Some(demand) = self.controller.process(status) else {
            return;
        };
        let Some(demand) = self.limiter.filter(demand) else {
            return;
        };
        let command = unit_command(self.mode, &demand);
        if let Err(e) = self.unit.apply(command) {
            warn!(error = %e, "unit command failed");
        }
        self.report.commands.push(UnitRecord {
            at: demand.timestamp(),
            demand: demand.value().map_or(0.0, |d| d.demand),
            command,
        });
    }

    fn zone_sample(&mut self, index: usize, sample: SensorReading) {
        let status = self.zones[index].compute(sample);
        self.arbitrate(status);
    }

    fn ambient_sample(&self, sample: SensorReading) {
        let sample = sample.without_payload();
        for economizer in &self.economizers {
            economizer.record_ambient(sample.clone());
        }
    }

    fn step(&mut self, reading: &Reading) {
        self.clock.set(reading.at);
        self.report.readings += 1;

        let events = self.scheduler.tick();
        self.apply_schedule(events);

        for index in 0..self.chains.len() {
            if let Some(failure) = self.chains[index].check(reading.at) {
                self.zone_sample(index, failure);
            }
        }
        if let Some(failure) = self.ambient.as_mut().and_then(|chain| chain.check(reading.at)) {
            self.ambient_sample(failure);
        }

        let signal = reading.to_signal();
        if let Some(&index) = self.routes.get(&reading.source) {
            if let Some(sample) = self.chains[index].process(signal) {
                self.zone_sample(index, sample);
            }
        } else if let Some(chain) = self
            .ambient
            .as_mut()
            .filter(|chain| chain.sources().any(|s| *s == reading.source))
        {
            if let Some(sample) = chain.process(signal) {
                self.ambient_sample(sample);
            }
        } else {
            debug!(source = %reading.source, "no chain for source");
            self.report.unrouted += 1;
        }
    }

    fn finish(mut self) -> ReplayReport {
        self.report.zones = self
            .controller
            .statuses()
            .iter()
            .map(|(name, status)| (name.clone(), ZoneState::of(status)))
            .collect();
        for zone in &self.zones {
            zone.close();
        }
        self.report
    }
}

/// Run `readings` through the system `config` describes.
///
/// Readings are processed in time order. The unit and any economizers are
/// [`NullDevice`]s.
pub fn replay(config: &SystemConfig, readings: &[Reading]) -> AppResult<ReplayReport> {
    zf_config::validate_config(config)?;

    let mut readings = readings.to_vec();
    readings.sort_by_key(|r| r.at);
    let Some(first) = readings.first() else {
        return Ok(ReplayReport::default());
    };

    let mut replay = Replay::new(config, first.at)?;
    for reading in &readings {
        replay.step(reading);
    }

    let report = replay.finish();
    info!(
        readings = report.readings,
        commands = report.commands.len(),
        unrouted = report.unrouted,
        "replay complete"
    );
    Ok(report)
}
