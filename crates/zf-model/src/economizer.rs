//! Economizer: free cooling/heating from outside air.
//!
//! The economizer watches the indoor temperature of its zone and the ambient
//! temperature, and turns its device on when outside air can do the job. While
//! it is on, the zone's HVAC demand is suppressed unless the settings say to
//! keep the HVAC running.

use crate::device::{HvacCommand, HvacDevice, HvacMode};
use crate::error::{ModelError, ModelResult};
use crate::settings::EconomizerSettings;
use crate::status::{CallingStatus, EconomizerStatus, ZoneStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use zf_controls::{HysteresisController, PidConfig, PidController, ProcessController};
use zf_core::{Clock, Signal, SignalError, Timestamp};

/// Readings older than this are not trusted.
pub const DEFAULT_ECONOMIZER_TIMEOUT: Duration = Duration::from_secs(90);

const HYSTERESIS: f64 = 1.0;

/// PI controller tuning for the economizer loop. Gains are per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EconomizerGains {
    pub p: f64,
    pub i: f64,
    pub limit: f64,
}

impl Default for EconomizerGains {
    fn default() -> Self {
        Self {
            p: 1.0,
            i: 0.004,
            limit: 1.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EconomizerConfig {
    pub mode: HvacMode,
    pub settings: EconomizerSettings,
    pub gains: EconomizerGains,
    pub timeout: Duration,
}

impl EconomizerConfig {
    pub fn new(mode: HvacMode, settings: EconomizerSettings) -> Self {
        Self {
            mode,
            settings,
            gains: EconomizerGains::default(),
            timeout: DEFAULT_ECONOMIZER_TIMEOUT,
        }
    }
}

/// Mode adjusted economizer signal. Positive means outside air helps.
///
/// Full ambient advantage while the indoor temperature is more than
/// `changeover_delta` away from the target; closer than that the advantage is
/// scaled down linearly, reaching zero at the target and going negative past
/// it.
pub fn compute_combined(mode: HvacMode, settings: &EconomizerSettings, indoor: f64, ambient: f64) -> f64 {
    let delta = settings.changeover_delta;
    let (ambient_delta, target_delta) = match mode {
        HvacMode::Cooling => (indoor - (ambient + delta), indoor - settings.target_temperature),
        HvacMode::Heating => (ambient - (indoor + delta), settings.target_temperature - indoor),
    };

    let adjustment = if target_delta > delta || ambient_delta < 0.0 {
        0.0
    } else if delta == 0.0 {
        // Zero band: at or past the target there is nothing left to gain
        ambient_delta
    } else {
        ambient_delta * (delta - target_delta) / delta
    };

    ambient_delta - adjustment
}

#[derive(Debug)]
struct EconomizerState {
    settings: EconomizerSettings,
    indoor: Option<Signal<f64>>,
    ambient: Option<Signal<f64>>,
    controller: PidController,
    renderer: HysteresisController,
    last_computed: Option<Timestamp>,
    actuator: Option<bool>,
    status: EconomizerStatus,
    closed: bool,
}

/// Economizer for one zone.
///
/// The indoor/ambient pair, the controllers and the actuator state live
/// behind one lock: both readings are always read and replaced together.
#[derive(Debug)]
pub struct Economizer {
    name: String,
    mode: HvacMode,
    timeout: Duration,
    device: Arc<dyn HvacDevice>,
    clock: Arc<dyn Clock>,
    state: Mutex<EconomizerState>,
}

impl Economizer {
    /// # Errors
    ///
    /// If the device can't operate in `config.mode`, or the settings or gains
    /// are invalid.
    pub fn new(
        name: impl Into<String>,
        config: EconomizerConfig,
        device: Arc<dyn HvacDevice>,
        clock: Arc<dyn Clock>,
    ) -> ModelResult<Self> {
        let name = name.into();
        if !device.modes().contains(&config.mode) {
            return Err(ModelError::UnsupportedMode {
                mode: config.mode,
                device: device.name().to_string(),
                available: device.modes().to_vec(),
            });
        }
        config.settings.validate()?;

        let EconomizerGains { p, i, limit } = config.gains;
        let controller = PidController::new(format!("(controller) {name}"), 0.0, PidConfig::new(p, i, 0.0, limit))?;
        let renderer = HysteresisController::symmetric(format!("(renderer) {name}"), 0.0, HYSTERESIS)?;

        let status = EconomizerStatus {
            settings: Some(config.settings.clone()),
            sample: None,
            demand: 0.0,
            calling: false,
            ambient: None,
        };

        Ok(Self {
            name,
            mode: config.mode,
            timeout: config.timeout,
            device,
            clock,
            state: Mutex::new(EconomizerState {
                settings: config.settings,
                indoor: None,
                ambient: None,
                controller,
                renderer,
                last_computed: None,
                actuator: None,
                status,
                closed: false,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> HvacMode {
        self.mode
    }

    pub fn settings(&self) -> EconomizerSettings {
        self.state.lock().settings.clone()
    }

    pub fn status(&self) -> EconomizerStatus {
        self.state.lock().status.clone()
    }

    /// Whether the device is currently on.
    pub fn is_active(&self) -> bool {
        self.state.lock().actuator == Some(true)
    }

    pub fn set_settings(&self, settings: EconomizerSettings) -> ModelResult<()> {
        settings.validate()?;
        let mut state = self.state.lock();
        info!(economizer = %self.name, ?settings, "settings set");
        state.status.settings = Some(settings.clone());
        state.settings = settings;
        if !state.settings.is_enabled() {
            self.disable(&mut state);
        }
        Ok(())
    }

    /// Take the zone's indoor reading. Returns the combined signal computed
    /// from it, for instrumentation.
    pub fn record_indoor<P: Clone>(&self, indoor: &Signal<f64, P>) -> Signal<f64> {
        let mut state = self.state.lock();
        state.indoor = Some(indoor.clone().without_payload());
        self.update(&mut state)
    }

    pub fn record_ambient(&self, ambient: Signal<f64>) -> Signal<f64> {
        let mut state = self.state.lock();
        state.ambient = Some(ambient);
        self.update(&mut state)
    }

    /// Feed ambient readings until the stream closes.
    pub async fn run_ambient(self: Arc<Self>, mut rx: mpsc::Receiver<Signal<f64>>) {
        while let Some(ambient) = rx.recv().await {
            let combined = self.record_ambient(ambient);
            trace!(economizer = %self.name, %combined, "ambient");
        }
        debug!(economizer = %self.name, "ambient stream completed");
    }

    /// Attach the economizer status to a zone status, and drop the zone's
    /// HVAC demand while the economizer is doing the job.
    pub fn suppress<P>(&self, source: Signal<ZoneStatus, P>) -> Signal<ZoneStatus, P> {
        if source.is_error() {
            return source;
        }
        let state = self.state.lock();
        let status = state.status.clone();
        let suppress = state.actuator == Some(true) && !state.settings.keep_hvac_on;
        drop(state);

        source.map(|mut zone| {
            zone.economizer = Some(status);
            if suppress {
                zone.calling = CallingStatus::IDLE;
            }
            zone
        })
    }

    /// Turn the device off for good. Safe to call more than once.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        warn!(economizer = %self.name, "shutting down");
        if let Err(err) = self.device.apply(HvacCommand::off(Some(self.mode))) {
            error!(economizer = %self.name, %err, "failed to park the device");
        }
        state.actuator = Some(false);
        state.closed = true;
        info!(economizer = %self.name, "shut down");
    }

    fn update(&self, state: &mut EconomizerState) -> Signal<f64> {
        let now = self.clock.now();

        if !state.settings.is_enabled() {
            trace!(economizer = %self.name, "not enabled");
            self.disable(state);
            return Signal::new(now, 0.0);
        }

        let combined = self.combine(state, now);
        if combined.is_error() {
            self.drive(state, false);
            return combined;
        }

        let timestamp = combined.timestamp();
        if state.last_computed.is_some_and(|last| timestamp <= last) {
            trace!(economizer = %self.name, %timestamp, "no newer data, skipped");
            return combined;
        }
        state.last_computed = Some(timestamp);

        let pid = state.controller.compute(combined.clone());
        let Some(demand) = pid.value().map(|s| s.signal) else {
            return combined;
        };
        let rendered = state.renderer.compute(pid.map(|s| s.signal));
        let Some(hysteresis) = rendered.value() else {
            return combined;
        };
        let on = hysteresis.signal == 1.0;

        state.status = EconomizerStatus {
            settings: Some(state.settings.clone()),
            sample: Some(hysteresis.detail.sample),
            demand,
            calling: on,
            ambient: state.ambient.as_ref().and_then(|s| s.value().copied()),
        };
        self.drive(state, on);
        combined
    }

    /// Pair the latest readings, or explain why they can't be paired.
    fn combine(&self, state: &mut EconomizerState, now: Timestamp) -> Signal<f64> {
        let (Some(indoor), Some(ambient)) = (&state.indoor, &state.ambient) else {
            debug!(economizer = %self.name, "incomplete readings");
            return Signal::failure(
                now,
                None,
                SignalError::Missing {
                    what: "indoor/ambient pair".into(),
                },
            );
        };

        if let Some(failed) = [indoor, ambient].into_iter().find(|s| s.is_error()) {
            let message = failed.error().map(ToString::to_string).unwrap_or_default();
            warn!(economizer = %self.name, %message, "error readings");
            return Signal::failure(
                now,
                None,
                SignalError::Upstream {
                    what: "economizer input".into(),
                    message,
                },
            );
        }

        let stale_before = chrono::TimeDelta::from_std(self.timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout));
        if stale_before.is_some_and(|limit| indoor.timestamp() < limit || ambient.timestamp() < limit) {
            error!(economizer = %self.name, "stale readings, resetting both");
            state.indoor = None;
            state.ambient = None;
            return Signal::failure(
                now,
                None,
                SignalError::Stale {
                    what: "indoor/ambient pair".into(),
                },
            );
        }

        let (Some(&indoor_value), Some(&ambient_value)) = (indoor.value(), ambient.value()) else {
            unreachable!("non-failed signal without a value");
        };
        let signal = compute_combined(self.mode, &state.settings, indoor_value, ambient_value);
        debug!(economizer = %self.name, indoor = indoor_value, ambient = ambient_value, signal, "combined");

        Signal::new(indoor.timestamp().max(ambient.timestamp()), signal)
    }

    fn disable(&self, state: &mut EconomizerState) {
        state.status.demand = 0.0;
        state.status.calling = false;
        state.status.sample = None;
        self.drive(state, false);
    }

    /// Tell the device, but only when the state actually changes.
    fn drive(&self, state: &mut EconomizerState, on: bool) {
        if state.closed || state.actuator == Some(on) {
            return;
        }
        info!(economizer = %self.name, from = ?state.actuator, to = on, "state change");
        state.actuator = Some(on);

        let power = if on { state.settings.max_power } else { 0.0 };
        let command = HvacCommand {
            mode: Some(self.mode),
            demand: power,
            fan_speed: power,
        };
        if let Err(err) = self.device.apply(command) {
            error!(economizer = %self.name, %err, "device command failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NullDevice;
    use crate::settings::ZoneSettings;
    use chrono::DateTime;
    use zf_core::ManualClock;

    fn ts(secs: i64) -> Timestamp {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn settings() -> EconomizerSettings {
        EconomizerSettings::new(1.0, 22.0)
    }

    fn fixture() -> (Economizer, Arc<NullDevice>, Arc<ManualClock>) {
        let device = Arc::new(NullDevice::new("fan", [HvacMode::Cooling]));
        let clock = Arc::new(ManualClock::new(ts(0)));
        let eco = Economizer::new(
            "eco",
            EconomizerConfig::new(HvacMode::Cooling, settings()),
            device.clone(),
            clock.clone(),
        )
        .unwrap();
        (eco, device, clock)
    }

    fn calling_zone(t: Timestamp) -> Signal<ZoneStatus, String> {
        Signal::with_payload(
            t,
            ZoneStatus {
                settings: ZoneSettings::with_setpoint(22.0),
                calling: CallingStatus {
                    sample: Some(1.0),
                    demand: 2.0,
                    calling: true,
                },
                economizer: None,
                period: None,
            },
            "zone".to_string(),
        )
    }

    #[test]
    fn combined_signal_backs_off_near_target() {
        let s = settings();
        assert_eq!(compute_combined(HvacMode::Cooling, &s, 25.0, 15.0), 9.0);
        assert_eq!(compute_combined(HvacMode::Cooling, &s, 22.5, 15.0), 3.25);
        assert_eq!(compute_combined(HvacMode::Cooling, &s, 21.0, 15.0), -5.0);
        // ambient is no help at all
        assert_eq!(compute_combined(HvacMode::Cooling, &s, 25.0, 30.0), -6.0);
    }

    #[test]
    fn heating_mirrors_cooling() {
        let s = EconomizerSettings::new(1.0, 22.0);
        assert_eq!(compute_combined(HvacMode::Heating, &s, 19.0, 29.0), 9.0);
    }

    #[test]
    fn zero_changeover_delta_is_a_step() {
        let s = EconomizerSettings::new(0.0, 22.0);
        assert_eq!(compute_combined(HvacMode::Cooling, &s, 25.0, 15.0), 10.0);
        assert_eq!(compute_combined(HvacMode::Cooling, &s, 22.0, 15.0), 0.0);
        assert!(compute_combined(HvacMode::Cooling, &s, 21.0, 15.0).is_finite());
    }

    #[test]
    fn unsupported_mode_rejected() {
        let device = Arc::new(NullDevice::new("heater", [HvacMode::Heating]));
        let clock = Arc::new(ManualClock::new(ts(0)));
        let result = Economizer::new("eco", EconomizerConfig::new(HvacMode::Cooling, settings()), device, clock);
        assert!(matches!(result, Err(ModelError::UnsupportedMode { .. })));
    }

    #[test]
    fn missing_ambient_is_a_failure() {
        let (eco, device, _clock) = fixture();
        let out = eco.record_indoor(&Signal::<f64>::new(ts(0), 25.0));
        assert!(out.is_error());
        assert!(!eco.is_active());
        assert_eq!(device.last().map(|c| c.demand), Some(0.0));
    }

    #[test]
    fn turns_on_and_suppresses_hvac() {
        let (eco, device, clock) = fixture();
        eco.record_ambient(Signal::new(ts(0), 15.0));
        clock.set(ts(10));
        let out = eco.record_indoor(&Signal::<f64>::new(ts(10), 25.0));

        assert_eq!(out.value(), Some(&9.0));
        assert!(eco.is_active());
        assert_eq!(device.last().map(|c| c.demand), Some(1.0));

        let zone = eco.suppress(calling_zone(ts(10)));
        let status = zone.value().unwrap();
        assert!(!status.calling.calling);
        assert_eq!(status.calling.demand, 0.0);
        assert!(status.economizer.as_ref().unwrap().calling);
    }

    #[test]
    fn keep_hvac_on_leaves_demand() {
        let (eco, _device, clock) = fixture();
        eco.set_settings(EconomizerSettings {
            keep_hvac_on: true,
            ..settings()
        })
        .unwrap();
        eco.record_ambient(Signal::new(ts(0), 15.0));
        clock.set(ts(10));
        eco.record_indoor(&Signal::<f64>::new(ts(10), 25.0));

        assert!(eco.is_active());
        let zone = eco.suppress(calling_zone(ts(10)));
        assert!(zone.value().unwrap().calling.calling);
    }

    #[test]
    fn stale_readings_reset_both() {
        let (eco, _device, clock) = fixture();
        eco.record_ambient(Signal::new(ts(0), 15.0));
        clock.set(ts(100));
        let out = eco.record_indoor(&Signal::<f64>::new(ts(100), 25.0));
        assert!(matches!(out.error(), Some(SignalError::Stale { .. })));

        // the indoor reading that arrived with the stale one is gone too
        clock.set(ts(101));
        let out = eco.record_ambient(Signal::new(ts(101), 15.0));
        assert!(matches!(out.error(), Some(SignalError::Missing { .. })));
    }

    #[test]
    fn disabled_reports_zero_and_stays_off() {
        let (eco, _device, clock) = fixture();
        eco.set_settings(EconomizerSettings {
            enabled: Some(false),
            ..settings()
        })
        .unwrap();
        eco.record_ambient(Signal::new(ts(0), 15.0));
        clock.set(ts(10));
        let out = eco.record_indoor(&Signal::<f64>::new(ts(10), 25.0));
        assert_eq!(out.value(), Some(&0.0));
        assert!(!eco.is_active());
    }

    #[test]
    fn close_parks_once() {
        let (eco, device, clock) = fixture();
        eco.record_ambient(Signal::new(ts(0), 15.0));
        clock.set(ts(10));
        eco.record_indoor(&Signal::<f64>::new(ts(10), 25.0));
        let before = device.commands().len();

        eco.close();
        eco.close();
        let commands = device.commands();
        assert_eq!(commands.len(), before + 1);
        assert_eq!(commands.last().unwrap().demand, 0.0);
        assert!(!eco.is_active());
    }
}
