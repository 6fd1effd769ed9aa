//! Zone: a thermostat with user settings and an optional economizer.

use crate::economizer::Economizer;
use crate::error::ModelResult;
use crate::settings::{PeriodSettings, ZoneSettings};
use crate::status::{CallingStatus, ZoneStatus};
use crate::thermostat::{SetpointRange, Thermostat};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, trace, warn};
use zf_core::Signal;

#[derive(Debug)]
struct ZoneInner {
    thermostat: Thermostat,
    settings: ZoneSettings,
    period: Option<PeriodSettings>,
    /// Last thermostat verdict, replayed when settings change.
    last_output: Option<Signal<CallingStatus>>,
    closed: bool,
}

/// An independently controlled area.
///
/// Settings mutations and sample processing are serialized by one lock per
/// zone. The economizer, if any, is locked after the zone and never the other
/// way around.
#[derive(Debug)]
pub struct Zone {
    name: String,
    inner: Mutex<ZoneInner>,
    economizer: Option<Arc<Economizer>>,
    changed: Notify,
}

impl Zone {
    /// The thermostat's name becomes the zone name. A setpoint in `settings`
    /// overrides the thermostat's; absent, the thermostat's is recorded.
    pub fn new(
        mut thermostat: Thermostat,
        settings: ZoneSettings,
        economizer: Option<Arc<Economizer>>,
    ) -> ModelResult<Self> {
        let setpoint = settings.setpoint.unwrap_or_else(|| thermostat.setpoint());
        thermostat.set_setpoint(setpoint)?;
        let settings = ZoneSettings {
            setpoint: Some(setpoint),
            ..settings
        };

        if let (Some(eco), Some(eco_settings)) = (&economizer, &settings.economizer) {
            eco.set_settings(eco_settings.clone())?;
        }

        Ok(Self {
            name: thermostat.name().to_string(),
            inner: Mutex::new(ZoneInner {
                thermostat,
                settings,
                period: None,
                last_output: None,
                closed: false,
            }),
            economizer,
            changed: Notify::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> ZoneSettings {
        self.inner.lock().settings.clone()
    }

    pub fn period_settings(&self) -> Option<PeriodSettings> {
        self.inner.lock().period.clone()
    }

    pub fn setpoint_range(&self) -> SetpointRange {
        self.inner.lock().thermostat.range()
    }

    pub fn economizer(&self) -> Option<&Arc<Economizer>> {
        self.economizer.as_ref()
    }

    /// Merge `update` over the current settings.
    ///
    /// Nothing changes if any part of the update is invalid. Consumers get a
    /// fresh status right away if a sample has been seen already.
    pub fn set_settings(&self, update: &ZoneSettings) -> ModelResult<ZoneSettings> {
        let merged = {
            let mut inner = self.inner.lock();
            self.apply(&mut inner, update)?
        };
        self.changed.notify_one();
        Ok(merged)
    }

    /// Record the schedule period in effect and apply its settings, unless the
    /// zone is on hold. `None` clears the period and leaves settings alone.
    pub fn set_period_settings(&self, period: Option<PeriodSettings>) -> ModelResult<()> {
        let mut inner = self.inner.lock();
        inner.period = period.clone();

        let Some(period) = period else {
            info!(zone = %self.name, "period cleared");
            return Ok(());
        };

        if inner.settings.is_on_hold() {
            debug!(zone = %self.name, period = %period.period, settings = %period.settings, "on hold, ignored");
            return Ok(());
        }

        self.apply(&mut inner, &period.settings)?;
        drop(inner);

        info!(zone = %self.name, period = %period.period, "period applied");
        self.changed.notify_one();
        Ok(())
    }

    fn apply(&self, inner: &mut ZoneInner, update: &ZoneSettings) -> ModelResult<ZoneSettings> {
        if let Some(setpoint) = update.setpoint {
            inner.thermostat.range().check(setpoint)?;
        }
        if let Some(eco_settings) = &update.economizer {
            eco_settings.validate()?;
        }

        if let Some(setpoint) = update.setpoint {
            inner.thermostat.set_setpoint(setpoint)?;
        }
        let merged = inner.settings.merge(update);
        if let (Some(eco), Some(eco_settings)) = (&self.economizer, &merged.economizer) {
            eco.set_settings(eco_settings.clone())?;
        }

        debug!(zone = %self.name, "settings: {}", inner.settings);
        debug!(zone = %self.name, "settings: + {update}");
        info!(zone = %self.name, "settings: = {merged}");

        inner.settings = merged.clone();
        Ok(merged)
    }

    /// Process one temperature sample into a zone status.
    ///
    /// The thermostat sees every sample even while the zone is disabled, so
    /// its state stays current. The sample's payload is dropped; the status
    /// carries the zone name.
    pub fn compute<P: Clone>(&self, pv: Signal<f64, P>) -> Signal<ZoneStatus, String> {
        let mut inner = self.inner.lock();

        if let Some(eco) = &self.economizer {
            let combined = eco.record_indoor(&pv);
            trace!(zone = %self.name, %combined, "economizer");
        }

        let output = inner.thermostat.compute(pv.without_payload());
        trace!(zone = %self.name, %output, "thermostat");
        inner.last_output = Some(output.clone());

        self.render(&inner, output)
    }

    /// Status for the last thermostat verdict under the current settings.
    /// `None` until the first sample.
    pub fn replay(&self) -> Option<Signal<ZoneStatus, String>> {
        let inner = self.inner.lock();
        let Some(output) = inner.last_output.clone() else {
            debug!(zone = %self.name, "nothing to replay yet, settings will show with the next sample");
            return None;
        };
        Some(self.render(&inner, output))
    }

    fn render(&self, inner: &ZoneInner, output: Signal<CallingStatus>) -> Signal<ZoneStatus, String> {
        let enabled = inner.settings.is_enabled();
        let status = output
            .map(|calling| ZoneStatus {
                settings: inner.settings.clone(),
                calling: if enabled { calling } else { CallingStatus::IDLE },
                economizer: None,
                period: inner.period.clone(),
            })
            .replace_payload(Some(self.name.clone()));

        if !enabled {
            trace!(zone = %self.name, "disabled, demand suppressed");
        }

        match &self.economizer {
            Some(eco) => eco.suppress(status),
            None => status,
        }
    }

    /// Resolves after a settings change that consumers should see.
    pub async fn settings_changed(&self) {
        self.changed.notified().await;
    }

    /// Turn samples from `rx` into statuses on `tx`, and replay the last
    /// verdict whenever settings change. Returns when the input closes or the
    /// output has no receiver.
    pub async fn run<P>(self: Arc<Self>, mut rx: mpsc::Receiver<Signal<f64, P>>, tx: mpsc::Sender<Signal<ZoneStatus, String>>)
    where
        P: Clone + Send + 'static,
    {
        loop {
            let status = tokio::select! {
                input = rx.recv() => match input {
                    Some(pv) => self.compute(pv),
                    None => break,
                },
                _ = self.settings_changed() => match self.replay() {
                    Some(status) => status,
                    None => continue,
                },
            };
            if tx.send(status).await.is_err() {
                debug!(zone = %self.name, "downstream closed");
                break;
            }
        }
        debug!(zone = %self.name, "completed");
    }

    /// Park the economizer. Safe to call more than once.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        warn!(zone = %self.name, "shutting down");
        if let Some(eco) = &self.economizer {
            eco.close();
        }
        inner.closed = true;
        info!(zone = %self.name, "shut down");
    }
}
