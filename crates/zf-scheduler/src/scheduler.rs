//! Applies schedule periods to zones.

use crate::error::{ScheduleError, ScheduleResult};
use crate::matcher::{Schedule, best_match};
use crate::period::SchedulePeriod;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};
use zf_core::Clock;
use zf_model::{PeriodSettings, Zone, ZoneSettings};

/// Where schedules come from: a calendar, a file, a test fixture.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Current schedule per zone name. Errors are retried on the next poll.
    async fn fetch(&self) -> ScheduleResult<BTreeMap<String, Schedule>>;
}

/// Fixed schedules, handed out on every fetch.
#[derive(Debug, Clone, Default)]
pub struct StaticSchedule {
    schedules: BTreeMap<String, Schedule>,
}

impl StaticSchedule {
    pub fn new(schedules: BTreeMap<String, Schedule>) -> Self {
        Self { schedules }
    }
}

#[async_trait]
impl ScheduleSource for StaticSchedule {
    async fn fetch(&self) -> ScheduleResult<BTreeMap<String, Schedule>> {
        Ok(self.schedules.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How often the current period is re-evaluated.
    pub granularity: Duration,
    /// How often the source is asked for fresh schedules.
    pub poll_interval: Duration,
}

impl SchedulerConfig {
    pub fn validate(&self) -> ScheduleResult<()> {
        if self.granularity.is_zero() {
            return Err(ScheduleError::InvalidArg {
                what: "schedule granularity must be positive",
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ScheduleError::InvalidArg {
                what: "schedule poll interval must be positive",
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            granularity: Duration::from_secs(10),
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// A zone switched period. `None` means no period is active any more; the
/// zone keeps whatever settings it had.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEvent {
    pub zone: String,
    pub period: Option<(SchedulePeriod, ZoneSettings)>,
}

impl fmt::Display for ScheduleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.period {
            Some((period, settings)) => write!(f, "{}: {} {}", self.zone, period, settings),
            None => write!(f, "{}: no active period", self.zone),
        }
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    schedules: BTreeMap<String, Schedule>,
    current: BTreeMap<String, SchedulePeriod>,
    /// Periods recorded on zones that are on hold, so they are recorded once.
    held: BTreeMap<String, SchedulePeriod>,
}

/// Keeps zones in the period the clock says they should be in.
///
/// Zone settings are changed through the zone's own lock, so a schedule
/// change and a user change never interleave. Lock order is scheduler, then
/// zone.
#[derive(Debug)]
pub struct Scheduler {
    zones: BTreeMap<String, Arc<Zone>>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        zones: impl IntoIterator<Item = Arc<Zone>>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> ScheduleResult<Self> {
        config.validate()?;
        let zones: BTreeMap<_, _> = zones.into_iter().map(|z| (z.name().to_string(), z)).collect();

        info!(
            granularity_secs = config.granularity.as_secs_f64(),
            poll_secs = config.poll_interval.as_secs_f64(),
            zones = ?zones.keys().collect::<Vec<_>>(),
            "scheduler configured"
        );

        Ok(Self {
            zones,
            clock,
            config,
            state: Mutex::new(SchedulerState::default()),
        })
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Period currently applied to `zone`, if any.
    pub fn current_period(&self, zone: &str) -> Option<SchedulePeriod> {
        self.state.lock().current.get(zone).cloned()
    }

    /// Take fresh schedules and apply them right away. Schedules for unknown
    /// zones are ignored.
    pub fn update(&self, schedules: BTreeMap<String, Schedule>) -> Vec<ScheduleEvent> {
        let mut state = self.state.lock();
        let mut events = Vec::new();

        for (name, schedule) in schedules {
            let Some(zone) = self.zones.get(&name) else {
                trace!(zone = %name, known = ?self.zones.keys().collect::<Vec<_>>(), "unknown zone, schedule ignored");
                continue;
            };
            debug!(zone = %name, entries = schedule.len(), "schedule updated");
            events.extend(self.apply(&mut state, zone, &schedule));
            state.schedules.insert(name, schedule);
        }
        events
    }

    /// Re-evaluate every known schedule against the clock.
    pub fn tick(&self) -> Vec<ScheduleEvent> {
        let mut state = self.state.lock();
        let schedules = std::mem::take(&mut state.schedules);

        let events = schedules
            .iter()
            .filter_map(|(name, schedule)| {
                let zone = self.zones.get(name)?;
                self.apply(&mut state, zone, schedule)
            })
            .collect();

        state.schedules = schedules;
        events
    }

    fn apply(&self, state: &mut SchedulerState, zone: &Zone, schedule: &Schedule) -> Option<ScheduleEvent> {
        let name = zone.name();
        let now = self.clock.local_now();
        let matched = best_match(schedule, now);
        let current = state.current.get(name);

        trace!(zone = %name, %now, period = ?matched.map(|(p, _)| p.to_string()), "matched");

        if current == matched.map(|(p, _)| p) {
            trace!(zone = %name, "already there");
            return None;
        }

        let Some((period, settings)) = matched else {
            trace!(zone = %name, "no active period, settings left as they were");
            state.current.remove(name);
            state.held.remove(name);
            if let Err(e) = zone.set_period_settings(None) {
                error!(zone = %name, error = %e, "failed to clear period");
            }
            return Some(ScheduleEvent {
                zone: name.to_string(),
                period: None,
            });
        };

        let period_settings = PeriodSettings {
            period: period.name().to_string(),
            settings: settings.clone(),
        };

        if zone.settings().is_on_hold() {
            if state.held.get(name) == Some(period) {
                return None;
            }
            trace!(zone = %name, %period, "on hold, left alone");
            match zone.set_period_settings(Some(period_settings)) {
                Ok(()) => {
                    state.held.insert(name.to_string(), period.clone());
                }
                Err(e) => error!(zone = %name, error = %e, "failed to record period"),
            }
            return None;
        }
        state.held.remove(name);

        match zone.set_period_settings(Some(period_settings)) {
            Ok(()) => {
                info!(zone = %name, %period, %settings, "settings applied");
                state.current.insert(name.to_string(), period.clone());
                Some(ScheduleEvent {
                    zone: name.to_string(),
                    period: Some((period.clone(), settings.clone())),
                })
            }
            Err(e) => {
                error!(zone = %name, %period, %settings, error = %e, "failed to apply settings");
                state.current.remove(name);
                Some(ScheduleEvent {
                    zone: name.to_string(),
                    period: None,
                })
            }
        }
    }

    /// Poll `source` and re-evaluate on the configured intervals, reporting
    /// every change on `events`. A failed fetch is logged and retried on the
    /// next poll. Returns once `events` has no receiver.
    pub async fn run(self: Arc<Self>, source: Arc<dyn ScheduleSource>, events: mpsc::Sender<ScheduleEvent>) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick = tokio::time::interval(self.config.granularity);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let batch = tokio::select! {
                _ = events.closed() => break,
                _ = poll.tick() => match source.fetch().await {
                    Ok(schedules) => self.update(schedules),
                    Err(e) => {
                        warn!(error = %e, "schedule fetch failed, will retry");
                        continue;
                    }
                },
                _ = tick.tick() => self.tick(),
            };

            for event in batch {
                info!(%event, "schedule");
                if events.send(event).await.is_err() {
                    debug!("schedule consumer gone");
                    return;
                }
            }
        }
        debug!("scheduler completed");
    }
}
