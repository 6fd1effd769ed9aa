//! Live assembly of the whole system on tokio tasks.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace, warn};
use zf_config::SystemConfig;
use zf_core::stream::{DEFAULT_CAPACITY, channel, merge, pipe};
use zf_core::{Clock, Signal, SystemClock, processor::from_fn};
use zf_filters::RateLimiter;
use zf_model::{
    Economizer, HvacCommand, HvacDevice, HvacMode, ModelError, NullDevice, UnitControlSignal, Zone, ZoneController,
    ZoneSettings, ZoneState, ZoneStatus,
};
use zf_scheduler::{ScheduleEvent, ScheduleSource, Scheduler, StaticSchedule};

use crate::build::{build_schedules, build_zone, scheduler_config, unit_command};
use crate::error::{AppError, AppResult};
use crate::sensor::{SensorChain, SensorReading};

/// What the runtime talks to besides its config.
pub struct RuntimeOptions {
    pub clock: Arc<dyn Clock>,
    /// The shared unit. A [`NullDevice`] named after the config if absent.
    pub unit: Option<Arc<dyn HvacDevice>>,
    /// Economizer actuators by zone name. Zones with an economizer block and
    /// no device here get a [`NullDevice`].
    pub economizer_devices: BTreeMap<String, Arc<dyn HvacDevice>>,
    /// Where schedules come from. The config's static schedule if absent.
    pub schedule_source: Option<Arc<dyn ScheduleSource>>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            unit: None,
            economizer_devices: BTreeMap::new(),
            schedule_source: None,
        }
    }
}

/// A running system.
///
/// Readings go in through [`Runtime::feed`], unit commands come out through
/// [`Runtime::subscribe_unit`]. Everything in between runs on its own task.
pub struct Runtime {
    name: String,
    mode: HvacMode,
    unit: Arc<dyn HvacDevice>,
    controller: Arc<ZoneController>,
    scheduler: Arc<Scheduler>,
    inputs: Mutex<BTreeMap<String, mpsc::Sender<SensorReading>>>,
    commands: broadcast::Sender<Signal<HvacCommand>>,
    schedule_events: Arc<Mutex<BTreeMap<String, ScheduleEvent>>>,
    tasks: Mutex<Vec<AbortHandle>>,
    /// Held while the unit is driven; set once it is parked for good.
    closed: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("unit", &self.unit.name())
            .field("zones", &self.controller.zones().map(|z| z.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Runtime {
    /// Validate `config`, build every zone and wire the pipelines.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &SystemConfig, options: RuntimeOptions) -> AppResult<Self> {
        zf_config::validate_config(config)?;

        let RuntimeOptions {
            clock,
            unit,
            mut economizer_devices,
            schedule_source,
        } = options;

        let mode = config.unit.mode;
        let unit = unit.unwrap_or_else(|| Arc::new(NullDevice::new(&config.unit.name, [mode])) as Arc<dyn HvacDevice>);
        if !unit.modes().contains(&mode) {
            return Err(ModelError::UnsupportedMode {
                mode,
                device: unit.name().to_string(),
                available: unit.modes().to_vec(),
            }
            .into());
        }

        let schedules = match schedule_source {
            Some(source) => source,
            None => Arc::new(StaticSchedule::new(build_schedules(config)?)) as Arc<dyn ScheduleSource>,
        };

        let mut zones = Vec::new();
        let mut chains = Vec::new();
        for def in &config.zones {
            let device = def.economizer.as_ref().map(|eco| {
                economizer_devices.remove(&def.name).unwrap_or_else(|| {
                    Arc::new(NullDevice::new(format!("{} economizer", def.name), [eco.mode])) as Arc<dyn HvacDevice>
                })
            });
            zones.push(build_zone(def, device, clock.clone())?);
            chains.push(SensorChain::new(&def.name, &def.sensor)?);
        }
        let ambient = config
            .ambient
            .as_ref()
            .map(|def| SensorChain::new("ambient", def))
            .transpose()?;

        let controller = Arc::new(ZoneController::new(zones.iter().cloned())?);
        let scheduler = Arc::new(Scheduler::new(zones.iter().cloned(), clock.clone(), scheduler_config(&config.scheduler))?);

        // Nothing fallible past this point: tasks get spawned
        let mut tasks = Vec::new();
        let mut inputs = BTreeMap::new();
        let mut statuses = Vec::new();

        for (zone, chain) in zones.iter().zip(chains) {
            let (tx, rx) = channel();
            for source in chain.sources() {
                inputs.insert(source.clone(), tx.clone());
            }
            let (readings, handles) = chain.spawn(rx, clock.clone());
            tasks.extend(handles);

            let (status_tx, status_rx) = channel();
            tasks.push(tokio::spawn(zone.clone().run(readings, status_tx)).abort_handle());
            statuses.push(status_rx);
        }

        if let Some(chain) = ambient {
            let (tx, rx) = channel();
            for source in chain.sources() {
                inputs.insert(source.clone(), tx.clone());
            }
            let (readings, handles) = chain.spawn(rx, clock.clone());
            tasks.extend(handles);

            let economizers: Vec<Arc<Economizer>> = zones.iter().filter_map(|z| z.economizer().cloned()).collect();
            tasks.extend(spawn_ambient_fan_out(readings, economizers));
        }

        let arbiter = controller.clone();
        let (demands, h) = pipe(
            "arbiter",
            from_fn(move |status: Signal<ZoneStatus, String>| {
                let demand = arbiter.process(status);
                if arbiter.needs_bump() {
                    debug!("voting zones started calling");
                }
                demand
            }),
            merge(statuses),
        );
        tasks.push(h.abort_handle());

        let limiter = RateLimiter::<UnitControlSignal>::by_value(Duration::from_millis(config.unit.rate_limit_ms));
        let (limited, h) = pipe("unit rate limit", limiter, demands);
        tasks.push(h.abort_handle());

        let (commands, _) = broadcast::channel(DEFAULT_CAPACITY);
        let closed = Arc::new(Mutex::new(false));
        tasks.push(spawn_driver(limited, unit.clone(), mode, commands.clone(), closed.clone()));

        let schedule_events = Arc::new(Mutex::new(BTreeMap::new()));
        let (events_tx, mut events_rx) = mpsc::channel::<ScheduleEvent>(DEFAULT_CAPACITY);
        tasks.push(tokio::spawn(scheduler.clone().run(schedules, events_tx)).abort_handle());
        let recorded = schedule_events.clone();
        tasks.push(
            tokio::spawn(async move {
                while let Some(event) = events_rx.recv().await {
                    info!(%event, "schedule");
                    recorded.lock().insert(event.zone.clone(), event);
                }
            })
            .abort_handle(),
        );

        info!(
            system = %config.name,
            unit = %unit.name(),
            %mode,
            zones = config.zones.len(),
            sources = inputs.len(),
            "started"
        );

        Ok(Self {
            name: config.name.clone(),
            mode,
            unit,
            controller,
            scheduler,
            inputs: Mutex::new(inputs),
            commands,
            schedule_events,
            tasks: Mutex::new(tasks),
            closed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> HvacMode {
        self.mode
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Source names readings are accepted for.
    pub fn sources(&self) -> Vec<String> {
        self.inputs.lock().keys().cloned().collect()
    }

    /// Hand one reading from `source` to its sensor chain.
    pub async fn feed(&self, source: &str, reading: Signal<f64>) -> AppResult<()> {
        let tx = self.inputs.lock().get(source).cloned();
        let Some(tx) = tx else {
            return Err(if self.is_closed() {
                AppError::Closed
            } else {
                AppError::SourceNotFound(source.to_string())
            });
        };
        trace!(source, %reading, "feed");
        tx.send(reading.replace_payload(Some(source.to_string())))
            .await
            .map_err(|_| AppError::Closed)
    }

    /// Unit commands as they are issued.
    pub fn subscribe_unit(&self) -> broadcast::Receiver<Signal<HvacCommand>> {
        self.commands.subscribe()
    }

    pub fn zone(&self, name: &str) -> AppResult<Arc<Zone>> {
        self.controller
            .zone(name)
            .cloned()
            .ok_or_else(|| AppError::ZoneNotFound(name.to_string()))
    }

    /// User override for one zone. Consumers see the change without waiting
    /// for the next reading.
    pub fn set_zone_settings(&self, name: &str, update: &ZoneSettings) -> AppResult<ZoneSettings> {
        Ok(self.zone(name)?.set_settings(update)?)
    }

    /// Coarse state of every zone that has reported.
    pub fn zone_states(&self) -> BTreeMap<String, ZoneState> {
        self.controller
            .statuses()
            .iter()
            .map(|(name, status)| (name.clone(), ZoneState::of(status)))
            .collect()
    }

    /// Last schedule change per zone.
    pub fn schedule_events(&self) -> BTreeMap<String, ScheduleEvent> {
        self.schedule_events.lock().clone()
    }

    /// Stop accepting readings. Pipelines drain and finish on their own.
    pub fn close_inputs(&self) {
        let mut inputs = self.inputs.lock();
        if !inputs.is_empty() {
            debug!(system = %self.name, sources = inputs.len(), "inputs closed");
        }
        inputs.clear();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Park every economizer, turn the unit off and stop every task.
    /// Safe to call more than once.
    ///
    /// The unit is parked under the same lock the driver holds while applying
    /// a command, so no command lands after the final off.
    pub fn shutdown(&self) {
        let mut closed = self.closed.lock();
        if *closed {
            return;
        }
        warn!(system = %self.name, "shutting down");

        self.close_inputs();
        for zone in self.controller.zones() {
            zone.close();
        }
        if let Err(e) = self.unit.apply(HvacCommand::off(Some(self.mode))) {
            error!(unit = %self.unit.name(), error = %e, "failed to turn the unit off");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in &tasks {
            task.abort();
        }

        *closed = true;
        info!(system = %self.name, tasks = tasks.len(), "shut down");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_ambient_fan_out(mut readings: mpsc::Receiver<SensorReading>, economizers: Vec<Arc<Economizer>>) -> Vec<AbortHandle> {
    let mut tasks = Vec::new();
    let mut outputs = Vec::new();
    for economizer in economizers {
        let (tx, rx) = channel();
        outputs.push(tx);
        tasks.push(tokio::spawn(economizer.run_ambient(rx)).abort_handle());
    }

    tasks.push(
        tokio::spawn(async move {
            while let Some(reading) = readings.recv().await {
                let reading = reading.without_payload();
                for tx in &outputs {
                    if tx.send(reading.clone()).await.is_err() {
                        trace!("economizer gone");
                    }
                }
            }
            debug!("ambient completed");
        })
        .abort_handle(),
    );
    tasks
}

/// Apply one demand unless the unit has been parked. Returns `false` once
/// parked.
fn drive(
    unit: &dyn HvacDevice,
    mode: HvacMode,
    demand: &Signal<UnitControlSignal>,
    commands: &broadcast::Sender<Signal<HvacCommand>>,
    closed: &Mutex<bool>,
) -> bool {
    let parked = closed.lock();
    if *parked {
        trace!(unit = %unit.name(), "parked, demand dropped");
        return false;
    }
    let command = unit_command(mode, demand);
    debug!(unit = %unit.name(), ?command, "command");
    if let Err(e) = unit.apply(command) {
        error!(unit = %unit.name(), error = %e, "command failed");
    }
    if commands.send(demand.with_value(command)).is_err() {
        trace!(unit = %unit.name(), "no command subscribers");
    }
    true
}

fn spawn_driver(
    mut demands: mpsc::Receiver<Signal<UnitControlSignal>>,
    unit: Arc<dyn HvacDevice>,
    mode: HvacMode,
    commands: broadcast::Sender<Signal<HvacCommand>>,
    closed: Arc<Mutex<bool>>,
) -> AbortHandle {
    tokio::spawn(async move {
        while let Some(demand) = demands.recv().await {
            if !drive(unit.as_ref(), mode, &demand, &commands, &closed) {
                break;
            }
        }
        debug!(unit = %unit.name(), "driver completed");
    })
    .abort_handle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use zf_config::{LATEST_VERSION, PidDef, RangeDef, SchedulerDef, SensorDef, UnitDef, ZoneDef};
    use zf_core::{ManualClock, Timestamp};
    use zf_model::ModelResult;

    fn ts(secs: i64) -> Timestamp {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn config() -> SystemConfig {
        SystemConfig {
            version: LATEST_VERSION,
            name: "test".to_string(),
            unit: UnitDef {
                name: "ac".to_string(),
                mode: HvacMode::Cooling,
                rate_limit_ms: 1_000,
            },
            zones: vec![ZoneDef {
                name: "den".to_string(),
                setpoint: 20.0,
                range: RangeDef::default(),
                pid: PidDef {
                    p: 1.0,
                    i: 0.0,
                    d: 0.0,
                    limit: 0.0,
                    integral_span_s: None,
                    derivative_span_s: None,
                },
                enabled: true,
                voting: true,
                dump_priority: 0,
                sensor: SensorDef {
                    sources: vec!["den-wall".to_string()],
                    median_depth: 1,
                    timeout_ms: 60_000,
                    repeat: false,
                },
                economizer: None,
            }],
            ambient: None,
            scheduler: SchedulerDef::default(),
            schedule: vec![],
        }
    }

    fn options(unit: Arc<NullDevice>) -> RuntimeOptions {
        RuntimeOptions {
            clock: Arc::new(ManualClock::new(ts(0))),
            unit: Some(unit as Arc<dyn HvacDevice>),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unknown_source_is_rejected() {
        let runtime = Runtime::start(&config(), options(Arc::new(NullDevice::new("ac", [HvacMode::Cooling])))).unwrap();
        assert_eq!(runtime.sources(), vec!["den-wall".to_string()]);
        assert!(matches!(
            runtime.feed("attic", Signal::new(ts(0), 20.0)).await,
            Err(AppError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn unit_must_support_the_mode() {
        let heater = Arc::new(NullDevice::new("ac", [HvacMode::Heating]));
        assert!(matches!(Runtime::start(&config(), options(heater)), Err(AppError::Model(_))));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_parks_the_unit() {
        let unit = Arc::new(NullDevice::new("ac", [HvacMode::Cooling]));
        let runtime = Runtime::start(&config(), options(unit.clone())).unwrap();

        runtime.shutdown();
        runtime.shutdown();
        assert!(runtime.is_closed());
        assert_eq!(unit.commands(), vec![HvacCommand::off(Some(HvacMode::Cooling))]);
        assert!(matches!(
            runtime.feed("den-wall", Signal::new(ts(0), 20.0)).await,
            Err(AppError::Closed)
        ));

        drop(runtime);
        assert_eq!(unit.commands().len(), 1);
    }

    fn calling(secs: i64) -> Signal<UnitControlSignal> {
        Signal::new(
            ts(secs),
            UnitControlSignal {
                demand: 3.0,
                fan_speed: None,
            },
        )
    }

    #[tokio::test]
    async fn parked_driver_ignores_late_demand() {
        let unit = Arc::new(NullDevice::new("ac", [HvacMode::Cooling]));
        let closed = Arc::new(Mutex::new(false));
        let (commands, _) = broadcast::channel(8);
        let (tx, rx) = channel();
        spawn_driver(rx, unit.clone(), HvacMode::Cooling, commands, closed.clone());

        tx.send(calling(0)).await.unwrap();
        while unit.commands().is_empty() {
            tokio::task::yield_now().await;
        }

        {
            let mut parked = closed.lock();
            *parked = true;
            unit.apply(HvacCommand::off(Some(HvacMode::Cooling))).unwrap();
        }
        tx.send(calling(1)).await.unwrap();
        // the driver stops on the first demand after parking
        tx.closed().await;

        assert_eq!(unit.commands().len(), 2);
        assert_eq!(unit.last(), Some(HvacCommand::off(Some(HvacMode::Cooling))));
    }

    /// Records like a [`NullDevice`] but takes its time over every command.
    #[derive(Debug)]
    struct SlowUnit {
        inner: NullDevice,
        started: std::sync::atomic::AtomicBool,
    }

    impl HvacDevice for SlowUnit {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn modes(&self) -> &[HvacMode] {
            self.inner.modes()
        }

        fn apply(&self, command: HvacCommand) -> ModelResult<()> {
            self.started.store(true, std::sync::atomic::Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            self.inner.apply(command)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_during_a_command_still_ends_off() {
        let unit = Arc::new(SlowUnit {
            inner: NullDevice::new("ac", [HvacMode::Cooling]),
            started: std::sync::atomic::AtomicBool::new(false),
        });
        let options = RuntimeOptions {
            clock: Arc::new(ManualClock::new(ts(0))),
            unit: Some(unit.clone() as Arc<dyn HvacDevice>),
            ..Default::default()
        };
        let runtime = Runtime::start(&config(), options).unwrap();

        runtime.feed("den-wall", Signal::new(ts(0), 22.0)).await.unwrap();
        while !unit.started.load(std::sync::atomic::Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        runtime.shutdown();

        let applied = unit.inner.commands();
        assert!(applied.len() >= 2, "{applied:?}");
        assert_eq!(applied[0].demand, 1.0);
        assert_eq!(applied.last(), Some(&HvacCommand::off(Some(HvacMode::Cooling))));
        assert_eq!(unit.inner.commands().len(), applied.len());
    }
}
