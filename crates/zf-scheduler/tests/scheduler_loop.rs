use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use zf_core::ManualClock;
use zf_model::{Thermostat, Zone, ZoneSettings};
use zf_scheduler::{
    Schedule, ScheduleError, ScheduleResult, ScheduleSource, SchedulePeriod, Scheduler, SchedulerConfig,
    StaticSchedule, parse_event,
};

fn zone(name: &str) -> Arc<Zone> {
    let thermostat = Thermostat::with_gains(name, 20.0, 1.0, 0.0, 0.0, 0.0).unwrap();
    Arc::new(Zone::new(thermostat, ZoneSettings::with_setpoint(20.0), None).unwrap())
}

fn clock() -> Arc<ManualClock> {
    // Tuesday morning
    let at = NaiveDate::from_ymd_opt(2010, 1, 19).unwrap().and_hms_opt(7, 0, 0).unwrap();
    Arc::new(ManualClock::new(Utc.from_utc_datetime(&at)))
}

fn schedule() -> BTreeMap<String, Schedule> {
    let (name, settings) = parse_event("Wake up: setpoint 22, voting", None).unwrap();
    let period = SchedulePeriod::parse(&name, "6:30 am", "9:00 am", "MTWTF  ").unwrap();
    BTreeMap::from([("den".to_string(), Schedule::from([(period, settings)]))])
}

/// Fails a given number of times before serving the schedule.
struct Flaky {
    failures: AtomicUsize,
    inner: StaticSchedule,
}

#[async_trait]
impl ScheduleSource for Flaky {
    async fn fetch(&self) -> ScheduleResult<BTreeMap<String, Schedule>> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ScheduleError::Source {
                message: "calendar unreachable".into(),
            });
        }
        self.inner.fetch().await
    }
}

#[tokio::test(start_paused = true)]
async fn applies_fetched_schedule() {
    let den = zone("den");
    let scheduler = Arc::new(Scheduler::new([den.clone()], clock(), SchedulerConfig::default()).unwrap());
    let (tx, mut rx) = mpsc::channel(8);
    let task = tokio::spawn(scheduler.clone().run(Arc::new(StaticSchedule::new(schedule())), tx));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.zone, "den");
    assert_eq!(event.period.unwrap().0.name(), "Wake up");
    assert_eq!(den.settings().setpoint, Some(22.0));

    drop(rx);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn fetch_failures_are_retried() {
    let den = zone("den");
    let config = SchedulerConfig {
        granularity: Duration::from_secs(10),
        poll_interval: Duration::from_secs(30),
    };
    let scheduler = Arc::new(Scheduler::new([den.clone()], clock(), config).unwrap());
    let source = Arc::new(Flaky {
        failures: AtomicUsize::new(2),
        inner: StaticSchedule::new(schedule()),
    });
    let (tx, mut rx) = mpsc::channel(8);
    let task = tokio::spawn(scheduler.clone().run(source.clone(), tx));

    let started = tokio::time::Instant::now();
    let event = rx.recv().await.unwrap();
    assert!(event.period.is_some());
    // two failed polls, the third one succeeds
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61), "{elapsed:?}");
    assert_eq!(source.failures.load(Ordering::SeqCst), 0);

    drop(rx);
    task.await.unwrap();
}
