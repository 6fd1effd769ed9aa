//! zf-scheduler: time-of-day settings for zones.
//!
//! Contains:
//! - period (day-of-week scoped time window, parsed from human readable text)
//! - matcher (picks the period in effect at a given moment)
//! - settings_parser (free form and YAML settings out of calendar events)
//! - scheduler (applies matched periods to zones, async poll/tick loop)
//! - error (parse and source errors)

pub mod error;
pub mod matcher;
pub mod period;
pub mod scheduler;
pub mod settings_parser;

pub use error::{ScheduleError, ScheduleResult};
pub use matcher::{Schedule, best_match};
pub use period::SchedulePeriod;
pub use scheduler::{ScheduleEvent, ScheduleSource, Scheduler, SchedulerConfig, StaticSchedule};
pub use settings_parser::{parse_event, parse_period_name, parse_settings, parse_yaml};
