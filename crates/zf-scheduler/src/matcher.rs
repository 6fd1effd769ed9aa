//! Picks the period in effect at a given moment.

use crate::period::SchedulePeriod;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use zf_model::ZoneSettings;

/// One zone's schedule, sorted by period.
pub type Schedule = BTreeMap<SchedulePeriod, ZoneSettings>;

/// The most specific period matching `at`, with its value.
///
/// Among matching periods the one sorting last wins: the latest start, and
/// for the same start the shortest. Nested periods thus override the period
/// they sit in.
pub fn best_match<V>(schedule: &BTreeMap<SchedulePeriod, V>, at: NaiveDateTime) -> Option<(&SchedulePeriod, &V)> {
    schedule.iter().rev().find(|(period, _)| period.matches(at))
}
