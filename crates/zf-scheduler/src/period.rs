//! Named, day-of-week scoped time window.

use crate::error::{ScheduleError, ScheduleResult};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use std::cmp::{Ordering, Reverse};
use std::fmt;
use uuid::Uuid;

const DAY_LETTERS: &[u8; 7] = b"MTWTFSS";

/// Tried in order, first match wins.
const TIME_FORMATS: &[&str] = &[
    "%H:%M",
    "%H:%M:%S",
    "%H:%M:%S%.f",
    "%H%M",
    "%I:%M%p",
    "%I:%M %p",
];

const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// A time window on selected days of the week.
///
/// `start > end` means the period spans midnight; the day bits then refer to
/// the day the period starts. The id takes part in equality and only breaks
/// ties in ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchedulePeriod {
    id: String,
    name: String,
    start: NaiveTime,
    end: NaiveTime,
    /// Bit 0 is Monday.
    days: u8,
}

impl SchedulePeriod {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        start: NaiveTime,
        end: NaiveTime,
        days: u8,
    ) -> ScheduleResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ScheduleError::EmptyName);
        }
        if start == end {
            return Err(ScheduleError::SameStartEnd { time: start });
        }
        if days & 0x80 != 0 {
            return Err(ScheduleError::InvalidArg {
                what: "day mask has seven bits",
            });
        }
        Ok(Self {
            id: id.into(),
            name,
            start,
            end,
            days,
        })
    }

    /// Build from human readable text, with a random id.
    ///
    /// # Arguments
    ///
    /// * `start`, `end` - Times in any of `HH:MM`, `H:MM`, `HH:MM:SS[.fff]`,
    ///   `HHMM`, `h:mm am`, `h:mmPM` or an ISO date-time
    /// * `days` - Seven characters, Monday first; anything but a space sets
    ///   the day
    pub fn parse(name: &str, start: &str, end: &str, days: &str) -> ScheduleResult<Self> {
        Self::parse_with_id(Uuid::new_v4().to_string(), name, start, end, days)
    }

    pub fn parse_with_id(id: impl Into<String>, name: &str, start: &str, end: &str, days: &str) -> ScheduleResult<Self> {
        if name.trim().is_empty() {
            return Err(ScheduleError::EmptyName);
        }
        Self::new(id, name, parse_time(start)?, parse_time(end)?, parse_days(days)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn days(&self) -> u8 {
        self.days
    }

    pub fn is_same_day(&self) -> bool {
        self.end > self.start
    }

    pub fn is_across_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Length of the window, wrapping over midnight.
    pub fn duration(&self) -> TimeDelta {
        let raw = self.end - self.start;
        if raw < TimeDelta::zero() { raw + TimeDelta::days(1) } else { raw }
    }

    /// `start <= t < end`, wrapping over midnight.
    pub fn includes(&self, t: NaiveTime) -> bool {
        if self.is_same_day() {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }

    /// Whether the day bit for `date`'s day of week is set.
    pub fn includes_day(&self, date: NaiveDate) -> bool {
        let day = date.weekday().num_days_from_monday();
        self.days & (1 << day) != 0
    }

    /// Time and day together. The part of a midnight-spanning period that
    /// falls after midnight belongs to the previous day.
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        let t = at.time();
        if !self.includes(t) {
            return false;
        }
        let day = if self.is_across_midnight() && t < self.end {
            at.date().pred_opt()
        } else {
            Some(at.date())
        };
        day.is_some_and(|d| self.includes_day(d))
    }
}

impl Ord for SchedulePeriod {
    /// Earlier start first; for the same start the longer period goes first so
    /// that a shorter one overrides it.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.start, Reverse(self.duration()), &self.name, self.days, &self.id).cmp(&(
            other.start,
            Reverse(other.duration()),
            &other.name,
            other.days,
            &other.id,
        ))
    }
}

impl PartialOrd for SchedulePeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn format_time(t: NaiveTime) -> String {
    if t.second() == 0 && t.nanosecond() == 0 {
        t.format("%H:%M").to_string()
    } else {
        t.format("%H:%M:%S").to_string()
    }
}

impl fmt::Display for SchedulePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days: String = DAY_LETTERS
            .iter()
            .enumerate()
            .map(|(offset, &c)| if self.days & (1 << offset) != 0 { c as char } else { '.' })
            .collect();
        write!(
            f,
            "{} ({} to {} on {})",
            self.name,
            format_time(self.start),
            format_time(self.end),
            days
        )
    }
}

/// Parse a time of day in any of the accepted formats.
pub fn parse_time(text: &str) -> ScheduleResult<NaiveTime> {
    let text = text.trim();

    if let Some(t) = TIME_FORMATS.iter().find_map(|f| NaiveTime::parse_from_str(text, f).ok()) {
        return Ok(t);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.time());
    }
    if let Some(dt) = DATE_TIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
    {
        return Ok(dt.time());
    }

    Err(ScheduleError::BadTime { text: text.to_string() })
}

/// Seven characters, Monday first; a space clears the day, anything else sets it.
pub fn parse_days(days: &str) -> ScheduleResult<u8> {
    let chars: Vec<char> = days.chars().collect();
    if chars.len() != 7 {
        return Err(ScheduleError::MalformedDays { days: days.to_string() });
    }
    Ok(chars
        .iter()
        .enumerate()
        .filter(|(_, c)| **c != ' ')
        .fold(0u8, |mask, (offset, _)| mask | (1 << offset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn time_formats() {
        assert_eq!(parse_time("02:15").unwrap(), hm(2, 15));
        assert_eq!(parse_time("2:15").unwrap(), hm(2, 15));
        assert_eq!(parse_time("0:15").unwrap(), hm(0, 15));
        assert_eq!(parse_time("1415").unwrap(), hm(14, 15));
        assert_eq!(parse_time("2:15 PM").unwrap(), hm(14, 15));
        assert_eq!(parse_time("2:15pm").unwrap(), hm(14, 15));
        assert_eq!(parse_time("12:30 am").unwrap(), hm(0, 30));
        assert_eq!(parse_time("14:59:30").unwrap(), NaiveTime::from_hms_opt(14, 59, 30).unwrap());
        assert_eq!(parse_time("2010-02-04T14:59:00.000-07:00").unwrap(), hm(14, 59));
        assert!(matches!(parse_time("quarter past two"), Err(ScheduleError::BadTime { .. })));
    }

    #[test]
    fn day_masks() {
        assert_eq!(parse_days("M WT  S").unwrap(), 0x4D);
        assert_eq!(parse_days("MT   SS").unwrap(), 0x63);
        assert_eq!(parse_days("       ").unwrap(), 0);
        assert_eq!(parse_days(".......").unwrap(), 0x7F);
        assert!(matches!(parse_days("MTWTF"), Err(ScheduleError::MalformedDays { .. })));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(
            SchedulePeriod::parse("", "02:15", "02:20", "......."),
            Err(ScheduleError::EmptyName)
        ));
        let same = SchedulePeriod::parse("p", "02:15", "2:15", ".......").unwrap_err();
        assert_eq!(same.to_string(), "Start and end time are the same: 02:15:00");
    }

    #[test]
    fn display() {
        let p = SchedulePeriod::parse("name", "02:15", "02:20", "       ").unwrap();
        assert_eq!(p.to_string(), "name (02:15 to 02:20 on .......)");
        let p = SchedulePeriod::parse("work", "8:00", "17:30", "MTWTF  ").unwrap();
        assert_eq!(p.to_string(), "work (08:00 to 17:30 on MTWTF..)");
    }

    #[test]
    fn includes_wraps_midnight() {
        let night = SchedulePeriod::parse("night", "22:00", "06:00", "MTWTFSS").unwrap();
        assert!(night.is_across_midnight());
        assert!(night.includes(hm(23, 30)));
        assert!(night.includes(hm(5, 0)));
        assert!(night.includes(hm(22, 0)));
        assert!(!night.includes(hm(6, 0)));
        assert!(!night.includes(hm(12, 0)));
    }

    #[test]
    fn after_midnight_belongs_to_previous_day() {
        // Friday night only
        let friday = SchedulePeriod::parse("party", "22:00", "02:00", "    F  ").unwrap();
        // 2010-01-22 is a Friday
        let fri = NaiveDate::from_ymd_opt(2010, 1, 22).unwrap();
        let sat = fri.succ_opt().unwrap();

        assert!(friday.matches(fri.and_time(hm(23, 0))));
        assert!(friday.matches(sat.and_time(hm(1, 0))));
        assert!(!friday.matches(sat.and_time(hm(23, 0))));
        assert!(!friday.matches(fri.and_time(hm(1, 0))));
    }

    #[test]
    fn ordering_prefers_longer_on_same_start() {
        let long = SchedulePeriod::parse("long", "00:10", "00:50", ".......").unwrap();
        let short = SchedulePeriod::parse("short", "00:10", "00:20", ".......").unwrap();
        let earlier = SchedulePeriod::parse("earlier", "00:05", "01:00", ".......").unwrap();
        let mut all = [short.clone(), long.clone(), earlier.clone()];
        all.sort();
        assert_eq!(all, [earlier, long, short]);
    }

    #[test]
    fn id_takes_part_in_equality() {
        let a = SchedulePeriod::parse_with_id("a", "p", "1:00", "2:00", ".......").unwrap();
        let b = SchedulePeriod::parse_with_id("b", "p", "1:00", "2:00", ".......").unwrap();
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn inclusion_splits_the_day(start in 0u32..1440, end in 0u32..1440, t in 0u32..1440) {
                prop_assume!(start != end);
                let at = |m: u32| NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap();
                let p = SchedulePeriod::new("id", "p", at(start), at(end), 0x7F).unwrap();
                let inside = if start < end { start <= t && t < end } else { t >= start || t < end };
                prop_assert_eq!(p.includes(at(t)), inside);
            }
        }
    }
}
