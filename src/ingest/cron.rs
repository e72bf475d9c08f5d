// src/ingest/cron.rs
//! Five-field cron expressions (minute, hour, day-of-month, month,
//! day-of-week) evaluated over local wall-clock time.
//!
//! Each field is a bit set of allowed values. Supported syntax per field:
//! `*`, `N`, `A-B`, `*/S`, `A-B/S`, `A/S` (A to field max), comma lists,
//! month names (`jan`..`dec`), weekday names (`sun`..`sat`) and `7` as
//! Sunday. When both day-of-month and day-of-week are restricted, a day
//! matches if *either* matches (classic cron behaviour).

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// How far ahead `next_after` searches. Covers a Feb 29 across a skipped
/// century leap year.
const SEARCH_DAYS: i64 = 366 * 9;

#[derive(Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Offset added to a name's index (months start at 1).
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], name_base: 0 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], name_base: 0 };
const DAY_OF_MONTH: FieldSpec =
    FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], name_base: 0 };
const MONTH: FieldSpec =
    FieldSpec { name: "month", min: 1, max: 12, names: &MONTH_NAMES, name_base: 1 };
// 7 is accepted and folded onto 0 (Sunday).
const DAY_OF_WEEK: FieldSpec =
    FieldSpec { name: "day-of-week", min: 0, max: 7, names: &WEEKDAY_NAMES, name_base: 0 };

/// A parsed cron expression.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronSchedule {
    expr: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount(fields.len()));
        }

        let mut days_of_week = parse_field(fields[4], DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        let schedule = Self {
            expr: fields.join(" "),
            minutes: parse_field(fields[0], MINUTE)?,
            hours: parse_field(fields[1], HOUR)?,
            days_of_month: parse_field(fields[2], DAY_OF_MONTH)?,
            months: parse_field(fields[3], MONTH)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        };

        // Reject things like `0 0 30 2 *` up front instead of never firing.
        let origin = NaiveDate::from_ymd_opt(2000, 1, 1)
            .map(|d| d.and_time(NaiveTime::MIN))
            .ok_or_else(|| ScheduleError::NeverFires(schedule.expr.clone()))?;
        if schedule.next_after(origin).is_none() {
            return Err(ScheduleError::NeverFires(schedule.expr));
        }

        Ok(schedule)
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// Does this calendar day qualify?
    pub fn matches_day(&self, date: NaiveDate) -> bool {
        if !has(self.months, date.month()) {
            return false;
        }
        let dom = has(self.days_of_month, date.day());
        let dow = has(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    pub fn matches(&self, at: NaiveDateTime) -> bool {
        self.matches_day(at.date()) && has(self.hours, at.hour()) && has(self.minutes, at.minute())
    }

    /// First whole minute strictly after `after` that matches, or `None` if
    /// nothing matches within the search horizon.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = after
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))?
            .checked_add_signed(Duration::minutes(1))?;

        let first_day = start.date();
        for offset in 0..SEARCH_DAYS {
            let date = first_day.checked_add_signed(Duration::days(offset))?;
            if !self.matches_day(date) {
                continue;
            }

            let (hour_from, minute_from) = if offset == 0 {
                (start.hour(), start.minute())
            } else {
                (0, 0)
            };

            for hour in hour_from..24 {
                if !has(self.hours, hour) {
                    continue;
                }
                let from = if hour == hour_from { minute_from } else { 0 };
                if let Some(minute) = (from..60).find(|m| has(self.minutes, *m)) {
                    return date.and_hms_opt(hour, minute, 0);
                }
            }
        }
        None
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expr).finish()
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CronSchedule {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CronSchedule> for String {
    fn from(value: CronSchedule) -> Self {
        value.expr
    }
}

fn has(bits: u64, value: u32) -> bool {
    value < 64 && bits & (1u64 << value) != 0
}

fn parse_field(text: &str, spec: FieldSpec) -> Result<u64, ScheduleError> {
    let invalid = || ScheduleError::InvalidField {
        field: spec.name,
        value: text.to_string(),
    };

    let mut bits = 0u64;
    for part in text.split(',') {
        if part.is_empty() {
            return Err(invalid());
        }
        let (range, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| invalid())?;
                // A step wider than the field could never reach a second slot.
                if step == 0 || step > spec.max {
                    return Err(invalid());
                }
                (r, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let lo = parse_value(a, spec)?;
            let hi = parse_value(b, spec)?;
            if lo > hi {
                return Err(invalid());
            }
            (lo, hi)
        } else {
            let v = parse_value(range, spec)?;
            // `A/S` runs from A to the end of the field.
            if step.is_some() {
                (v, spec.max)
            } else {
                (v, v)
            }
        };

        let step = step.unwrap_or(1);
        let mut v = lo;
        while v <= hi {
            bits |= 1u64 << v;
            v += step;
        }
    }
    Ok(bits)
}

fn parse_value(text: &str, spec: FieldSpec) -> Result<u32, ScheduleError> {
    let lower = text.to_ascii_lowercase();
    if let Some(idx) = spec.names.iter().position(|n| *n == lower) {
        return Ok(idx as u32 + spec.name_base);
    }
    let value: u32 = text.parse().map_err(|_| ScheduleError::InvalidField {
        field: spec.name,
        value: text.to_string(),
    })?;
    if value < spec.min || value > spec.max {
        return Err(ScheduleError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn next(expr: &str, from: NaiveDateTime) -> NaiveDateTime {
        CronSchedule::parse(expr).unwrap().next_after(from).unwrap()
    }

    #[test]
    fn every_minute_is_strictly_after() {
        assert_eq!(next("* * * * *", at(2025, 3, 1, 10, 0)), at(2025, 3, 1, 10, 1));
        let with_seconds = at(2025, 3, 1, 10, 0) + Duration::seconds(59);
        assert_eq!(next("* * * * *", with_seconds), at(2025, 3, 1, 10, 1));
    }

    #[test]
    fn top_of_hour() {
        assert_eq!(next("0 * * * *", at(2025, 3, 1, 10, 0)), at(2025, 3, 1, 11, 0));
        assert_eq!(next("0 * * * *", at(2025, 3, 1, 23, 30)), at(2025, 3, 2, 0, 0));
    }

    #[test]
    fn stepped_range_of_hours() {
        // 8, 12, 16, 20
        let e = "0 8-23/4 * * *";
        assert_eq!(next(e, at(2025, 3, 1, 6, 0)), at(2025, 3, 1, 8, 0));
        assert_eq!(next(e, at(2025, 3, 1, 8, 0)), at(2025, 3, 1, 12, 0));
        assert_eq!(next(e, at(2025, 3, 1, 20, 0)), at(2025, 3, 2, 8, 0));
    }

    #[test]
    fn every_four_hours() {
        assert_eq!(next("0 */4 * * *", at(2025, 3, 1, 1, 15)), at(2025, 3, 1, 4, 0));
    }

    #[test]
    fn lists_and_value_step() {
        assert_eq!(next("15,45 * * * *", at(2025, 3, 1, 10, 20)), at(2025, 3, 1, 10, 45));
        assert_eq!(next("10/20 * * * *", at(2025, 3, 1, 10, 31)), at(2025, 3, 1, 10, 50));
    }

    #[test]
    fn month_rollover_and_year_rollover() {
        assert_eq!(next("0 0 1 * *", at(2025, 1, 31, 12, 0)), at(2025, 2, 1, 0, 0));
        assert_eq!(next("30 6 1 jan *", at(2025, 6, 1, 0, 0)), at(2026, 1, 1, 6, 30));
    }

    #[test]
    fn weekday_names_and_seven_is_sunday() {
        // 2025-03-01 is a Saturday.
        assert_eq!(next("0 9 * * mon", at(2025, 3, 1, 0, 0)), at(2025, 3, 3, 9, 0));
        assert_eq!(next("0 9 * * 7", at(2025, 3, 1, 0, 0)), at(2025, 3, 2, 9, 0));
        assert_eq!(next("0 9 * * 0", at(2025, 3, 1, 0, 0)), at(2025, 3, 2, 9, 0));
    }

    #[test]
    fn restricted_dom_and_dow_are_ored() {
        // 13th of the month OR a Friday. 2025-03-07 is a Friday, before the 13th.
        assert_eq!(next("0 0 13 * fri", at(2025, 3, 1, 0, 0)), at(2025, 3, 7, 0, 0));
        // With a wildcard weekday only the 13th matches.
        assert_eq!(next("0 0 13 * *", at(2025, 3, 1, 0, 0)), at(2025, 3, 13, 0, 0));
    }

    #[test]
    fn leap_day_is_found() {
        assert_eq!(next("0 0 29 2 *", at(2025, 3, 1, 0, 0)), at(2028, 2, 29, 0, 0));
    }

    #[test]
    fn invalid_expressions_fail_fast() {
        assert_eq!(
            CronSchedule::parse("0 * * *").unwrap_err(),
            ScheduleError::FieldCount(4)
        );
        assert!(matches!(
            CronSchedule::parse("60 * * * *").unwrap_err(),
            ScheduleError::OutOfRange { field: "minute", .. }
        ));
        assert!(matches!(
            CronSchedule::parse("0 5-2 * * *").unwrap_err(),
            ScheduleError::InvalidField { field: "hour", .. }
        ));
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(matches!(
            CronSchedule::parse("1/4294967295 * * * *").unwrap_err(),
            ScheduleError::InvalidField { field: "minute", .. }
        ));
        assert!(CronSchedule::parse("*/100 * * * *").is_err());
        assert!(CronSchedule::parse("0 */24 * * *").is_err());
        assert!(CronSchedule::parse("*/59 * * * *").is_ok());
        assert!(CronSchedule::parse("0 0 * foo *").is_err());
        assert!(matches!(
            CronSchedule::parse("0 0 30 2 *").unwrap_err(),
            ScheduleError::NeverFires(_)
        ));
    }

    #[test]
    fn deserializes_from_string() {
        #[derive(Deserialize)]
        struct Wrap {
            schedule: CronSchedule,
        }
        let w: Wrap = toml::from_str(r#"schedule = "0 8-23 * * *""#).unwrap();
        assert_eq!(w.schedule.expression(), "0 8-23 * * *");
        assert!(toml::from_str::<Wrap>(r#"schedule = "bogus""#).is_err());
    }
}
