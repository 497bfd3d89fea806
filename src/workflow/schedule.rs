// src/workflow/schedule.rs

//! Cron schedule parsing and next-fire calculation.
//!
//! Workflows use standard 5-field Unix expressions
//! (`minute hour day-of-month month day-of-week`). The `cron` crate expects
//! seconds and year fields and numbers weekdays 1-7 starting on Sunday, so
//! expressions are normalized before parsing. 6/7-field expressions are
//! passed through untouched.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
    tz: Tz,
}

impl CronSchedule {
    pub fn parse(expression: &str, tz: Tz) -> Result<Self, String> {
        let normalized = to_cron_crate_format(expression)?;
        let schedule = Schedule::from_str(&normalized).map_err(|e| e.to_string())?;
        Ok(Self {
            expression: expression.trim().to_string(),
            schedule,
            tz,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`, evaluated in the schedule's
    /// timezone.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.tz);
        self.schedule
            .after(&local)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }
}

fn to_cron_crate_format(expression: &str) -> Result<String, String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => {
            let dow = shift_weekdays(fields[4])?;
            Ok(format!(
                "0 {} {} {} {} {} *",
                fields[0], fields[1], fields[2], fields[3], dow
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        0 => Err("empty schedule expression".to_string()),
        n => Err(format!("expected 5 fields, found {n}")),
    }
}

/// Map Unix weekday numbers (0-7, Sunday = 0 or 7) onto the `cron` crate's
/// 1-7 (Sunday = 1). Names and `*` pass through.
fn shift_weekdays(field: &str) -> Result<String, String> {
    let shift = |tok: &str| -> Result<String, String> {
        match tok.parse::<u8>() {
            Ok(n @ 0..=6) => Ok((n + 1).to_string()),
            Ok(7) => Ok("1".to_string()),
            Ok(n) => Err(format!("day-of-week {n} is out of range")),
            Err(_) => Ok(tok.to_string()),
        }
    };

    let mut parts = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((r, s)) => (r, Some(s)),
            None => (part, None),
        };
        let mapped = match range.split_once('-') {
            Some((lo, hi)) => format!("{}-{}", shift(lo)?, shift(hi)?),
            None => shift(range)?,
        };
        parts.push(match step {
            Some(s) => format!("{mapped}/{s}"),
            None => mapped,
        });
    }
    Ok(parts.join(","))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn daily_at_six() {
        let s = CronSchedule::parse("0 6 * * *", Tz::UTC).unwrap();
        let next = s.next_after(utc(2026, 1, 19, 10, 30)).unwrap();
        assert_eq!(next, utc(2026, 1, 20, 6, 0));
    }

    #[test]
    fn respects_timezone() {
        let s = CronSchedule::parse("0 9 * * *", "Australia/Sydney".parse().unwrap()).unwrap();
        // 9am AEDT (UTC+11) on 20 Jan.
        let next = s.next_after(utc(2026, 1, 19, 20, 0)).unwrap();
        assert_eq!(next, utc(2026, 1, 19, 22, 0));
    }

    #[test]
    fn unix_weekday_numbers() {
        // 2026-01-19 is a Monday.
        let s = CronSchedule::parse("0 8 * * 1", Tz::UTC).unwrap();
        assert_eq!(
            s.next_after(utc(2026, 1, 18, 0, 0)).unwrap(),
            utc(2026, 1, 19, 8, 0)
        );

        let s = CronSchedule::parse("0 8 * * 0", Tz::UTC).unwrap();
        assert_eq!(
            s.next_after(utc(2026, 1, 19, 0, 0)).unwrap(),
            utc(2026, 1, 25, 8, 0)
        );

        let s = CronSchedule::parse("0 8 * * 1-5", Tz::UTC).unwrap();
        assert_eq!(
            s.next_after(utc(2026, 1, 23, 9, 0)).unwrap(),
            utc(2026, 1, 26, 8, 0)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(CronSchedule::parse("not a cron", Tz::UTC).is_err());
        assert!(CronSchedule::parse("", Tz::UTC).is_err());
        assert!(CronSchedule::parse("0 6 * * 9", Tz::UTC).is_err());
    }
}
