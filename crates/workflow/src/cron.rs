//! Standard 5-field cron expressions: `minute hour day-of-month month day-of-week`.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use std::fmt;

/// A parsed cron expression. Every field holds its sorted, deduplicated values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>, // 0=Sun, 6=Sat
}

impl CronExpr {
    /// Parse a 5-field expression.
    ///
    /// Supports: `*`, `*/N` (step), `N` (literal), `N-M` (range),
    /// `N-M/S` (stepped range), `N,M` (list).
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "Expected 5 fields (minute hour dom month dow), got {}",
                fields.len()
            ));
        }

        Ok(CronExpr {
            source: fields.join(" "),
            minutes: parse_field("minute", fields[0], 0, 59)?,
            hours: parse_field("hour", fields[1], 0, 23)?,
            days_of_month: parse_field("day-of-month", fields[2], 1, 31)?,
            months: parse_field("month", fields[3], 1, 12)?,
            days_of_week: parse_field("day-of-week", fields[4], 0, 6)?,
        })
    }

    /// Whether `dt` falls in a minute this expression selects.
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.matches_day(dt)
            && self.hours.contains(&dt.hour())
            && self.minutes.contains(&dt.minute())
    }

    /// The first matching minute strictly after `after`, searched one year ahead.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        for offset in 0..=366 {
            let day = start.date_naive() + Duration::days(offset);
            let midnight = day.and_time(NaiveTime::MIN).and_utc();
            if !self.matches_day(&midnight) {
                continue;
            }
            for &hour in &self.hours {
                for &minute in &self.minutes {
                    let candidate = day.and_hms_opt(hour, minute, 0)?.and_utc();
                    if candidate >= start {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    fn matches_day(&self, dt: &DateTime<Utc>) -> bool {
        self.days_of_month.contains(&dt.day())
            && self.months.contains(&dt.month())
            && self.days_of_week.contains(&dt.weekday().num_days_from_sunday())
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for CronExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_field(name: &str, field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
    let mut values = Vec::new();
    for part in field.split(',') {
        values.extend(parse_part(part.trim(), min, max).map_err(|e| format!("{name}: {e}"))?);
    }

    values.sort_unstable();
    values.dedup();
    if values.is_empty() {
        return Err(format!("{name}: field produced no values"));
    }
    Ok(values)
}

fn parse_part(part: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
    if let Some((base, step)) = part.split_once('/') {
        let step: u32 = step.parse().map_err(|_| format!("invalid step '{step}'"))?;
        if step == 0 {
            return Err("step cannot be zero".into());
        }
        let (start, end) = if base == "*" {
            (min, max)
        } else if base.contains('-') {
            parse_range(base, min, max)?
        } else {
            (parse_value(base, min, max)?, max)
        };
        return Ok((start..=end).step_by(step as usize).collect());
    }

    if part == "*" {
        return Ok((min..=max).collect());
    }

    if part.contains('-') {
        let (start, end) = parse_range(part, min, max)?;
        return Ok((start..=end).collect());
    }

    Ok(vec![parse_value(part, min, max)?])
}

fn parse_range(s: &str, min: u32, max: u32) -> Result<(u32, u32), String> {
    let (start, end) = s.split_once('-').ok_or_else(|| format!("invalid range '{s}'"))?;
    let start = parse_value(start, min, max)?;
    let end = parse_value(end, min, max)?;
    if start > end {
        return Err(format!("range {start}-{end} is reversed"));
    }
    Ok((start, end))
}

fn parse_value(s: &str, min: u32, max: u32) -> Result<u32, String> {
    let v: u32 = s.parse().map_err(|_| format!("invalid number '{s}'"))?;
    if v < min || v > max {
        return Err(format!("{v} out of range {min}-{max}"));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn every_minute() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        assert_eq!(expr.minutes.len(), 60);
        assert_eq!(expr.hours.len(), 24);
    }

    #[test]
    fn weekday_mornings() {
        let expr = CronExpr::parse("30 9 * * 1-5").unwrap();
        assert_eq!(expr.minutes, vec![30]);
        assert_eq!(expr.hours, vec![9]);
        assert_eq!(expr.days_of_week, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn steps_and_lists() {
        assert_eq!(CronExpr::parse("*/15 * * * *").unwrap().minutes, vec![0, 15, 30, 45]);
        assert_eq!(CronExpr::parse("0,30 * * * *").unwrap().minutes, vec![0, 30]);
        assert_eq!(CronExpr::parse("10-20/5 * * * *").unwrap().minutes, vec![10, 15, 20]);
        assert_eq!(CronExpr::parse("0 0,12,0 * * *").unwrap().hours, vec![0, 12]);
    }

    #[test]
    fn matches_datetime() {
        let expr = CronExpr::parse("30 9 * * 1-5").unwrap();

        // 2026-02-23 is a Monday, 2026-02-22 a Sunday
        assert!(expr.matches(&at(2026, 2, 23, 9, 30)));
        assert!(!expr.matches(&at(2026, 2, 22, 9, 30)));
        assert!(!expr.matches(&at(2026, 2, 23, 10, 0)));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(CronExpr::parse("* * *").is_err());
        assert!(CronExpr::parse("70 * * * *").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err());
        assert!(CronExpr::parse("5-1 * * * *").is_err());
        assert!(CronExpr::parse("0 3 * * mon").is_err());
    }

    #[test]
    fn errors_name_the_field() {
        let err = CronExpr::parse("0 25 * * *").unwrap_err();
        assert!(err.starts_with("hour:"), "{err}");
    }

    #[test]
    fn next_run_of_daily_job() {
        let expr = CronExpr::parse("0 3 * * *").unwrap();
        assert_eq!(expr.next_after(&at(2024, 6, 15, 2, 59)), Some(at(2024, 6, 15, 3, 0)));
        // Strictly after: the matching minute itself rolls to the next day
        assert_eq!(expr.next_after(&at(2024, 6, 15, 3, 0)), Some(at(2024, 6, 16, 3, 0)));
    }

    #[test]
    fn next_run_crosses_month_boundaries() {
        let expr = CronExpr::parse("15 6 1 * *").unwrap();
        assert_eq!(expr.next_after(&at(2024, 1, 31, 12, 0)), Some(at(2024, 2, 1, 6, 15)));
    }

    #[test]
    fn impossible_date_has_no_next_run() {
        let expr = CronExpr::parse("0 0 31 2 *").unwrap();
        assert_eq!(expr.next_after(&at(2024, 1, 1, 0, 0)), None);
    }

    #[test]
    fn display_normalises_whitespace() {
        let expr: CronExpr = "  0   3 * *  * ".parse().unwrap();
        assert_eq!(expr.to_string(), "0 3 * * *");
    }
}
