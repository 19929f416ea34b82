//! Standard 5-field cron expression handling.
//!
//! The `cron` crate wants a seconds field; user-facing expressions are the
//! classic 5-field form (minute hour day month weekday), so `0` seconds is
//! prepended before parsing. Anything other than exactly five fields is
//! rejected at the boundary.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

/// Parse a 5-field cron expression.
pub fn parse(expr: &str) -> Result<Schedule> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(SchedulerError::InvalidCronExpr(format!(
            "expected 5 fields (minute hour day month weekday), got {}",
            fields.len()
        )));
    }
    let with_seconds = format!("0 {}", fields.join(" "));
    Schedule::from_str(&with_seconds)
        .map_err(|e| SchedulerError::InvalidCronExpr(format!("{expr}: {e}")))
}

/// True when the expression parses as 5-field cron.
pub fn is_valid(expr: &str) -> bool {
    parse(expr).is_ok()
}

/// First cron-valid instant strictly after `after`.
pub fn next_after(expr: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let schedule = parse(expr)?;
    Ok(schedule.after(&after).next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_standard_expressions() {
        for expr in ["* * * * *", "*/5 * * * *", "0 9 * * 1-5", "30 2 1 * *"] {
            assert!(is_valid(expr), "{expr} should be valid");
        }
    }

    #[test]
    fn rejects_wrong_field_counts_and_garbage() {
        for expr in ["* * * *", "0 * * * * *", "not a cron", "", "61 * * * *"] {
            assert!(!is_valid(expr), "{expr} should be invalid");
        }
    }

    #[test]
    fn next_is_strictly_after() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let next = next_after("*/1 * * * *", now).unwrap().unwrap();
        assert!(next > now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 1, 12, 1, 0).unwrap());
    }

    #[test]
    fn daily_nine_am() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
        let next = next_after("0 9 * * *", now).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap());
    }
}
