//! Cron evaluation in a named timezone.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;

use crate::error::ScheduleError;
use crate::models::Schedule;

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

/// Parse a 5-field cron expression (minute hour day-of-month month day-of-week).
pub fn parse_cron(expr: &str) -> Result<Cron, ScheduleError> {
    Cron::new(expr.trim())
        .parse()
        .map_err(|e| ScheduleError::InvalidCronExpression {
            expr: expr.to_string(),
            reason: e.to_string(),
        })
}

/// Next fire time strictly after `now`, evaluated in `timezone` and returned in UTC.
///
/// Pure: identical inputs always give identical output.
pub fn next_run_at(
    cron: &str,
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let tz = parse_timezone(timezone)?;
    let schedule = parse_cron(cron)?;
    let local_now = now.with_timezone(&tz);

    let next = schedule
        .find_next_occurrence(&local_now, false)
        .map_err(|e| ScheduleError::InvalidCronExpression {
            expr: cron.to_string(),
            reason: e.to_string(),
        })?;

    Ok(next.with_timezone(&Utc))
}

/// Convenience wrapper over [`next_run_at`] for a stored schedule.
pub fn next_run_for(schedule: &Schedule, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    next_run_at(&schedule.cron, &schedule.timezone, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, TimeZone, Timelike, Weekday};

    #[test]
    fn test_weekly_monday_new_york() {
        // Wednesday 2024-03-06 12:00 UTC.
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap();
        let next = next_run_at("0 9 * * 1", "America/New_York", now).unwrap();

        // Monday 2024-03-11 09:00 EDT (DST started 2024-03-10) is 13:00 UTC.
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 13, 0, 0).unwrap());

        let local = next.with_timezone(&chrono_tz::America::New_York);
        assert_eq!(local.weekday(), Weekday::Mon);
        assert_eq!(local.hour(), 9);
    }

    #[test]
    fn test_weekly_monday_new_york_standard_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let next = next_run_at("0 9 * * 1", "America/New_York", now).unwrap();
        // EST is UTC-5.
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 8, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_next_run_is_strictly_after_now() {
        // Exactly on a fire time: the same instant must not be returned.
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let next = next_run_at("0 10 * * *", "UTC", now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap());

        for expr in ["* * * * *", "*/5 * * * *", "30 2 1 * *", "0 0 * * 0"] {
            for tz in ["UTC", "Europe/Berlin", "Asia/Kolkata", "America/Los_Angeles"] {
                let next = next_run_at(expr, tz, now).unwrap();
                assert!(next > now, "{} in {} gave {}", expr, tz, next);
            }
        }
    }

    #[test]
    fn test_next_run_is_deterministic() {
        let now = Utc::now();
        let a = next_run_at("15 6 * * 1-5", "Europe/Paris", now).unwrap();
        let b = next_run_at("15 6 * * 1-5", "Europe/Paris", now).unwrap();
        assert_eq!(a, b);
        assert!(a - now <= Duration::days(4));
    }

    #[test]
    fn test_invalid_timezone() {
        let err = next_run_at("0 9 * * 1", "Mars/Base", Utc::now()).unwrap_err();
        assert_eq!(err, ScheduleError::InvalidTimezone("Mars/Base".into()));
    }

    #[test]
    fn test_invalid_cron_expression() {
        for expr in ["not a cron", "61 * * * *", "* * * *", ""] {
            let err = next_run_at(expr, "UTC", Utc::now()).unwrap_err();
            assert!(
                matches!(err, ScheduleError::InvalidCronExpression { .. }),
                "{} should be rejected",
                expr
            );
        }
    }

    #[test]
    fn test_timezone_checked_before_cron() {
        let err = next_run_at("garbage", "Nowhere/Town", Utc::now()).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTimezone(_)));
    }
}
