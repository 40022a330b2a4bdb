//! Scheduling surface of the workflow
//!
//! The interval, catch-up flag and retry policy are declared once and apply
//! to every task. Intervals are aligned to the Unix epoch in UTC: hourly runs
//! cover `[hh:00, hh+1:00)`, daily runs cover a UTC calendar day. A run's
//! logical date is the start of the interval it covers, and the run becomes
//! due once that interval has ended.

use chrono::{DateTime, Duration as TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How often the workflow runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScheduleInterval {
    Hourly,
    Daily,
    /// Every `n` minutes
    Minutes(u32),
}

impl ScheduleInterval {
    pub fn period(&self) -> TimeDelta {
        match self {
            ScheduleInterval::Hourly => TimeDelta::hours(1),
            ScheduleInterval::Daily => TimeDelta::days(1),
            ScheduleInterval::Minutes(n) => TimeDelta::minutes(i64::from(*n)),
        }
    }

    /// Latest interval boundary at or before `t`
    pub fn floor(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period().num_seconds();
        let secs = t.timestamp();
        let floored = secs - secs.rem_euclid(period);
        DateTime::from_timestamp(floored, 0).unwrap_or(t)
    }
}

impl TryFrom<String> for ScheduleInterval {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let raw = value.trim().trim_start_matches('@').to_ascii_lowercase();
        match raw.as_str() {
            "hourly" => return Ok(ScheduleInterval::Hourly),
            "daily" => return Ok(ScheduleInterval::Daily),
            _ => {}
        }
        let invalid = || format!("invalid schedule interval '{}'", value);
        let Some((split, _)) = raw.char_indices().last() else {
            return Err(invalid());
        };
        let (digits, unit) = raw.split_at(split);
        let n: u32 = digits.parse().map_err(|_| invalid())?;
        let minutes = match unit {
            "m" => n,
            "h" => n.checked_mul(60).ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };
        if minutes == 0 {
            return Err(invalid());
        }
        Ok(ScheduleInterval::Minutes(minutes))
    }
}

impl From<ScheduleInterval> for String {
    fn from(value: ScheduleInterval) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ScheduleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleInterval::Hourly => f.write_str("hourly"),
            ScheduleInterval::Daily => f.write_str("daily"),
            ScheduleInterval::Minutes(n) => write!(f, "{}m", n),
        }
    }
}

/// Attempts granted to every task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub retries: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total number of attempts a task may make
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(180))
    }
}

/// When and how the workflow runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub interval: ScheduleInterval,
    /// Backfill every missed interval instead of only the latest one
    pub catchup: bool,
    /// No interval starting before this is ever scheduled
    pub start_date: Option<DateTime<Utc>>,
    pub retry: RetryPolicy,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval: ScheduleInterval::Hourly,
            catchup: false,
            start_date: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl Schedule {
    /// Logical date of the most recent completed interval at `now`
    pub fn latest_logical_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let latest = self.interval.floor(now) - self.interval.period();
        match self.start_date {
            Some(start) if latest < start => None,
            _ => Some(latest),
        }
    }

    /// Wall-clock time of the next run strictly after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.interval.period();
        let mut next = self.interval.floor(now) + period;
        if let Some(first) = self.first_interval() {
            // The first run fires when the first full interval after the start date ends.
            next = next.max(first + period);
        }
        next
    }

    /// Start of the first interval at or after the start date
    fn first_interval(&self) -> Option<DateTime<Utc>> {
        self.start_date.map(|start| {
            let floored = self.interval.floor(start);
            if floored < start {
                floored + self.interval.period()
            } else {
                floored
            }
        })
    }

    /// Logical dates that are due at `now`, given the last one already run
    ///
    /// Without catch-up only the latest completed interval is returned.
    pub fn due_runs(
        &self,
        last_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let Some(latest) = self.latest_logical_date(now) else {
            return Vec::new();
        };
        if last_run.is_some_and(|last| last >= latest) {
            return Vec::new();
        }
        if !self.catchup {
            return vec![latest];
        }

        let period = self.interval.period();
        let first = self.first_interval();
        let mut cursor = match (last_run, first) {
            (Some(last), Some(first)) => (self.interval.floor(last) + period).max(first),
            (Some(last), None) => self.interval.floor(last) + period,
            (None, Some(first)) => first,
            (None, None) => latest,
        };

        let mut due = Vec::new();
        while cursor <= latest {
            due.push(cursor);
            cursor += period;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 11, 3, h, m, 0).unwrap()
    }

    #[test]
    fn test_interval_parsing() {
        for (raw, expected) in [
            ("@hourly", ScheduleInterval::Hourly),
            ("hourly", ScheduleInterval::Hourly),
            ("Daily", ScheduleInterval::Daily),
            ("15m", ScheduleInterval::Minutes(15)),
            ("2h", ScheduleInterval::Minutes(120)),
        ] {
            assert_eq!(ScheduleInterval::try_from(raw.to_string()).unwrap(), expected);
        }
        for raw in ["", "weekly", "0m", "m", "5s", "-3m"] {
            assert!(ScheduleInterval::try_from(raw.to_string()).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_floor() {
        assert_eq!(ScheduleInterval::Hourly.floor(at(10, 5)), at(10, 0));
        assert_eq!(ScheduleInterval::Hourly.floor(at(10, 0)), at(10, 0));
        assert_eq!(ScheduleInterval::Minutes(15).floor(at(10, 44)), at(10, 30));
        assert_eq!(ScheduleInterval::Daily.floor(at(10, 44)), at(0, 0));
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay, Duration::from_secs(180));
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }

    #[test]
    fn test_latest_logical_date() {
        let schedule = Schedule::default();
        assert_eq!(schedule.latest_logical_date(at(10, 5)), Some(at(9, 0)));

        let late_start = Schedule {
            start_date: Some(at(10, 0)),
            ..Schedule::default()
        };
        assert_eq!(late_start.latest_logical_date(at(10, 5)), None);
        assert_eq!(late_start.latest_logical_date(at(11, 0)), Some(at(10, 0)));
    }

    #[test]
    fn test_next_run_after() {
        let schedule = Schedule::default();
        assert_eq!(schedule.next_run_after(at(10, 5)), at(11, 0));
        assert_eq!(schedule.next_run_after(at(10, 0)), at(11, 0));

        let mid_hour_start = Schedule {
            start_date: Some(at(12, 30)),
            ..Schedule::default()
        };
        assert_eq!(mid_hour_start.next_run_after(at(10, 5)), at(14, 0));
    }

    #[test]
    fn test_without_catchup_only_latest_is_due() {
        let schedule = Schedule {
            start_date: Some(at(0, 0)),
            ..Schedule::default()
        };
        assert_eq!(schedule.due_runs(Some(at(2, 0)), at(6, 10)), vec![at(5, 0)]);
        assert!(schedule.due_runs(Some(at(5, 0)), at(6, 10)).is_empty());
    }

    #[test]
    fn test_catchup_backfills_missed_intervals() {
        let schedule = Schedule {
            catchup: true,
            start_date: Some(at(0, 0)),
            ..Schedule::default()
        };
        assert_eq!(
            schedule.due_runs(Some(at(2, 0)), at(6, 10)),
            vec![at(3, 0), at(4, 0), at(5, 0)]
        );
        assert_eq!(schedule.due_runs(None, at(2, 10)).len(), 2);
    }

    #[test]
    fn test_catchup_never_runs_before_the_start_date() {
        let schedule = Schedule {
            catchup: true,
            start_date: Some(at(5, 0)),
            ..Schedule::default()
        };
        assert_eq!(
            schedule.due_runs(Some(at(1, 0)), at(7, 10)),
            vec![at(5, 0), at(6, 0)]
        );

        let unaligned = Schedule {
            start_date: Some(at(4, 30)),
            ..schedule
        };
        assert_eq!(
            unaligned.due_runs(Some(at(1, 0)), at(7, 10)),
            vec![at(5, 0), at(6, 0)]
        );
    }
}
