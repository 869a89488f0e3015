//! Anchor time calculator.
//!
//! Computes the recurring instant a cycle revolves around ("game time").
//! Everything here is pure: callers pass the reference instant and the zone.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz};
use serde::{Deserialize, Serialize};

/// Which recurring anchor a workflow uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorRule {
    /// Saturday 10:00 local, every week.
    SaturdayAt10,
    /// Saturday 10:00 local while daylight saving is in effect, 10:30 otherwise.
    SaturdayAt10Or1030,
}

impl AnchorRule {
    pub fn next_after(self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        match self {
            AnchorRule::SaturdayAt10 => next_saturday_at_10(now, tz),
            AnchorRule::SaturdayAt10Or1030 => next_saturday_at_10_or_1030(now, tz),
        }
    }
}

/// Next Saturday at 10:00 local. Exactly 10:00 on a Saturday returns that instant.
pub fn next_saturday_at_10(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    next_saturday_matching(now, tz, |_| (10, 0))
}

/// Next Saturday at 10:00 if that instant observes DST, else 10:30.
///
/// DST is decided on the returned instant, not on `now`, so a reference time
/// just before a fall-back weekend still lands on 10:30.
pub fn next_saturday_at_10_or_1030(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    next_saturday_matching(now, tz, |date| {
        if is_dst(local_instant(tz, date, 10, 0)) {
            (10, 0)
        } else {
            (10, 30)
        }
    })
}

/// 06:00 local on the calendar day of `t`.
pub fn day_of_at_6am(t: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let date = t.with_timezone(&tz).date_naive();
    local_instant(tz, date, 6, 0).with_timezone(&Utc)
}

/// Whether `t` falls inside daylight saving time in its zone.
pub fn is_dst(t: DateTime<Tz>) -> bool {
    t.offset().dst_offset() != Duration::zero()
}

fn next_saturday_matching(
    now: DateTime<Utc>,
    tz: Tz,
    time_of_day: impl Fn(NaiveDate) -> (u32, u32),
) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let days_until_saturday = 6 - i64::from(local.weekday().num_days_from_sunday());
    let mut date = local.date_naive() + Duration::days(days_until_saturday);

    let (hour, minute) = time_of_day(date);
    let mut target = local_instant(tz, date, hour, minute);
    if target < local {
        // Saturday already, but past the target time.
        date += Duration::days(7);
        let (hour, minute) = time_of_day(date);
        target = local_instant(tz, date, hour, minute);
    }
    target.with_timezone(&Utc)
}

/// Resolve a local wall-clock time on `date`.
///
/// Ambiguous times take the earlier instant; times inside a spring-forward
/// gap move forward by an hour.
fn local_instant(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> DateTime<Tz> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let naive = NaiveDateTime::new(date, time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Denver;

    fn denver(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Denver
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn spring_forward_gap_moves_forward() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let t = local_instant(Denver, date, 2, 30);
        assert_eq!(t.with_timezone(&Utc), denver(2024, 3, 10, 3, 30, 0));
    }

    #[test]
    fn six_am_uses_local_calendar_day() {
        // 23:30 local on a Friday is already Saturday in UTC.
        let late_friday = denver(2023, 9, 29, 23, 30, 0);
        assert_eq!(day_of_at_6am(late_friday, Denver), denver(2023, 9, 29, 6, 0, 0));
    }
}
