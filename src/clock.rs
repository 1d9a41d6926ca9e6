use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Injectable time source so "now" and "today" are controllable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Calendar day of `at` in the deployment's reference timezone.
pub fn local_day(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// Last instant recorded for a local day, 23:59:59.999 local wall-clock time.
pub fn local_end_of_day(day: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let end = day.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::milliseconds(1);
    local_to_utc(end, offset)
}

/// Sleep budget until the next local midnight, for the sweep scheduler.
pub fn until_next_local_midnight(now: DateTime<Utc>, offset: FixedOffset) -> std::time::Duration {
    let next_midnight = (local_day(now, offset) + Duration::days(1)).and_time(NaiveTime::MIN);
    (local_to_utc(next_midnight, offset) - now)
        .to_std()
        .unwrap_or_default()
}

// Fixed offsets have no gaps or folds, so local wall-clock times map to
// exactly one UTC instant.
fn local_to_utc(local: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(offset.local_minus_utc()))))
}

#[cfg(test)]
pub struct FixedClock(std::sync::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl FixedClock {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self(std::sync::Mutex::new(at))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    #[test]
    fn local_day_rolls_over_before_utc_midnight() {
        // 19:30 UTC is already 01:00 the next day at +05:30.
        let at = Utc.with_ymd_and_hms(2026, 8, 24, 19, 30, 0).unwrap();
        assert_eq!(
            local_day(at, ist()),
            NaiveDate::from_ymd_opt(2026, 8, 25).unwrap()
        );

        let at = Utc.with_ymd_and_hms(2026, 8, 24, 18, 0, 0).unwrap();
        assert_eq!(
            local_day(at, ist()),
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap()
        );
    }

    #[test]
    fn end_of_day_is_last_local_millisecond() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let end = local_end_of_day(day, ist());

        // 23:59:59.999 at +05:30 is 18:29:59.999 UTC.
        let expected = Utc
            .with_ymd_and_hms(2026, 8, 24, 18, 29, 59)
            .unwrap()
            .checked_add_signed(Duration::milliseconds(999))
            .unwrap();
        assert_eq!(end, expected);
        assert_eq!(local_day(end, ist()), day);
        assert_eq!(
            local_day(end + Duration::milliseconds(1), ist()),
            NaiveDate::from_ymd_opt(2026, 8, 25).unwrap()
        );
    }

    #[test]
    fn midnight_sleep_spans_the_remaining_local_day() {
        // 20:00 UTC = 01:30 local; next local midnight is 22.5h away.
        let now = Utc.with_ymd_and_hms(2026, 8, 24, 20, 0, 0).unwrap();
        let sleep = until_next_local_midnight(now, ist());
        assert_eq!(sleep, std::time::Duration::from_secs(22 * 3600 + 1800));
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2026, 8, 24, 9, 0, 0).unwrap());
        let before = clock.now();
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now() - before, Duration::minutes(90));
    }
}
