//! Daily quota accounting tests.

use chrono::{Duration, TimeZone, Utc};
use courier_rs::quota::QuotaTracker;

fn morning() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 6, 9, 0, 0).unwrap()
}

#[test]
fn allows_sends_up_to_the_cap() {
    let mut quota = QuotaTracker::new(3, morning());
    for _ in 0..3 {
        assert!(quota.check(morning()));
        quota.record_send();
    }
    assert!(!quota.check(morning()));
    assert_eq!(quota.count(), 3);
}

#[test]
fn same_day_does_not_reset() {
    let mut quota = QuotaTracker::new(1, morning());
    quota.record_send();

    // Even 14 hours later — still the same UTC calendar day.
    let evening = morning() + Duration::hours(14);
    assert!(!quota.check(evening));
}

#[test]
fn resets_when_the_calendar_day_rolls_over() {
    let mut quota = QuotaTracker::new(1, morning());
    assert!(quota.check(morning()));
    quota.record_send();
    assert!(!quota.check(morning()));

    // One minute past midnight UTC the next day.
    let next_day = Utc.with_ymd_and_hms(2026, 8, 7, 0, 1, 0).unwrap();
    assert!(quota.check(next_day));
    assert_eq!(quota.count(), 0);
}

#[test]
fn rollover_happens_even_across_many_days() {
    let mut quota = QuotaTracker::new(2, morning());
    quota.record_send();
    quota.record_send();
    assert!(!quota.check(morning()));

    assert!(quota.check(morning() + Duration::days(10)));
}

#[test]
fn zero_cap_never_sends() {
    let mut quota = QuotaTracker::new(0, morning());
    assert!(!quota.check(morning()));
    assert!(!quota.check(morning() + Duration::days(1)));
}
