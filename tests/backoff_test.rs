//! Backoff policy tests. The policy is pure — no store, no clock.

use chrono::Duration;
use courier_rs::backoff::{BackoffPolicy, FailureKind, RetryDecision};

#[test]
fn default_table_matches_schedule() {
    let policy = BackoffPolicy::default();
    let delays: Vec<i64> = (1..=5).map(|n| policy.delay(n).num_seconds()).collect();
    assert_eq!(delays, vec![5, 15, 30, 60, 120]);
}

#[test]
fn delay_clamps_beyond_table() {
    let policy = BackoffPolicy::default();
    assert_eq!(policy.delay(6).num_seconds(), 120);
    assert_eq!(policy.delay(100).num_seconds(), 120);
}

#[test]
fn delay_treats_zero_as_first_attempt() {
    let policy = BackoffPolicy::default();
    assert_eq!(policy.delay(0).num_seconds(), 5);
}

#[test]
fn terminal_at_max_attempts() {
    let policy = BackoffPolicy::default();
    assert!(!policy.is_terminal(4, None));
    assert!(policy.is_terminal(5, None));
    assert!(policy.is_terminal(6, None));
}

#[test]
fn per_message_override_wins() {
    let policy = BackoffPolicy::default();
    assert!(policy.is_terminal(2, Some(2)));
    assert!(!policy.is_terminal(5, Some(10)));
}

#[test]
fn connectivity_failure_is_released_not_retried() {
    let policy = BackoffPolicy::default();
    // Regardless of how many attempts the message already burned.
    for attempts in [0, 3, 99] {
        assert_eq!(
            policy.decide(FailureKind::Connectivity, attempts, None),
            RetryDecision::Release
        );
    }
}

#[test]
fn delivery_failures_walk_the_table_then_fail() {
    let policy = BackoffPolicy::default();

    let mut scheduled = Vec::new();
    for attempts_before in 0..4 {
        match policy.decide(FailureKind::Delivery, attempts_before, None) {
            RetryDecision::Retry { delay } => scheduled.push(delay.num_seconds()),
            other => panic!("attempt {} should retry, got {other:?}", attempts_before + 1),
        }
    }
    assert_eq!(scheduled, vec![5, 15, 30, 60]);

    // Fifth failure exhausts the budget.
    assert_eq!(
        policy.decide(FailureKind::Delivery, 4, None),
        RetryDecision::Fail
    );
}

#[test]
fn custom_table_clamps_to_its_own_tail() {
    let policy = BackoffPolicy::new(vec![Duration::seconds(1), Duration::seconds(2)], 10);
    assert_eq!(policy.delay(2).num_seconds(), 2);
    assert_eq!(policy.delay(9).num_seconds(), 2);
    assert_eq!(
        policy.decide(FailureKind::Delivery, 8, None),
        RetryDecision::Retry {
            delay: Duration::seconds(2)
        }
    );
    assert_eq!(
        policy.decide(FailureKind::Delivery, 9, None),
        RetryDecision::Fail
    );
}
