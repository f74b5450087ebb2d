//! Data model tests: status state machine, parsing, builder.

use courier_rs::model::{ChannelId, ConnectivityState, Status};

// ---------------------------------------------------------------------------
// Status state machine
// ---------------------------------------------------------------------------

#[test]
fn legal_transitions() {
    assert!(Status::Pending.can_transition_to(Status::Processing));
    assert!(Status::Processing.can_transition_to(Status::Sent));
    assert!(Status::Processing.can_transition_to(Status::Pending)); // retry / release
    assert!(Status::Processing.can_transition_to(Status::Failed));
}

#[test]
fn terminal_states_have_no_exits() {
    for from in [Status::Sent, Status::Failed] {
        for to in [
            Status::Pending,
            Status::Processing,
            Status::Sent,
            Status::Failed,
        ] {
            assert!(
                !from.can_transition_to(to),
                "{from} -> {to} must be illegal"
            );
        }
    }
}

#[test]
fn no_shortcut_from_pending_to_terminal() {
    assert!(!Status::Pending.can_transition_to(Status::Sent));
    assert!(!Status::Pending.can_transition_to(Status::Failed));
    assert!(!Status::Pending.can_transition_to(Status::Pending));
}

#[test]
fn terminal_statuses() {
    assert!(Status::Sent.is_terminal());
    assert!(Status::Failed.is_terminal());
    assert!(!Status::Pending.is_terminal());
    assert!(!Status::Processing.is_terminal());
}

#[test]
fn status_display_parse_roundtrip() {
    for status in [
        Status::Pending,
        Status::Processing,
        Status::Sent,
        Status::Failed,
    ] {
        let parsed: Status = status.to_string().parse().unwrap();
        assert_eq!(parsed, status);
    }
}

#[test]
fn unknown_status_fails_to_parse() {
    assert!("queued".parse::<Status>().is_err());
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

#[test]
fn sendable_states() {
    assert!(ConnectivityState::Connected.is_sendable());
    assert!(ConnectivityState::Degraded.is_sendable());
    assert!(!ConnectivityState::Disconnected.is_sendable());
    assert!(!ConnectivityState::MaxRetriesReached.is_sendable());
}

#[test]
fn connectivity_display_parse_roundtrip() {
    for state in [
        ConnectivityState::Disconnected,
        ConnectivityState::Connected,
        ConnectivityState::Degraded,
        ConnectivityState::MaxRetriesReached,
    ] {
        let parsed: ConnectivityState = state.to_string().parse().unwrap();
        assert_eq!(parsed, state);
    }
}

// ---------------------------------------------------------------------------
// Channel ids
// ---------------------------------------------------------------------------

#[test]
fn channel_id_from_str_and_display() {
    let id = ChannelId::from("primary-email");
    assert_eq!(id.as_str(), "primary-email");
    assert_eq!(id.to_string(), "primary-email");
    assert_eq!(id, ChannelId::from("primary-email".to_string()));
}
