use crate::cursor::EventCursor;
use crate::subscription::filter::SubscriptionFilter;
use serde_json::json;

use super::*;

// ── ConnectionOptions ──

#[test]
fn test_connection_options_default() {
    let opts = ConnectionOptions::default();

    assert!(opts.auto_reconnect, "auto_reconnect should default to true");
    assert_eq!(opts.reconnect_delay_ms, 1000);
    assert_eq!(opts.max_reconnect_delay_ms, 30000);
    assert_eq!(
        opts.max_reconnect_attempts,
        Some(10),
        "max_reconnect_attempts should default to a finite budget"
    );
    assert_eq!(opts.backoff_jitter_ms, 1000);
    assert_eq!(opts.server_retry_jitter_ms, 500);
    assert!(opts.compression_heuristic);
}

#[test]
fn test_connection_options_builder_pattern() {
    let opts = ConnectionOptions::new()
        .with_auto_reconnect(false)
        .with_reconnect_delay_ms(2000)
        .with_max_reconnect_delay_ms(60000)
        .with_max_reconnect_attempts(None)
        .with_compression_heuristic(false)
        .with_event_channel_capacity(0);

    assert!(!opts.auto_reconnect);
    assert_eq!(opts.reconnect_delay_ms, 2000);
    assert_eq!(opts.max_reconnect_delay_ms, 60000);
    assert!(opts.max_reconnect_attempts.is_none());
    assert!(!opts.compression_heuristic);
    assert_eq!(opts.event_channel_capacity, 1, "capacity is clamped to at least 1");
}

#[test]
fn test_connection_options_partial_deserialization() {
    let opts: ConnectionOptions = serde_json::from_str(r#"{"reconnect_delay_ms": 250}"#).unwrap();

    assert_eq!(opts.reconnect_delay_ms, 250);
    assert!(opts.auto_reconnect);
    assert_eq!(opts.max_reconnect_attempts, Some(10));

    let unlimited: ConnectionOptions =
        serde_json::from_str(r#"{"max_reconnect_attempts": null}"#).unwrap();
    assert!(unlimited.max_reconnect_attempts.is_none());
}

// ── SubscriptionRequest ──

#[test]
fn test_subscription_request_wire_format() {
    let filter = SubscriptionFilter::new()
        .with_providers(["aws"])
        .with_regions(["us-east-1"]);
    let req = SubscriptionRequest::new("vm-status", Some(&filter));

    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(
        value,
        json!({
            "event_type": "vm-status",
            "filters": {"providers": ["aws"], "regions": ["us-east-1"]}
        })
    );
}

#[test]
fn test_subscription_request_omits_empty_filter() {
    let req = SubscriptionRequest::new("vm-status", Some(&SubscriptionFilter::new()));
    assert!(req.filters.is_none());

    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value, json!({"event_type": "vm-status"}));
}

// ==================== RawFrame / StreamEvent Tests ====================

#[test]
fn test_raw_frame_cursor() {
    let frame = RawFrame::data("vm-status", "{}").with_id("42");
    assert_eq!(frame.cursor(), Some(EventCursor::new("42")));
    assert!(!frame.is_connected_event());

    let blank = RawFrame::data("vm-status", "{}").with_id("   ");
    assert!(blank.cursor().is_none());
}

#[test]
fn test_connected_info_parse() {
    let info: ConnectedInfo = serde_json::from_value(json!({
        "connection_id": "abc-123",
        "message": "SSE connection established",
        "timestamp": 1700000000
    }))
    .unwrap();

    assert_eq!(info.connection_id, "abc-123");
    assert_eq!(info.timestamp, Some(1700000000));

    let minimal: ConnectedInfo =
        serde_json::from_value(json!({"connection_id": "abc"})).unwrap();
    assert!(minimal.message.is_none());
}

#[test]
fn test_stream_event_serialization() {
    let event = StreamEvent::new("vm-status", Some(EventCursor::new("7")), json!({"vmId": "vm-1"}));
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({"event_type": "vm-status", "cursor": "7", "data": {"vmId": "vm-1"}})
    );
}

#[test]
fn test_session_identity_display() {
    let session = SessionIdentity::new("conn-1", 3);
    assert_eq!(session.to_string(), "conn-1 (gen 3)");
    assert_eq!(session.as_str(), "conn-1");
}
