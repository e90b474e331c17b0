use fleetlink_types::{NotificationEvent, NotificationPage, RealtimeMessage};
use pretty_assertions::assert_eq;

// ── RealtimeMessage parsing ──────────────────────────────────────

#[test]
fn parses_notification_new_with_minimal_payload() {
    let raw = r#"{"type":"notification.new","notification":{"id":"n9","title":"Low stock"}}"#;
    let msg = RealtimeMessage::parse(raw).unwrap();
    match msg {
        RealtimeMessage::NotificationNew { notification } => {
            assert_eq!(notification.id, "n9");
            assert_eq!(notification.title, "Low stock");
            assert_eq!(notification.message, "");
            assert!(!notification.is_read);
        }
        other => panic!("Expected NotificationNew, got {other:?}"),
    }
}

#[test]
fn parses_notification_new_with_full_payload() {
    let raw = r#"{
        "type": "notification.new",
        "notification": {
            "id": "n1",
            "title": "Service due",
            "message": "Truck 12 is due for service",
            "category": "maintenance",
            "is_read": true,
            "created_at": "2026-03-01T10:00:00Z"
        }
    }"#;
    let msg = RealtimeMessage::parse(raw).unwrap();
    let RealtimeMessage::NotificationNew { notification } = msg else {
        panic!("Expected NotificationNew");
    };
    assert_eq!(notification.category, "maintenance");
    assert!(notification.is_read);
    assert_eq!(notification.created_at.to_rfc3339(), "2026-03-01T10:00:00+00:00");
}

#[test]
fn accepts_camel_case_notification_fields() {
    let raw = r#"{"id":"n2","title":"t","isRead":true,"createdAt":"2026-01-01T00:00:00Z"}"#;
    let n: NotificationEvent = serde_json::from_str(raw).unwrap();
    assert!(n.is_read);
}

#[test]
fn parses_read_and_deleted() {
    let read = RealtimeMessage::parse(r#"{"type":"notification.read","id":"n1"}"#).unwrap();
    assert_eq!(read, RealtimeMessage::NotificationRead { id: Some("n1".into()) });

    let deleted =
        RealtimeMessage::parse(r#"{"type":"notification.deleted","notification_id":"n4"}"#)
            .unwrap();
    assert_eq!(deleted, RealtimeMessage::NotificationDeleted { id: Some("n4".into()) });
}

#[test]
fn read_without_id_is_still_recognised() {
    let msg = RealtimeMessage::parse(r#"{"type":"notification.read"}"#).unwrap();
    assert_eq!(msg, RealtimeMessage::NotificationRead { id: None });
}

#[test]
fn unknown_type_falls_back_to_unknown() {
    let msg = RealtimeMessage::parse(r#"{"type":"work_order.updated","id":"w1"}"#).unwrap();
    assert_eq!(msg, RealtimeMessage::Unknown);
    assert_eq!(msg.kind(), "unknown");
}

#[test]
fn malformed_json_is_an_error() {
    assert!(RealtimeMessage::parse("{not json").is_err());
}

#[test]
fn missing_type_is_an_error() {
    assert!(RealtimeMessage::parse(r#"{"notification":{"id":"n1","title":"x"}}"#).is_err());
}

#[test]
fn known_type_with_bad_payload_is_an_error() {
    let raw = r#"{"type":"notification.new","notification":{"title":"no id"}}"#;
    assert!(RealtimeMessage::parse(raw).is_err());
}

#[test]
fn kind_matches_wire_discriminator() {
    let msg = RealtimeMessage::NotificationNew {
        notification: NotificationEvent::new("n1", "t"),
    };
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], msg.kind());
}

// ── NotificationPage ─────────────────────────────────────────────

#[test]
fn page_defaults_missing_fields() {
    let page: NotificationPage =
        serde_json::from_str(r#"{"items":[{"id":"n1","title":"a"}]}"#).unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total, 0);
    assert_eq!(page.page_size, 0);
}

#[test]
fn notification_builder() {
    let n = NotificationEvent::new("n1", "Oil change")
        .with_message("Van 3")
        .with_category("maintenance");
    assert_eq!(n.message, "Van 3");
    assert_eq!(n.category, "maintenance");
}
