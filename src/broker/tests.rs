use std::sync::Arc;

use super::{Broker, BrokerRegistry, QoS, WakeSignal};
use crate::config::BrokerSettings;
use crate::utils::MqttError;

fn settings(name: &str) -> BrokerSettings {
    BrokerSettings {
        name: name.to_string(),
        max_clients: 2,
        log_capacity: 4,
        retained_capacity: 2,
        max_subscriptions: 2,
        ..BrokerSettings::default()
    }
}

fn broker() -> Broker {
    Broker::new(settings("test_broker")).unwrap()
}

#[test]
fn test_broker_rejects_invalid_settings() {
    let mut bad = settings("bad");
    bad.log_capacity = 0;
    assert!(matches!(
        Broker::new(bad),
        Err(MqttError::InvalidParameter(_))
    ));
}

#[test]
fn test_connect_assigns_slots_and_reuses_them() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    let b = broker.connect("b", WakeSignal::new()).unwrap();
    assert_eq!(a.slot(), 0);
    assert_eq!(b.slot(), 1);
    assert_eq!(broker.connected_clients().unwrap(), 2);

    broker.disconnect(&a).unwrap();
    let c = broker.connect("c", WakeSignal::new()).unwrap();
    assert_eq!(c.slot(), 0);
}

#[test]
fn test_connect_fails_when_table_full() {
    let broker = broker();
    let _a = broker.connect("a", WakeSignal::new()).unwrap();
    let _b = broker.connect("b", WakeSignal::new()).unwrap();
    assert_eq!(
        broker.connect("c", WakeSignal::new()),
        Err(MqttError::NoAvailableSlots { max: 2 })
    );
    assert_eq!(broker.connected_clients().unwrap(), 2);
}

#[test]
fn test_connect_rejects_bad_client_id() {
    let broker = broker();
    assert!(matches!(
        broker.connect("", WakeSignal::new()),
        Err(MqttError::InvalidParameter(_))
    ));
    let long = "x".repeat(64);
    assert!(matches!(
        broker.connect(&long, WakeSignal::new()),
        Err(MqttError::InvalidParameter(_))
    ));
}

#[test]
fn test_same_id_takes_over_session() {
    let broker = broker();
    let old = broker.connect("dup", WakeSignal::new()).unwrap();
    let new = broker.connect("dup", WakeSignal::new()).unwrap();

    assert_eq!(old.slot(), new.slot());
    assert!(!broker.is_session_current(&old));
    assert!(broker.is_session_current(&new));
    assert_eq!(
        broker.publish(&old, "a/b", b"x", QoS::AtMostOnce, false),
        Err(MqttError::Disconnected)
    );
    assert_eq!(broker.connected_clients().unwrap(), 1);
}

#[test]
fn test_disconnect_is_idempotent() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    broker.disconnect(&a).unwrap();
    broker.disconnect(&a).unwrap();
    assert_eq!(broker.connected_clients().unwrap(), 0);
}

#[test]
fn test_publish_assigns_increasing_sequences() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    let s1 = broker.publish(&a, "t/1", b"one", QoS::AtMostOnce, false).unwrap();
    let s2 = broker.publish(&a, "t/2", b"two", QoS::AtLeastOnce, false).unwrap();
    assert_eq!((s1, s2), (1, 2));
    assert_eq!(broker.current_sequence().unwrap(), 2);

    let message = broker.read_entry(&a, 2).unwrap().unwrap();
    assert_eq!(message.topic, "t/2");
    assert_eq!(message.payload, b"two");
    assert_eq!(message.qos, QoS::AtLeastOnce);
    assert!(!message.retained);
    assert_eq!(message.sequence, 2);
}

#[test]
fn test_publish_validates_topic_and_payload() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    assert!(matches!(
        broker.publish(&a, "a/+", b"x", QoS::AtMostOnce, false),
        Err(MqttError::TopicInvalid(_))
    ));
    let big = vec![0u8; broker.settings().max_payload_size + 1];
    assert!(matches!(
        broker.publish(&a, "a/b", &big, QoS::AtMostOnce, false),
        Err(MqttError::PayloadTooLarge { .. })
    ));
    assert_eq!(broker.current_sequence().unwrap(), 0);
}

#[test]
fn test_log_wrap_skips_overwritten_entries() {
    let broker = broker();
    let publisher = broker.connect("pub", WakeSignal::new()).unwrap();
    let reader = broker.connect("reader", WakeSignal::new()).unwrap();

    for i in 0..6 {
        broker
            .publish(&publisher, "t", format!("{i}").as_bytes(), QoS::AtMostOnce, false)
            .unwrap();
    }

    assert!(broker.read_entry(&reader, 1).unwrap().is_none());
    assert!(broker.read_entry(&reader, 2).unwrap().is_none());
    assert_eq!(broker.read_entry(&reader, 3).unwrap().unwrap().payload, b"2");

    let (first, last) = broker.begin_scan(&reader).unwrap();
    assert_eq!((first, last), (3, 6));
    broker.commit_cursor(&reader, last).unwrap();
    let (first, last) = broker.begin_scan(&reader).unwrap();
    assert!(first > last);
}

#[test]
fn test_retained_last_write_wins() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    broker.publish(&a, "config/armed", b"false", QoS::AtMostOnce, true).unwrap();
    broker.publish(&a, "config/armed", b"true", QoS::AtLeastOnce, true).unwrap();

    let replay = broker.register_filter(&a, "config/#").unwrap();
    assert_eq!(replay.len(), 1);
    assert_eq!(replay[0].payload, b"true");
    assert_eq!(replay[0].qos, QoS::AtLeastOnce);
    assert!(replay[0].retained);
    assert_eq!(broker.stats().unwrap().retained_count, 1);
}

#[test]
fn test_retained_empty_payload_is_an_update() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    broker.publish(&a, "state", b"on", QoS::AtMostOnce, true).unwrap();
    broker.publish(&a, "state", b"", QoS::AtMostOnce, true).unwrap();

    let replay = broker.register_filter(&a, "state").unwrap();
    assert_eq!(replay.len(), 1);
    assert!(replay[0].payload.is_empty());
}

#[test]
fn test_full_retained_table_rejects_publish() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    broker.publish(&a, "r/1", b"1", QoS::AtMostOnce, true).unwrap();
    broker.publish(&a, "r/2", b"2", QoS::AtMostOnce, true).unwrap();

    assert!(matches!(
        broker.publish(&a, "r/3", b"3", QoS::AtMostOnce, true),
        Err(MqttError::PublishFailed(_))
    ));
    // Nothing was appended for the rejected publish.
    assert_eq!(broker.current_sequence().unwrap(), 2);
    // Existing topics can still be updated.
    broker.publish(&a, "r/1", b"again", QoS::AtMostOnce, true).unwrap();
}

#[test]
fn test_register_filter_ignores_duplicates_and_enforces_limit() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    broker.register_filter(&a, "a/#").unwrap();
    broker.register_filter(&a, "a/#").unwrap();
    broker.register_filter(&a, "b/+").unwrap();
    assert!(matches!(
        broker.register_filter(&a, "c"),
        Err(MqttError::SubscribeFailed(_))
    ));
    assert_eq!(broker.stats().unwrap().clients[0].subscriptions, 2);

    broker.remove_filter(&a, "a/#").unwrap();
    broker.remove_filter(&a, "unknown").unwrap();
    broker.register_filter(&a, "c").unwrap();
}

#[test]
fn test_register_filter_rejects_bad_filter() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    assert!(matches!(
        broker.register_filter(&a, "a/#/b"),
        Err(MqttError::TopicInvalid(_))
    ));
}

#[tokio::test]
async fn test_publish_wakes_matching_subscriber() {
    let broker = broker();
    let publisher = broker.connect("pub", WakeSignal::new()).unwrap();
    let waker = WakeSignal::new();
    let sub = broker.connect("sub", waker.clone()).unwrap();
    broker.register_filter(&sub, "sensors/+/temperature").unwrap();

    broker
        .publish(&publisher, "sensors/kitchen/humidity", b"40", QoS::AtMostOnce, false)
        .unwrap();
    assert!(!waker.wait(std::time::Duration::from_millis(20)).await);

    broker
        .publish(&publisher, "sensors/kitchen/temperature", b"21.5", QoS::AtMostOnce, false)
        .unwrap();
    assert!(waker.wait(std::time::Duration::from_millis(100)).await);
}

#[test]
fn test_stats_snapshot() {
    let broker = broker();
    let a = broker.connect("a", WakeSignal::new()).unwrap();
    broker.register_filter(&a, "x/#").unwrap();
    broker.publish(&a, "x/y", b"1", QoS::AtMostOnce, false).unwrap();

    let stats = broker.stats().unwrap();
    assert_eq!(stats.name, "test_broker");
    assert_eq!(stats.sequence_counter, 1);
    assert_eq!(stats.log_head, 1);
    assert_eq!(stats.log_capacity, 4);
    assert_eq!(stats.connected_clients, 1);
    assert_eq!(stats.clients.len(), 1);
    assert_eq!(stats.clients[0].client_id, "a");

    let rendered = stats.to_string();
    assert!(rendered.contains("Connected clients: 1/2"));
    assert!(serde_json::to_value(&stats).is_ok());
}

#[test]
fn test_registry_attach_returns_same_broker() {
    let registry = BrokerRegistry::new();
    let first = registry.attach(&settings("shared")).unwrap();
    let second = registry.attach(&settings("shared")).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    registry.attach(&settings("other")).unwrap();
    assert_eq!(registry.names().unwrap(), vec!["other", "shared"]);
    assert!(registry.get("missing").unwrap().is_none());
}

#[test]
fn test_registry_cleanup_refuses_while_connected() {
    let registry = BrokerRegistry::new();
    let broker = registry.attach(&settings("shared")).unwrap();
    let a = broker.connect("a", WakeSignal::new()).unwrap();

    assert!(matches!(
        registry.cleanup("shared"),
        Err(MqttError::InvalidParameter(_))
    ));

    broker.disconnect(&a).unwrap();
    assert!(registry.cleanup("shared").unwrap());
    assert!(!registry.cleanup("shared").unwrap());
    assert!(registry.get("shared").unwrap().is_none());
}
