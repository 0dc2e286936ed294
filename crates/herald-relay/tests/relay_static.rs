#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;

use common::{next, wait_until, RecordingHandler};
use herald_core::protocol::envelope::{Ident, Rooms};
use herald_relay::config::{DispatchMode, PublisherSettings, RelaySection};
use herald_relay::transport::{MemoryBus, Transport};
use herald_relay::{Delivery, Publisher, Relay, RelayState};

#[tokio::test]
async fn delivers_published_event_with_namespace() {
    let bus = MemoryBus::new();
    let (handler, mut rx) = RecordingHandler::new();
    let relay = Relay::new(
        RelaySection::fixed("notif", &["game-42"]),
        Arc::new(bus.clone()),
        handler,
    )
    .unwrap();
    let handle = relay.start().await.unwrap();
    assert_eq!(handle.state(), RelayState::Listening);

    let publisher =
        Publisher::new(PublisherSettings::new("game-42", "notif"), Arc::new(bus.clone())).unwrap();
    publisher
        .publish(
            "score",
            json!({ "points": 10 }),
            Some(Rooms::from("room-a")),
            Some(Ident::from("user-7")),
        )
        .await
        .unwrap();

    let got = next(&mut rx).await;
    assert_eq!(
        got,
        Delivery {
            namespace: "game-42".into(),
            event: "score".into(),
            message: json!({ "points": 10 }),
            rooms: vec![Ident::from("room-a")],
            user: Some(Ident::from("user-7")),
        }
    );
    assert_eq!(handle.metrics().deliveries.get(&[("namespace", "game-42")]), 1);
    handle.shutdown();
}

#[tokio::test]
async fn malformed_packet_does_not_stop_the_loop() {
    let bus = MemoryBus::new();
    let (handler, mut rx) = RecordingHandler::new();
    let handle = Relay::new(RelaySection::fixed("notif", &["chat"]), Arc::new(bus.clone()), handler)
        .unwrap()
        .start()
        .await
        .unwrap();

    let ch = "notif/chat/tx";
    bus.publish(ch, Bytes::from_static(br#"{"e":"a","m":1}"#)).await.unwrap();
    bus.publish(ch, Bytes::from_static(b"{not json")).await.unwrap();
    bus.publish(ch, Bytes::from_static(br#"{"m":"no event"}"#)).await.unwrap();
    bus.publish(ch, Bytes::from_static(br#"{"e":"b","m":2}"#)).await.unwrap();

    assert_eq!(next(&mut rx).await.event, "a");
    assert_eq!(next(&mut rx).await.event, "b");
    assert_eq!(handle.metrics().decode_errors.get(&[("namespace", "chat")]), 2);
    assert_eq!(handle.state(), RelayState::Listening);
    assert!(!handle.is_finished());
}

#[tokio::test]
async fn handler_errors_and_panics_are_contained() {
    let bus = MemoryBus::new();
    let (handler, mut rx) = RecordingHandler::new();
    let handle = Relay::new(RelaySection::fixed("notif", &["chat"]), Arc::new(bus.clone()), handler)
        .unwrap()
        .start()
        .await
        .unwrap();

    let ch = "notif/chat/tx";
    bus.publish(ch, Bytes::from_static(br#"{"e":"fail","m":null}"#)).await.unwrap();
    bus.publish(ch, Bytes::from_static(br#"{"e":"boom","m":null}"#)).await.unwrap();
    bus.publish(ch, Bytes::from_static(br#"{"e":"after","m":null}"#)).await.unwrap();

    assert_eq!(next(&mut rx).await.event, "after");
    let m = handle.metrics();
    assert_eq!(m.handler_errors.get(&[("namespace", "chat"), ("kind", "error")]), 1);
    assert_eq!(m.handler_errors.get(&[("namespace", "chat"), ("kind", "panic")]), 1);
    assert_eq!(m.deliveries.get(&[("namespace", "chat")]), 3);
    assert!(!handle.is_finished());
}

#[tokio::test]
async fn only_configured_namespaces_are_delivered() {
    let bus = MemoryBus::new();
    let (handler, mut rx) = RecordingHandler::new();
    let handle = Relay::new(RelaySection::fixed("notif", &["chat"]), Arc::new(bus.clone()), handler)
        .unwrap()
        .start()
        .await
        .unwrap();

    bus.publish("notif/other/tx", Bytes::from_static(br#"{"e":"x","m":1}"#)).await.unwrap();
    bus.publish("notif/chat/rx", Bytes::from_static(br#"{"e":"x","m":1}"#)).await.unwrap();
    bus.publish("notif/chat/tx", Bytes::from_static(br#"{"e":"y","m":1}"#)).await.unwrap();

    assert_eq!(next(&mut rx).await.event, "y");
    assert!(rx.try_recv().is_err());
    assert_eq!(handle.registry().namespaces(), vec!["chat"]);
}

#[tokio::test]
async fn subscribes_each_namespace_once() {
    let bus = MemoryBus::new();
    let (handler, _rx) = RecordingHandler::new();
    let handle = Relay::new(
        RelaySection::fixed("notif", &["a", "b", "a"]),
        Arc::new(bus.clone()),
        handler,
    )
    .unwrap()
    .start()
    .await
    .unwrap();

    assert_eq!(bus.subscribe_calls("notif/a/tx"), 1);
    assert_eq!(bus.subscribe_calls("notif/b/tx"), 1);
    assert_eq!(bus.subscribe_calls("notif/tx"), 0);
    assert_eq!(handle.registry().len(), 2);
    assert_eq!(handle.metrics().namespaces.get(&[]), 2);
    // Static mode never publishes SERVER_INIT.
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn start_failure_leaves_relay_unstarted() {
    let bus = MemoryBus::new();
    let (handler, _rx) = RecordingHandler::new();
    let relay = Relay::new(RelaySection::fixed("notif", &["chat"]), Arc::new(bus.clone()), handler)
        .unwrap();
    let status = relay.status();
    assert_eq!(status.state(), RelayState::Unstarted);

    bus.set_offline(true);
    let err = relay.start().await.err().unwrap();
    assert_eq!(err.code().as_str(), "TRANSPORT_ERROR");
    assert_eq!(status.state(), RelayState::Unstarted);
    assert!(status.registry.is_empty());
}

#[tokio::test]
async fn spawned_dispatch_delivers_everything() {
    let bus = MemoryBus::new();
    let (handler, mut rx) = RecordingHandler::new();
    let mut section = RelaySection::fixed("notif", &["chat"]);
    section.dispatch = DispatchMode::Spawned;
    let handle = Relay::new(section, Arc::new(bus.clone()), handler)
        .unwrap()
        .start()
        .await
        .unwrap();

    let publisher =
        Publisher::new(PublisherSettings::new("chat", "notif"), Arc::new(bus.clone())).unwrap();
    for i in 0..20i64 {
        publisher.publish("tick", json!(i), None, None).await.unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..20 {
        seen.push(next(&mut rx).await.message.as_i64().unwrap());
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..20).collect::<Vec<i64>>());

    let metrics = handle.metrics();
    wait_until(|| metrics.handler_duration.count(&[("namespace", "chat")]) == 20).await;
}

#[tokio::test]
async fn closed_transport_ends_the_relay_with_an_error() {
    let bus = MemoryBus::new();
    let (handler, mut rx) = RecordingHandler::new();
    let handle = Relay::new(RelaySection::fixed("notif", &["chat"]), Arc::new(bus.clone()), handler)
        .unwrap()
        .start()
        .await
        .unwrap();

    bus.publish("notif/chat/tx", Bytes::from_static(br#"{"e":"last","m":1}"#))
        .await
        .unwrap();
    bus.close();

    let joined = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .expect("relay did not notice the closed transport");
    assert_eq!(joined.unwrap_err().code().as_str(), "TRANSPORT_ERROR");
    // Queued traffic is still handled before the stream ends.
    assert_eq!(next(&mut rx).await.event, "last");

    let err = bus
        .publish("notif/chat/tx", Bytes::from_static(b"{}"))
        .await
        .unwrap_err();
    assert_eq!(err.code().as_str(), "TRANSPORT_ERROR");
}
