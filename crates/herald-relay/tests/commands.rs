#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use bytes::Bytes;
use jsonwebtoken::Algorithm;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use common::{eddsa_token, hs256_token, next, now_secs, valid_token, RecordingHandler, SECRET};
use herald_core::protocol::envelope::{Envelope, Ident};
use herald_relay::auth::{CommandGuard, JwtVerifier};
use herald_relay::config::RelaySection;
use herald_relay::transport::{MemoryBus, Transport};
use herald_relay::{Delivery, Relay, RelayHandle};

const DATA_TX: &str = "notif/chat/tx";

async fn start(
    bus: &MemoryBus,
    guard: Option<CommandGuard>,
) -> (RelayHandle, UnboundedReceiver<Delivery>) {
    let (handler, rx) = RecordingHandler::new();
    let section = RelaySection::fixed("notif", &["chat"]);
    let mut relay = Relay::new(section, Arc::new(bus.clone()), handler).unwrap();
    if let Some(guard) = guard {
        relay = relay.with_guard(guard);
    }
    (relay.start().await.unwrap(), rx)
}

fn hs256_guard() -> CommandGuard {
    CommandGuard::new(Arc::new(JwtVerifier::from_secret(Algorithm::HS256, SECRET)))
}

async fn send(bus: &MemoryBus, env: Envelope) {
    bus.publish(DATA_TX, env.to_bytes().unwrap()).await.unwrap();
}

fn request(event: &str, token: String) -> Envelope {
    Envelope::new(event, json!(["room-a"]))
        .with_user("sock-1")
        .with_token(token)
}

/// Publish a plain event and expect it as the next delivery; everything queued
/// before it has been processed once it arrives.
async fn drain(bus: &MemoryBus, rx: &mut UnboundedReceiver<Delivery>) {
    send(bus, Envelope::new("sentinel", json!(null))).await;
    let got = next(rx).await;
    assert_eq!(got.event, "sentinel", "unexpected delivery {got:?}");
}

#[tokio::test]
async fn verified_subscribe_is_acknowledged() {
    let bus = MemoryBus::new();
    let (handle, mut rx) = start(&bus, Some(hs256_guard())).await;

    send(&bus, request("subscribe", valid_token("alice"))).await;

    let ack = next(&mut rx).await;
    assert_eq!(ack.event, "subscribe");
    assert_eq!(ack.message, json!(""));
    assert_eq!(ack.rooms, vec![Ident::from("room-a")]);
    assert_eq!(ack.user, Some(Ident::from("sock-1")));

    let wire = bus.published_on(DATA_TX);
    assert_eq!(wire.len(), 2);
    assert_eq!(wire[1], r#"{"e":"subscribe","m":"","r":["room-a"],"u":"sock-1"}"#);

    // The echo read back from the bus is not delivered a second time.
    drain(&bus, &mut rx).await;
    assert!(rx.try_recv().is_err());

    let m = handle.metrics();
    let accepted = [("namespace", "chat"), ("event", "subscribe"), ("outcome", "accepted")];
    let rejected = [("namespace", "chat"), ("event", "subscribe"), ("outcome", "rejected")];
    assert_eq!(m.commands.get(&accepted), 1);
    assert_eq!(m.commands.get(&rejected), 0);
}

#[tokio::test]
async fn tokenless_membership_events_are_rejected_under_guard() {
    let bus = MemoryBus::new();
    let guard = hs256_guard()
        .on_subscribe(|_, _, _| false)
        .on_unsubscribe(|_, _, _| false);
    let (handle, mut rx) = start(&bus, Some(guard)).await;

    bus.publish(
        DATA_TX,
        Bytes::from_static(br#"{"e":"subscribe","m":["vip"],"u":"mallory"}"#),
    )
    .await
    .unwrap();
    bus.publish(
        DATA_TX,
        Bytes::from_static(br#"{"e":"unsubscribe","m":"","r":["vip"],"u":"mallory"}"#),
    )
    .await
    .unwrap();
    drain(&bus, &mut rx).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(bus.published_on(DATA_TX).len(), 3);

    let m = handle.metrics();
    for event in ["subscribe", "unsubscribe"] {
        let rejected = [("namespace", "chat"), ("event", event), ("outcome", "rejected")];
        assert_eq!(m.commands.get(&rejected), 1, "event={event}");
    }
}

#[tokio::test]
async fn replayed_acknowledgement_is_rejected() {
    let bus = MemoryBus::new();
    let (handle, mut rx) = start(&bus, Some(hs256_guard())).await;

    send(&bus, request("subscribe", valid_token("alice"))).await;
    assert_eq!(next(&mut rx).await.event, "subscribe");
    drain(&bus, &mut rx).await;

    // A copy of the relay's echo published again by someone else.
    let echo = bus.published_on(DATA_TX)[1].clone();
    bus.publish(DATA_TX, Bytes::from(echo)).await.unwrap();
    drain(&bus, &mut rx).await;

    assert!(rx.try_recv().is_err());
    let rejected = [("namespace", "chat"), ("event", "subscribe"), ("outcome", "rejected")];
    assert_eq!(handle.metrics().commands.get(&rejected), 1);
}

#[tokio::test]
async fn unsubscribe_uses_its_own_predicate() {
    let bus = MemoryBus::new();
    let guard = hs256_guard()
        .on_subscribe(|_, _, _| false)
        .on_unsubscribe(|rooms, id, handle| {
            id.subject() == Some("alice") && rooms.len() == 1 && handle.is_some()
        });
    let (_handle, mut rx) = start(&bus, Some(guard)).await;

    send(&bus, request("unsubscribe", valid_token("alice"))).await;
    let ack = next(&mut rx).await;
    assert_eq!(ack.event, "unsubscribe");
    assert_eq!(
        bus.published_on(DATA_TX)[1],
        r#"{"e":"unsubscribe","m":"","r":["room-a"],"u":"sock-1"}"#
    );
}

#[tokio::test]
async fn rejected_requests_send_nothing() {
    let bus = MemoryBus::new();
    let guard = hs256_guard().on_subscribe(|_, id, _| id.subject() == Some("alice"));
    let (handle, mut rx) = start(&bus, Some(guard)).await;

    let expired = hs256_token(json!({ "sub": "alice", "exp": now_secs() - 3600 }));
    let forged = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &json!({ "sub": "alice" }),
        &jsonwebtoken::EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();

    send(&bus, request("subscribe", "not-a-jwt".into())).await;
    send(&bus, request("subscribe", expired)).await;
    send(&bus, request("subscribe", forged)).await;
    send(&bus, request("subscribe", valid_token("mallory"))).await;
    send(
        &bus,
        Envelope::new("subscribe", json!([{ "nested": true }]))
            .with_user("sock-1")
            .with_token(valid_token("alice")),
    )
    .await;
    drain(&bus, &mut rx).await;

    let wire = bus.published_on(DATA_TX);
    assert_eq!(wire.len(), 6);
    assert!(wire.iter().all(|p| !p.contains(r#""m":"""#)));

    let m = handle.metrics();
    let rejected = [("namespace", "chat"), ("event", "subscribe"), ("outcome", "rejected")];
    let refused = [("namespace", "chat"), ("event", "subscribe"), ("outcome", "refused")];
    assert_eq!(m.commands.get(&rejected), 4);
    assert_eq!(m.commands.get(&refused), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn eddsa_tokens_checked_against_public_key() {
    let public = include_bytes!("fixtures/ed25519_public.pem");
    let private = include_bytes!("fixtures/ed25519_private.pem");
    let other = include_bytes!("fixtures/other_private.pem");

    let verifier = JwtVerifier::from_public_pem(Algorithm::EdDSA, public).unwrap();
    let bus = MemoryBus::new();
    let (handle, mut rx) = start(&bus, Some(CommandGuard::new(Arc::new(verifier)))).await;

    let claims = json!({ "sub": "alice", "exp": now_secs() + 600 });
    send(&bus, request("subscribe", eddsa_token(other, claims.clone()))).await;
    send(&bus, request("subscribe", eddsa_token(private, claims))).await;

    let ack = next(&mut rx).await;
    assert_eq!(ack.event, "subscribe");
    assert_eq!(ack.user, Some(Ident::from("sock-1")));

    let m = handle.metrics();
    let rejected = [("namespace", "chat"), ("event", "subscribe"), ("outcome", "rejected")];
    let accepted = [("namespace", "chat"), ("event", "subscribe"), ("outcome", "accepted")];
    assert_eq!(m.commands.get(&rejected), 1);
    assert_eq!(m.commands.get(&accepted), 1);
}

#[tokio::test]
async fn without_guard_commands_reach_the_handler() {
    let bus = MemoryBus::new();
    let (handle, mut rx) = start(&bus, None).await;

    send(&bus, request("subscribe", "ignored".into())).await;

    let got = next(&mut rx).await;
    assert_eq!(got.event, "subscribe");
    assert_eq!(got.message, json!(["room-a"]));
    assert_eq!(bus.published_on(DATA_TX).len(), 1);
    assert_eq!(handle.metrics().commands.total(), 0);
}
