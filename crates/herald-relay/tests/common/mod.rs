//! Shared helpers for relay integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use herald_core::error::{HeraldError, Result};
use herald_relay::relay::{Delivery, NotificationHandler};

pub const SECRET: &[u8] = b"relay-test-secret";

/// Forwards every delivery to a channel; fails or panics on request.
pub struct RecordingHandler {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl RecordingHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl NotificationHandler for RecordingHandler {
    async fn handle(&self, delivery: Delivery) -> Result<()> {
        match delivery.event.as_str() {
            "boom" => panic!("handler exploded"),
            "fail" => Err(HeraldError::Handler("refused by test".into())),
            _ => {
                self.tx.send(delivery).unwrap();
                Ok(())
            }
        }
    }
}

pub async fn next(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("handler channel closed")
}

/// Poll `cond` until it holds (2s budget).
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

pub fn hs256_token(claims: Value) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

pub fn valid_token(sub: &str) -> String {
    hs256_token(json!({ "sub": sub, "exp": now_secs() + 600 }))
}

pub fn eddsa_token(private_pem: &[u8], claims: Value) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::EdDSA),
        &claims,
        &EncodingKey::from_ed_pem(private_pem).unwrap(),
    )
    .unwrap()
}
