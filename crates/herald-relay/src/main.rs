//! herald relay binary.
//!
//! Loads `herald.yaml` (or the path given as the first argument), connects the
//! configured transport, starts a relay whose handler logs every delivery, and
//! serves the ops endpoints.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use herald_core::error::{HeraldError, Result};
use herald_relay::auth::{CommandGuard, JwtVerifier};
use herald_relay::relay::LogHandler;
use herald_relay::{app_state, config, obs, router, transport, Relay};

#[tokio::main]
async fn main() -> Result<()> {
    obs::init_tracing();

    let path = std::env::args().nth(1).unwrap_or_else(|| "herald.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .ops
        .listen
        .parse()
        .map_err(|e| HeraldError::Config(format!("ops.listen: {e}")))?;

    let transport = transport::connect(&cfg.transport).await?;
    let mut relay = Relay::new(cfg.relay.clone(), transport, Arc::new(LogHandler))?;
    if let Some(auth) = &cfg.auth {
        let verifier = JwtVerifier::from_config(auth)?;
        relay = relay.with_guard(CommandGuard::new(Arc::new(verifier)));
    }

    let state = app_state::AppState::new(relay.status());
    let app = router::build_router(state);
    let handle = relay.start().await?;

    tracing::info!(%listen, prefix = %cfg.relay.prefix, "herald-relay starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| HeraldError::Transport(format!("bind {listen} failed: {e}")))?;

    // Whichever ends first ends the process; a closed transport is an error.
    tokio::select! {
        served = axum::serve(listener, app).into_future() => {
            served.map_err(|e| HeraldError::Transport(format!("ops server failed: {e}")))
        }
        relay = handle.join() => relay,
    }
}
