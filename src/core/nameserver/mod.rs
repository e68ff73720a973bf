// src/core/nameserver/mod.rs

//! The Name Server role: cluster membership, file-to-node routing, user
//! bookkeeping, and access-request brokering. Storage Servers register with
//! and heartbeat to the Name Server; clients talk to it to discover which
//! Storage Server to read, write, or stream a file from.

mod handler;
mod listener;
mod ss_client;
mod state;

mod failure_detector;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::config::NmConfig;

pub use state::NmState;

pub async fn run(config: NmConfig) -> Result<()> {
    let state = Arc::new(NmState::new());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("binding name server listener on '{addr}'"))?;
    tracing::info!(%addr, "name server listening");

    tokio::spawn(failure_detector::run(
        Arc::clone(&state),
        config.heartbeat_check_interval,
        config.heartbeat_timeout,
    ));

    listener::run(listener, state).await;
    Ok(())
}
