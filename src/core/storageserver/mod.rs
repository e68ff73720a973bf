// src/core/storageserver/mod.rs

//! The Storage Server role: owns a slice of files on disk, serves reads,
//! writes, undo, streaming, checkpoints, and folder operations for them,
//! and keeps the Name Server informed of its existence via registration and
//! heartbeats.

mod acl;
mod checkpoint;
mod handler;
mod heartbeat;
mod listener;
mod store;
mod tokenize;
mod write_session;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::config::SsConfig;
use crate::core::protocol::Request;

pub use store::SsStore;

pub async fn run(config: SsConfig) -> Result<()> {
    let store = Arc::new(SsStore::new(config.data_dir.clone()));
    let files = store
        .scan_existing()
        .await
        .with_context(|| format!("scanning data directory '{}'", config.data_dir))?;
    tracing::info!(count = files.len(), "loaded existing files from disk");

    let addr = format!("{}:{}", config.host, config.client_port);
    let listener = TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("binding storage server listener on '{addr}'"))?;
    tracing::info!(%addr, ss_id = %config.ss_id, "storage server listening");

    register_with_name_server(&config, &files)
        .await
        .context("registering with name server")?;

    tokio::spawn(heartbeat::run(
        config.nm_host.clone(),
        config.nm_port,
        config.ss_id.clone(),
        config.heartbeat_interval,
    ));

    listener::run(listener, store).await;
    Ok(())
}

async fn register_with_name_server(config: &SsConfig, files: &[String]) -> Result<()> {
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::Framed;

    use crate::core::protocol::{LineCodec, Response};

    let request = Request::SS_REGISTER {
        ss_id: config.ss_id.clone(),
        ss_host: config.host.clone(),
        ss_client_port: config.client_port,
        ss_nm_port: config.client_port,
        files: files.to_vec(),
    };

    let stream = tokio::net::TcpStream::connect((config.nm_host.as_str(), config.nm_port)).await?;
    let mut framed = Framed::new(stream, LineCodec::<Response>::default());
    framed.send(request).await?;
    match framed.next().await {
        Some(Ok(response)) if response.status == 0 => Ok(()),
        Some(Ok(response)) => Err(anyhow::anyhow!(
            "name server rejected registration: status {}",
            response.status
        )),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("name server closed connection during registration")),
    }
}
