// src/core/nameserver/ss_client.rs

//! A short-lived connection the Name Server opens to a Storage Server to
//! proxy a single control-plane request and read back its reply. Mirrors
//! the one-shot connect/send/read/close pattern used elsewhere in this
//! codebase for talking to a peer node rather than keeping a pool.

use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use futures::{SinkExt, StreamExt};

use crate::core::errors::FsError;
use crate::core::protocol::{LineCodec, Request, Response};

/// Sends `request` to the Storage Server at `host:port` and returns its
/// reply. A connection failure is surfaced as `FsError::Internal`, matching
/// the error taxonomy's treatment of proxying failures.
pub async fn send_request(host: &str, port: u16, request: Request) -> Result<Response, FsError> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| FsError::Internal(format!("connect to storage server failed: {e}")))?;

    let mut framed = Framed::new(stream, LineCodec::<Response>::default());
    framed
        .send(request)
        .await
        .map_err(|e| FsError::Internal(format!("send to storage server failed: {e}")))?;

    match framed.next().await {
        Some(Ok(response)) => Ok(response),
        Some(Err(e)) => Err(FsError::Internal(format!(
            "storage server reply malformed: {e}"
        ))),
        None => Err(FsError::Internal(
            "storage server closed connection without a reply".to_string(),
        )),
    }
}

/// Fires `request` at the Storage Server without waiting for or caring about
/// the reply. Used for the best-effort asynchronous replication shipped
/// alongside MOVE, CHECKPOINT, and REVERT.
pub fn send_fire_and_forget(host: String, port: u16, request: Request) {
    tokio::spawn(async move {
        if let Err(e) = send_request(&host, port, request).await {
            tracing::warn!(%host, port, error = %e, "async replication write failed");
        }
    });
}
