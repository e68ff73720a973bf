// src/core/storageserver/heartbeat.rs

//! Sends periodic `SS_HEARTBEAT` messages to the Name Server so it can tell
//! this node apart from one that has silently died.

use std::time::Duration;

use crate::core::protocol::Request;

pub async fn run(nm_host: String, nm_port: u16, ss_id: String, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let request = Request::SS_HEARTBEAT {
            ss_id: ss_id.clone(),
        };
        if let Err(e) = send(&nm_host, nm_port, request).await {
            tracing::warn!(error = %e, "heartbeat to name server failed");
        }
    }
}

async fn send(host: &str, port: u16, request: Request) -> anyhow::Result<()> {
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    use crate::core::protocol::{LineCodec, Response};

    let stream = TcpStream::connect((host, port)).await?;
    let mut framed = Framed::new(stream, LineCodec::<Response>::default());
    framed.send(request).await?;
    match framed.next().await {
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("name server closed connection")),
    }
}
