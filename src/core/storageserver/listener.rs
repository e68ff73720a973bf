// src/core/storageserver/listener.rs

//! The Storage Server's accept loop. Most ops get a single `Response`; a
//! `STREAM` request instead gets a paced sequence of `TOK` messages
//! terminated by `STOP`, so it is intercepted here rather than folded into
//! the generic per-request handler.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

use crate::core::errors::FsError;
use crate::core::protocol::{LineCodec, Request, Response, StreamMessage};
use crate::core::shutdown::await_shutdown_signal;

use super::handler::Handler;
use super::store::SsStore;
use super::tokenize;

/// Pacing delay between streamed tokens, matching the throttled word-by-word
/// delivery a terminal client reads at.
const STREAM_TOKEN_DELAY: Duration = Duration::from_millis(100);

pub async fn run(listener: TcpListener, store: Arc<SsStore>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = await_shutdown_signal() => {
                tracing::info!("storage server no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let store = Arc::clone(&store);
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, &store).await {
                                tracing::debug!(%addr, error = %e, "connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                    }
                }
            }
        }
    }

    while connections.join_next().await.is_some() {}
}

async fn serve_connection(stream: TcpStream, store: &Arc<SsStore>) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, LineCodec::<Request>::default());
    let mut handler = Handler::new(store);

    while let Some(frame) = framed.next().await {
        match frame {
            Ok(Request::STREAM { file, user }) => {
                stream_file(&mut framed, store, &file, &user).await?;
            }
            Ok(request) => {
                let response = handler.handle(request).await;
                framed.send(response).await?;
            }
            Err(e) => {
                let response = Response::err(e.status_code()).msg(e.to_string());
                framed.send(response).await?;
            }
        }
    }

    handler.on_disconnect().await;
    Ok(())
}

async fn stream_file(
    framed: &mut Framed<TcpStream, LineCodec<Request>>,
    store: &SsStore,
    file: &str,
    user: &str,
) -> anyhow::Result<()> {
    let content = match read_for_stream(store, file, user).await {
        Ok(content) => content,
        Err(e) => {
            framed.send(Response::err(e.status_code()).msg(e.to_string())).await?;
            return Ok(());
        }
    };

    for sentence in tokenize::tokenize_file(&content) {
        for word in sentence.words {
            framed.send(StreamMessage::TOK { w: word }).await?;
            tokio::time::sleep(STREAM_TOKEN_DELAY).await;
        }
    }
    framed.send(StreamMessage::STOP {}).await?;
    Ok(())
}

async fn read_for_stream(store: &SsStore, file: &str, user: &str) -> Result<String, FsError> {
    let handle = store.handle(file).ok_or(FsError::NotFound)?;
    let state = handle.lock().await;
    state.check_access(user, false)?;
    Ok(tokenize::rebuild_file(&state.sentences))
}
