// src/core/nameserver/listener.rs

//! The Name Server's accept loop. Every connection, whether it comes from a
//! client or a Storage Server announcing itself, is framed identically and
//! handed to the same op dispatcher.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

use crate::core::protocol::{LineCodec, Request, Response};
use crate::core::shutdown::await_shutdown_signal;

use super::handler;
use super::state::NmState;

pub async fn run(listener: TcpListener, state: Arc<NmState>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = await_shutdown_signal() => {
                tracing::info!("name server no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&state);
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, &state).await {
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

async fn serve_connection(stream: TcpStream, state: &Arc<NmState>) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, LineCodec::<Request>::default());
    let mut registered_user: Option<String> = None;

    while let Some(frame) = framed.next().await {
        let response = match frame {
            Ok(request) => {
                match &request {
                    Request::CLI_REGISTER { user } => registered_user = Some(user.clone()),
                    Request::CLI_DEREGISTER { .. } => registered_user = None,
                    _ => {}
                }
                handler::handle(state, request).await
            }
            Err(e) => Response::err(e.status_code()).msg(e.to_string()),
        };
        framed.send(response).await?;
    }

    if let Some(user) = registered_user {
        state.remove_user(&user);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::nameserver::failure_detector;

    async fn send(addr: std::net::SocketAddr, request: Request) -> Response {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, LineCodec::<Response>::default());
        framed.send(request).await.unwrap();
        framed.next().await.unwrap().unwrap()
    }

    /// Registers two Storage Servers over real TCP connections, lets the
    /// primary go silent past the heartbeat timeout while the replica keeps
    /// heartbeating, and checks a real `READ_ROUTE` over the wire falls over
    /// to the replica once the sweep notices.
    #[tokio::test]
    async fn read_route_falls_over_to_the_replica_after_a_missed_heartbeat() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(NmState::new());

        tokio::spawn(run(listener, Arc::clone(&state)));
        tokio::spawn(failure_detector::run(
            Arc::clone(&state),
            Duration::from_millis(15),
            Duration::from_millis(80),
        ));

        let register_a = Request::SS_REGISTER {
            ss_id: "ss-a".to_string(),
            ss_host: "127.0.0.1".to_string(),
            ss_client_port: 7001,
            ss_nm_port: 7001,
            files: Vec::new(),
        };
        let register_b = Request::SS_REGISTER {
            ss_id: "ss-b".to_string(),
            ss_host: "127.0.0.1".to_string(),
            ss_client_port: 7002,
            ss_nm_port: 7002,
            files: Vec::new(),
        };
        assert_eq!(send(addr, register_a).await.status, 0);
        assert_eq!(send(addr, register_b).await.status, 0);

        state.map_file_to_primary("f.txt", "ss-a");

        // ss-a never heartbeats again; ss-b refreshes once so it outlives
        // ss-a's timeout window.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(
            send(
                addr,
                Request::SS_HEARTBEAT {
                    ss_id: "ss-b".to_string()
                }
            )
            .await
            .status,
            0
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = send(
            addr,
            Request::READ_ROUTE {
                file: "f.txt".to_string(),
            },
        )
        .await;
        assert_eq!(response.status, 0);
        assert_eq!(response.ss_port, Some(7002));
        assert_eq!(response.is_replica, Some(true));
    }

    #[tokio::test]
    async fn a_dropped_connection_clears_its_registered_user() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(NmState::new());
        tokio::spawn(run(listener, Arc::clone(&state)));

        {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut framed = Framed::new(stream, LineCodec::<Response>::default());
            framed
                .send(Request::CLI_REGISTER {
                    user: "alice".to_string(),
                })
                .await
                .unwrap();
            framed.next().await.unwrap().unwrap();
        }
        // connection dropped here without CLI_DEREGISTER

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(send(addr, Request::LIST_USERS {}).await.users, Some(String::new()));
    }
}
