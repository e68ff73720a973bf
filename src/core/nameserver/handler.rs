// src/core/nameserver/handler.rs

//! Per-connection request dispatch for the Name Server: local bookkeeping
//! ops answered directly out of `NmState`, and control-plane ops proxied to
//! whichever Storage Server currently owns the file.

use std::sync::Arc;

use crate::core::errors::FsError;
use crate::core::protocol::{Request, Response};

use super::state::NmState;
use super::ss_client;

pub async fn handle(state: &Arc<NmState>, request: Request) -> Response {
    match dispatch(state, request).await {
        Ok(response) => response,
        Err(e) => Response::err(e.status_code()).msg(e.to_string()),
    }
}

async fn dispatch(state: &Arc<NmState>, request: Request) -> Result<Response, FsError> {
    match request {
        Request::CLI_REGISTER { user } => {
            state.add_user(&user);
            Ok(Response::ok())
        }
        Request::CLI_DEREGISTER { user } => {
            state.remove_user(&user);
            Ok(Response::ok())
        }
        Request::VIEW {} => Ok(Response {
            files: Some(state.view_all()),
            ..Response::ok()
        }),
        Request::LIST_USERS {} => Ok(Response {
            users: Some(state.list_users()),
            ..Response::ok()
        }),
        Request::VIEW_ROUTE { .. } => {
            let node = state.any_live_ss().ok_or(FsError::Internal(
                "no storage server is registered".to_string(),
            ))?;
            Ok(Response {
                op: Some("ROUTE".to_string()),
                ss_host: Some(node.host),
                ss_port: Some(node.client_port),
                ..Response::ok()
            })
        }
        Request::READ_ROUTE { file } | Request::WRITE_ROUTE { file } | Request::STREAM_ROUTE { file } => {
            route_response(state, &file)
        }
        Request::CREATE { file, user } => create_file(state, &file, &user).await,
        Request::DELETE { file, user } => {
            proxy_to_primary(state, &file, Request::NM_DELETE { file: file.clone(), user }).await
        }
        Request::INFO { file, user } => {
            proxy_to_primary(state, &file, Request::INFO { file: file.clone(), user }).await
        }
        Request::ADDACCESS {
            file,
            user,
            target_user,
            mode,
        } => {
            let req = Request::NM_ACCESS {
                file: file.clone(),
                cmd: "ADD".to_string(),
                mode,
                target_user,
                actor: user,
            };
            proxy_to_primary(state, &file, req).await
        }
        Request::REMACCESS {
            file,
            user,
            target_user,
        } => {
            let req = Request::NM_ACCESS {
                file: file.clone(),
                cmd: "REM".to_string(),
                mode: String::new(),
                target_user,
                actor: user,
            };
            proxy_to_primary(state, &file, req).await
        }
        Request::CREATEFOLDER { folder } => proxy_to_any(state, Request::CREATEFOLDER { folder }).await,
        Request::VIEWFOLDER { folder } => proxy_to_any(state, Request::VIEWFOLDER { folder }).await,
        Request::MOVE { file, folder } => move_file(state, file, folder).await,
        Request::CHECKPOINT { file, tag } => {
            let request = Request::CHECKPOINT {
                file: file.clone(),
                tag,
            };
            checkpoint_like(state, file, request).await
        }
        Request::VIEWCHECKPOINT { file, tag } => {
            proxy_via_failover(state, &file.clone(), Request::VIEWCHECKPOINT { file, tag }).await
        }
        Request::REVERT { file, tag } => {
            let request = Request::REVERT {
                file: file.clone(),
                tag,
            };
            checkpoint_like(state, file, request).await
        }
        Request::LISTCHECKPOINTS { file } => {
            proxy_via_failover(state, &file.clone(), Request::LISTCHECKPOINTS { file }).await
        }
        Request::REQUESTACCESS { file, user, owner } => {
            if state.request_access(&file, &user, &owner) {
                Ok(Response::ok())
            } else {
                Err(FsError::Conflict)
            }
        }
        Request::VIEWREQUESTS { user } => {
            let pending = state.pending_requests_for_owner(&user);
            let formatted = pending
                .iter()
                .map(|r| format!("{}:{}", r.file, r.requester))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(Response {
                requests: Some(formatted),
                ..Response::ok()
            })
        }
        Request::RESPONDREQUEST {
            file,
            requester,
            user,
            approve,
        } => respond_request(state, file, requester, user, approve).await,

        Request::SS_REGISTER {
            ss_id,
            ss_host,
            ss_client_port,
            ss_nm_port,
            files,
        } => {
            state.register_ss(&ss_id, &ss_host, ss_client_port, ss_nm_port, &files);
            tracing::info!(ss_id = %ss_id, host = %ss_host, "storage server registered");
            Ok(Response::ok())
        }
        Request::SS_HEARTBEAT { ss_id } => match state.heartbeat(&ss_id) {
            Some(was_dead) => {
                if was_dead {
                    tracing::info!(ss_id = %ss_id, "storage server back online");
                }
                Ok(Response::ok())
            }
            None => Err(FsError::NotFound),
        },

        // Everything else belongs to the Storage Server's own wire vocabulary
        // and never reaches the Name Server's listener.
        _ => Err(FsError::BadRequest("unexpected op for name server".to_string())),
    }
}

fn route_response(state: &Arc<NmState>, file: &str) -> Result<Response, FsError> {
    let route = state.failover_route(file).ok_or(FsError::NotFound)?;
    Ok(Response {
        op: Some("ROUTE".to_string()),
        ss_host: Some(route.node.host),
        ss_port: Some(route.node.client_port),
        is_replica: Some(route.is_replica),
        ..Response::ok()
    })
}

async fn create_file(state: &Arc<NmState>, file: &str, user: &str) -> Result<Response, FsError> {
    let node = state
        .any_live_ss()
        .ok_or(FsError::Internal("no storage server is registered".to_string()))?;
    let response = ss_client::send_request(
        &node.host,
        node.client_port,
        Request::NM_CREATE {
            file: file.to_string(),
            owner: user.to_string(),
        },
    )
    .await?;
    if response.status == 0 {
        state.map_file_to_primary(file, &node.ss_id);
    }
    Ok(response)
}

async fn proxy_to_primary(state: &Arc<NmState>, file: &str, request: Request) -> Result<Response, FsError> {
    let node = state.primary_route(file).ok_or(FsError::NotFound)?;
    ss_client::send_request(&node.host, node.client_port, request).await
}

async fn proxy_via_failover(state: &Arc<NmState>, file: &str, request: Request) -> Result<Response, FsError> {
    let route = state.failover_route(file).ok_or(FsError::NotFound)?;
    ss_client::send_request(&route.node.host, route.node.client_port, request).await
}

async fn proxy_to_any(state: &Arc<NmState>, request: Request) -> Result<Response, FsError> {
    let node = state
        .any_live_ss()
        .ok_or(FsError::Internal("no storage server is registered".to_string()))?;
    ss_client::send_request(&node.host, node.client_port, request).await
}

async fn move_file(state: &Arc<NmState>, file: String, folder: String) -> Result<Response, FsError> {
    let route = state.failover_route(&file).ok_or(FsError::NotFound)?;
    let response = ss_client::send_request(
        &route.node.host,
        route.node.client_port,
        Request::MOVE {
            file: file.clone(),
            folder: folder.clone(),
        },
    )
    .await?;

    if response.status == 0 {
        let new_file = format!("{folder}/{file}");
        state.rename_file(&file, &new_file);
        replicate_async(state, &route.node.ss_id, Request::MOVE { file, folder });
    }
    Ok(response)
}

async fn checkpoint_like(state: &Arc<NmState>, file: String, request: Request) -> Result<Response, FsError> {
    let route = state.failover_route(&file).ok_or(FsError::NotFound)?;
    let response = ss_client::send_request(&route.node.host, route.node.client_port, request.clone()).await?;
    if response.status == 0 {
        replicate_async(state, &route.node.ss_id, request);
    }
    Ok(response)
}

/// Fires the same request at whichever node is currently replicating
/// `primary_ss_id`, best-effort, without waiting for the outcome.
fn replicate_async(state: &Arc<NmState>, primary_ss_id: &str, request: Request) {
    if let Some(replica) = state.replica_node_of(primary_ss_id) {
        ss_client::send_fire_and_forget(replica.host, replica.client_port, request);
    }
}

async fn respond_request(
    state: &Arc<NmState>,
    file: String,
    requester: String,
    owner: String,
    approve: bool,
) -> Result<Response, FsError> {
    let resolved = state
        .respond_request(&file, &requester, &owner)
        .ok_or(FsError::NotFound)?;

    if approve {
        let grant = Request::NM_ACCESS {
            file: file.clone(),
            cmd: "ADD".to_string(),
            mode: "R".to_string(),
            target_user: resolved.requester.clone(),
            actor: resolved.owner.clone(),
        };
        proxy_to_primary(state, &file, grant).await
    } else {
        Ok(Response::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::LineCodec;
    use crate::core::storageserver::listener as ss_listener;
    use crate::core::storageserver::store::SsStore;
    use futures::{SinkExt, StreamExt};
    use tempfile::tempdir;
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    async fn read_as(addr: std::net::SocketAddr, file: &str, user: &str) -> Response {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, LineCodec::<Response>::default());
        framed
            .send(Request::READ {
                file: file.to_string(),
                user: user.to_string(),
            })
            .await
            .unwrap();
        framed.next().await.unwrap().unwrap()
    }

    /// An approved access request must actually grant the requester read
    /// access on the Storage Server that owns the file, via the single
    /// `NM_ACCESS` shape (`actor`/`target_user`) used by every call site.
    #[tokio::test]
    async fn an_approved_access_request_grants_real_read_access() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SsStore::new(dir.path().to_path_buf()));
        store.scan_existing().await.unwrap();
        store.create("f.txt", "alice").await.unwrap();

        let tcp_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp_listener.local_addr().unwrap();
        tokio::spawn(ss_listener::run(tcp_listener, Arc::clone(&store)));

        let state = Arc::new(NmState::new());
        state.register_ss("ss-a", &addr.ip().to_string(), addr.port(), addr.port(), &[]);
        state.map_file_to_primary("f.txt", "ss-a");

        // bob has no access yet.
        assert_ne!(read_as(addr, "f.txt", "bob").await.status, 0);

        assert_eq!(
            handle(
                &state,
                Request::REQUESTACCESS {
                    file: "f.txt".to_string(),
                    user: "bob".to_string(),
                    owner: "alice".to_string(),
                },
            )
            .await
            .status,
            0
        );
        assert_eq!(
            handle(
                &state,
                Request::RESPONDREQUEST {
                    file: "f.txt".to_string(),
                    requester: "bob".to_string(),
                    user: "alice".to_string(),
                    approve: true,
                },
            )
            .await
            .status,
            0
        );

        assert_eq!(read_as(addr, "f.txt", "bob").await.status, 0);
    }

    /// `CREATE` must not consult the routing table at all: a file deleted
    /// from its Storage Server leaves a dangling route entry behind (the
    /// NM never removes routes on DELETE), and recreating that filename
    /// must still succeed because the SS itself has no file or cache entry
    /// for it. A route-based pre-check on the NM side would reject this
    /// forever.
    #[tokio::test]
    async fn create_succeeds_again_after_delete_despite_the_dangling_route() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SsStore::new(dir.path().to_path_buf()));
        store.scan_existing().await.unwrap();

        let tcp_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp_listener.local_addr().unwrap();
        tokio::spawn(ss_listener::run(tcp_listener, Arc::clone(&store)));

        let state = Arc::new(NmState::new());
        state.register_ss("ss-a", &addr.ip().to_string(), addr.port(), addr.port(), &[]);

        assert_eq!(
            create_file(&state, "f.txt", "alice").await.unwrap().status,
            0
        );
        assert_eq!(
            handle(
                &state,
                Request::DELETE {
                    file: "f.txt".to_string(),
                    user: "alice".to_string(),
                },
            )
            .await
            .status,
            0
        );
        // the route entry is still there; CREATE must still succeed.
        assert!(state.primary_route("f.txt").is_some());
        assert_eq!(
            create_file(&state, "f.txt", "alice").await.unwrap().status,
            0
        );
    }
}
