// src/core/nameserver/state.rs

//! Cluster membership and file routing, the Name Server's owned state.
//! Bundled into a single `NmState` handed to every connection handler by
//! reference, the way a systems rewrite of this cluster's coordinator
//! bundles its mutable state into one owner object.

use dashmap::DashMap;
use dashmap::DashSet;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SsNode {
    pub ss_id: String,
    pub host: String,
    pub client_port: u16,
    pub nm_port: u16,
    pub alive: bool,
    pub last_heartbeat: Instant,
    pub replica_of: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileRoute {
    pub primary_ss_id: String,
}

#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub file: String,
    pub requester: String,
    pub owner: String,
    pub pending: bool,
}

/// Result of resolving a route for a payload-heavy op, carrying whether the
/// answer fell back to the replica.
pub struct Route {
    pub node: SsNode,
    pub is_replica: bool,
}

#[derive(Default)]
pub struct NmState {
    nodes: DashMap<String, SsNode>,
    registration_order: Mutex<Vec<String>>,
    routes: DashMap<String, FileRoute>,
    users: DashSet<String>,
    access_requests: Mutex<Vec<AccessRequest>>,
}

impl NmState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or recovers) a Storage Server node. Returns whether this
    /// was a brand-new node (as opposed to a recovering one).
    pub fn register_ss(
        &self,
        ss_id: &str,
        host: &str,
        client_port: u16,
        nm_port: u16,
        files: &[String],
    ) -> bool {
        let is_new = !self.nodes.contains_key(ss_id);

        if is_new {
            // Sequential pairing: the most recently registered live node,
            // if it isn't itself a replica, becomes this node's primary.
            let replica_of = {
                let order = self.registration_order.lock();
                order.last().and_then(|prev_id| {
                    self.nodes.get(prev_id).and_then(|prev| {
                        if prev.alive && prev.replica_of.is_none() {
                            Some(prev_id.clone())
                        } else {
                            None
                        }
                    })
                })
            };

            self.nodes.insert(
                ss_id.to_string(),
                SsNode {
                    ss_id: ss_id.to_string(),
                    host: host.to_string(),
                    client_port,
                    nm_port,
                    alive: true,
                    last_heartbeat: Instant::now(),
                    replica_of,
                },
            );
            self.registration_order.lock().push(ss_id.to_string());
        } else if let Some(mut node) = self.nodes.get_mut(ss_id) {
            node.alive = true;
            node.last_heartbeat = Instant::now();
            node.host = host.to_string();
            node.client_port = client_port;
            node.nm_port = nm_port;
        }

        for file in files {
            self.map_file_to_primary(file, ss_id);
        }

        is_new
    }

    /// Refreshes a node's liveness timestamp. Returns `Some(was_dead)` if
    /// the node is known, `None` if it has never registered.
    pub fn heartbeat(&self, ss_id: &str) -> Option<bool> {
        let mut node = self.nodes.get_mut(ss_id)?;
        let was_dead = !node.alive;
        node.alive = true;
        node.last_heartbeat = Instant::now();
        Some(was_dead)
    }

    /// Runs one failure-detector sweep, marking any node whose last
    /// heartbeat is older than `timeout` as dead. Returns the ids newly
    /// marked dead, for logging.
    pub fn sweep(&self, timeout: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut newly_dead = Vec::new();
        for mut entry in self.nodes.iter_mut() {
            if entry.alive && now.duration_since(entry.last_heartbeat) > timeout {
                entry.alive = false;
                newly_dead.push(entry.ss_id.clone());
            }
        }
        newly_dead
    }

    pub fn add_user(&self, user: &str) {
        self.users.insert(user.to_string());
    }

    pub fn remove_user(&self, user: &str) -> bool {
        self.users.remove(user).is_some()
    }

    /// Newline-joined list of every currently mapped filename.
    pub fn view_all(&self) -> String {
        self.routes
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn list_users(&self) -> String {
        let mut users: Vec<String> = self.users.iter().map(|u| u.clone()).collect();
        users.sort();
        users.join(",")
    }

    /// Any currently live node, for ops that don't target a specific file
    /// (new-file placement, folder operations).
    pub fn any_live_ss(&self) -> Option<SsNode> {
        self.nodes.iter().find(|n| n.alive).map(|n| n.clone())
    }

    pub fn map_file_to_primary(&self, file: &str, ss_id: &str) {
        self.routes.insert(
            file.to_string(),
            FileRoute {
                primary_ss_id: ss_id.to_string(),
            },
        );
    }

    /// Renames a routed file's key (used on `MOVE`). A route for an
    /// unrecognized `old_file` is a no-op.
    pub fn rename_file(&self, old_file: &str, new_file: &str) {
        if let Some((_, route)) = self.routes.remove(old_file) {
            self.routes.insert(new_file.to_string(), route);
        }
    }

    /// Direct primary lookup, ignoring liveness, for control-plane ops that
    /// must target the canonical copy (DELETE, INFO, ADDACCESS, REMACCESS).
    pub fn primary_route(&self, file: &str) -> Option<SsNode> {
        let route = self.routes.get(file)?;
        self.nodes.get(&route.primary_ss_id).map(|n| n.clone())
    }

    /// Any node currently replicating `primary_ss_id`.
    pub fn replica_node_of(&self, primary_ss_id: &str) -> Option<SsNode> {
        self.nodes
            .iter()
            .find(|n| n.replica_of.as_deref() == Some(primary_ss_id))
            .map(|n| n.clone())
    }

    /// Failover-aware route resolution: the primary if alive, otherwise the
    /// replica if alive. Used by READ_ROUTE/WRITE_ROUTE/STREAM_ROUTE and by
    /// the NM's proxying of MOVE/CHECKPOINT/VIEWCHECKPOINT/REVERT/LISTCHECKPOINTS.
    pub fn failover_route(&self, file: &str) -> Option<Route> {
        let route = self.routes.get(file)?;
        if let Some(primary) = self.nodes.get(&route.primary_ss_id)
            && primary.alive
        {
            return Some(Route {
                node: primary.clone(),
                is_replica: false,
            });
        }
        let replica = self.replica_node_of(&route.primary_ss_id)?;
        if replica.alive {
            Some(Route {
                node: replica,
                is_replica: true,
            })
        } else {
            None
        }
    }

    pub fn request_access(&self, file: &str, requester: &str, owner: &str) -> bool {
        let mut requests = self.access_requests.lock();
        let exists = requests
            .iter()
            .any(|r| r.pending && r.file == file && r.requester == requester);
        if exists {
            return false;
        }
        requests.push(AccessRequest {
            file: file.to_string(),
            requester: requester.to_string(),
            owner: owner.to_string(),
            pending: true,
        });
        true
    }

    pub fn pending_requests_for_owner(&self, owner: &str) -> Vec<AccessRequest> {
        self.access_requests
            .lock()
            .iter()
            .filter(|r| r.pending && r.owner == owner)
            .cloned()
            .collect()
    }

    /// Resolves a pending request. Returns the resolved request if one
    /// matched `(file, requester, owner)`.
    pub fn respond_request(
        &self,
        file: &str,
        requester: &str,
        owner: &str,
    ) -> Option<AccessRequest> {
        let mut requests = self.access_requests.lock();
        let entry = requests
            .iter_mut()
            .find(|r| r.pending && r.file == file && r.requester == requester && r.owner == owner)?;
        entry.pending = false;
        Some(entry.clone())
    }
}
