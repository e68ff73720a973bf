// src/core/nameserver/failure_detector.rs

//! The background sweep that marks Storage Servers dead after a missed
//! heartbeat window, mirroring the tick-loop shape used elsewhere in this
//! codebase for periodic liveness checks.

use std::sync::Arc;
use std::time::Duration;

use super::state::NmState;

/// Runs forever, waking every `check_interval` to mark any node whose last
/// heartbeat is older than `timeout` as dead.
pub async fn run(state: Arc<NmState>, check_interval: Duration, timeout: Duration) {
    let mut ticker = tokio::time::interval(check_interval);
    loop {
        ticker.tick().await;
        let newly_dead = state.sweep(timeout);
        for ss_id in newly_dead {
            tracing::warn!(ss_id = %ss_id, "storage server marked dead after heartbeat timeout");
        }
    }
}
