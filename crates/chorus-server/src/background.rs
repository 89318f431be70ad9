//! Background tasks for the chorus server.
//!
//! Includes:
//! - Pruning idle conversation history.

use crate::AppState;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Starts the conversation pruning task.
///
/// Runs indefinitely, periodically dropping conversation history for calls
/// that have gone idle longer than the configured TTL. History lives only in
/// memory; without pruning, abandoned calls would accumulate forever.
pub async fn start_pruning_task(state: Arc<AppState>, ttl_seconds: u64) {
    if ttl_seconds == 0 {
        tracing::warn!("conversation pruning task disabled (ttl=0)");
        return;
    }

    // Run check every 60 seconds or ttl/2, whichever is smaller (but min 1s)
    let interval_seconds = (ttl_seconds / 2).clamp(1, 60);
    let interval = Duration::from_secs(interval_seconds);

    tracing::info!(
        ttl_seconds,
        interval_seconds,
        "starting conversation pruning task"
    );

    loop {
        sleep(interval).await;

        let pruned = state
            .pipeline
            .ai()
            .prune_idle(Duration::from_secs(ttl_seconds))
            .await;

        if pruned > 0 {
            tracing::info!(count = pruned, "pruned idle conversations");
        }
    }
}
