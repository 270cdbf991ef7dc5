//! Progress bus — process-local fan-out of execution progress snapshots.
//!
//! One broadcast channel per execution id, created lazily on first
//! subscription. Emits to an execution nobody watches are dropped; a
//! subscriber that went away (dropped its receiver) never halts the emit
//! loop. The bus is shared via `Clone` (all clones see the same table).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::models::ExecutionProgress;

/// Events buffered per channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 256;

pub struct ProgressBus {
    channels: Arc<RwLock<HashMap<i64, broadcast::Sender<ExecutionProgress>>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to progress snapshots for one execution.
    ///
    /// Dropping the returned receiver deregisters the subscriber; the
    /// channel itself is reclaimed by [`ProgressBus::cleanup_idle`].
    pub async fn subscribe(&self, execution_id: i64) -> broadcast::Receiver<ExecutionProgress> {
        // Fast path: channel already exists.
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(&execution_id) {
                return sender.subscribe();
            }
        }

        let mut channels = self.channels.write().await;
        // Double-check: another task may have created it while we waited.
        channels
            .entry(execution_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a snapshot to every subscriber of its execution.
    ///
    /// Snapshots for a given execution are observed in emit order.
    pub async fn emit(&self, progress: ExecutionProgress) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(&progress.execution_id) {
            if let Err(err) = sender.send(progress) {
                // All receivers gone; nothing to deliver.
                debug!(
                    execution_id = err.0.execution_id,
                    "progress emit with no live subscribers"
                );
            }
        }
    }

    /// Number of live subscribers for an execution.
    pub async fn subscriber_count(&self, execution_id: i64) -> usize {
        let channels = self.channels.read().await;
        channels
            .get(&execution_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Drop channels whose last subscriber has gone away. Returns the
    /// number of channels reclaimed.
    pub async fn cleanup_idle(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ProgressBus {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
        }
    }
}
