//! Worker state and event lifetimes.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::warn;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Constructed, not yet installing.
    #[default]
    Parsed,
    /// Install event running.
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activate event running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Install failed, or replaced by a newer version.
    Redundant,
}

/// Work an event must outlive.
///
/// Futures handed to [`wait_until`](Self::wait_until) start running right
/// away on the tokio runtime; the event is finished once [`settled`](Self::settled)
/// returns. Dropping an `ExtendLifetime` without settling does not cancel the
/// work.
#[derive(Debug, Default)]
pub struct ExtendLifetime {
    pending: Vec<JoinHandle<()>>,
}

impl ExtendLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `work` and keep the event alive until it completes.
    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.push(tokio::spawn(work));
    }

    /// Number of registered futures.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for every registered future.
    pub async fn settled(self) {
        for handle in self.pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Extended event work panicked");
            }
        }
    }
}
