//! Best-effort wake-ups
//!
//! Each client session owns a `WakeSignal` and registers it in its client
//! record. Publishers wake every connected client whose mirrored filters
//! match the topic. A wake-up only shortens the subscriber's wait; clients
//! still poll, so a lost or spurious wake-up never loses a message.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::broker::state::BrokerState;
use crate::broker::topic::topic_matches;

#[derive(Debug, Clone, Default)]
pub struct WakeSignal(Arc<Notify>);

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire and forget. If nobody is waiting, the next wait returns at once.
    pub fn wake(&self) {
        self.0.notify_one();
    }

    /// Wait up to `timeout` for a wake-up. Returns true if woken early.
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.0.notified()).await.is_ok()
    }
}

/// Wake every connected client with a filter matching `topic`.
///
/// Runs under the broker lock. Returns how many clients were signalled.
pub(crate) fn notify_subscribers(state: &BrokerState, topic: &str) -> usize {
    let mut woken = 0;
    for record in state.clients.iter().filter(|r| r.connected) {
        if !record.filters.iter().any(|f| topic_matches(topic, f)) {
            continue;
        }
        if let Some(waker) = &record.waker {
            waker.wake();
            woken += 1;
        }
    }
    woken
}
