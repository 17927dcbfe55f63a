//! Message types for poller communication
//!
//! Commands travel to the actor over an mpsc channel; every settled producer
//! call is broadcast as a [`PollEvent`] to any number of subscribers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// Event published whenever a producer call settles
///
/// Calls may settle out of order when ticks overlap; `seq` is the order in
/// which they were issued.
#[derive(Debug, Clone)]
pub struct PollEvent<T> {
    /// Issue order, starting at 0 for the initial call
    pub seq: u64,

    pub issued_at: DateTime<Utc>,

    pub settled_at: DateTime<Utc>,

    /// Payload, or the rendered error chain of the failed call
    pub outcome: Result<T, String>,
}

impl<T> PollEvent<T> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Commands that can be sent to a poller actor
#[derive(Debug)]
pub enum PollerCommand<T> {
    /// Invoke the producer right away, outside the interval
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<T>>,
    },

    /// Restart the interval with a new period
    ///
    /// The next tick fires one full period after the update.
    UpdateInterval { interval: Duration },

    /// Stop issuing calls; calls already in flight still settle
    Shutdown,
}
