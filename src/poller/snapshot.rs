//! Last-known result of a poller
//!
//! A [`Snapshot`] is the single result buffer written at settlement time.
//! Successful settlements replace the stored value wholesale; failed ones
//! keep the previous value and only record the error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::PollerHandle;
use super::messages::PollEvent;

/// Which settlement wins when calls settle out of issue order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrdering {
    /// Whatever settles last is stored, even if it was issued earlier
    #[default]
    LastSettled,
    /// Settlements older than the stored one are discarded
    NewestIssued,
}

#[derive(Debug, Clone)]
pub struct SnapshotState<T> {
    pub value: Option<T>,

    /// Sequence number of the call that produced the stored value or error
    pub applied_seq: Option<u64>,

    pub last_error: Option<String>,

    /// Settlements seen, including discarded ones
    pub settled: u64,

    pub updated_at: Option<DateTime<Utc>>,

    /// A refresh was asked for and nothing has settled since
    pub refreshing: bool,
}

impl<T> Default for SnapshotState<T> {
    fn default() -> Self {
        Self {
            value: None,
            applied_seq: None,
            last_error: None,
            settled: 0,
            updated_at: None,
            refreshing: false,
        }
    }
}

/// Shared last-known value, cheap to clone
#[derive(Debug)]
pub struct Snapshot<T> {
    state: Arc<RwLock<SnapshotState<T>>>,
    ordering: ResultOrdering,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            ordering: self.ordering,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Snapshot<T> {
    pub fn new(ordering: ResultOrdering) -> Self {
        Self {
            state: Arc::new(RwLock::new(SnapshotState::default())),
            ordering,
        }
    }

    /// Record a settlement; returns false if it was discarded as stale
    pub async fn apply(&self, event: &PollEvent<T>) -> bool {
        let mut state = self.state.write().await;
        state.settled += 1;
        state.refreshing = false;

        let stale = self.ordering == ResultOrdering::NewestIssued
            && state.applied_seq.is_some_and(|applied| applied >= event.seq);
        if stale {
            trace!("discarding stale result {}", event.seq);
            return false;
        }

        match &event.outcome {
            Ok(value) => {
                state.value = Some(value.clone());
                state.last_error = None;
            }
            Err(e) => {
                state.last_error = Some(e.clone());
            }
        }
        state.applied_seq = Some(event.seq);
        state.updated_at = Some(event.settled_at);
        true
    }

    pub async fn value(&self) -> Option<T> {
        self.state.read().await.value.clone()
    }

    /// Flag an explicit refresh; cleared by the next settlement
    pub async fn mark_loading(&self) {
        self.state.write().await.refreshing = true;
    }

    /// True until the first settlement arrived, and again while an explicit
    /// refresh is outstanding
    pub async fn is_loading(&self) -> bool {
        let state = self.state.read().await;
        state.settled == 0 || state.refreshing
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn applied_seq(&self) -> Option<u64> {
        self.state.read().await.applied_seq
    }

    pub async fn state(&self) -> SnapshotState<T> {
        self.state.read().await.clone()
    }

    /// Keep applying events from `handle` until its poller is gone
    pub fn follow(&self, handle: &PollerHandle<T>) -> JoinHandle<()> {
        let snapshot = self.clone();
        let mut events = handle.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        snapshot.apply(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("snapshot lagged behind, skipped {skipped} results");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("poller gone, snapshot stops following");
                        break;
                    }
                }
            }
        })
    }
}
