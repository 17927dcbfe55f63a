//! Fan-out aggregation with partial-failure tolerance
//!
//! One request per group is issued concurrently; once every request has
//! settled, the successful group results are concatenated in group order.
//! A failed group never contributes records. Whether its failure is
//! reported alongside the merged items is decided by [`FailurePolicy`].
//!
//! ```text
//! groups ──┬── fetch(g0) ──┐
//!          ├── fetch(g1) ──┼── join_all ── merge (group order) ── Aggregate
//!          └── fetch(gN) ──┘
//! ```

use std::fmt::Display;
use std::future::Future;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace, warn};

/// What happens to groups whose fetch failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and leave it out of the result entirely
    #[default]
    Drop,
    /// Attach every failure to [`Aggregate::failures`]
    Report,
}

/// A group whose fetch failed
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFailure<G> {
    /// Position of the group in the input
    pub index: usize,
    pub group: G,
    pub error: String,
}

/// Merged result of a fan-out
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate<G, T> {
    pub items: Vec<T>,
    /// Always empty under [`FailurePolicy::Drop`]
    pub failures: Vec<GroupFailure<G>>,
}

impl<G, T> Aggregate<G, T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<G, T> Default for Aggregate<G, T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Fetch every group concurrently and merge the successful results
///
/// Order of `items` follows the order of `groups`, and within a group the
/// order the fetch returned. Failed groups are never retried.
#[instrument(skip_all, fields(groups = groups.len(), ?policy))]
pub async fn fan_out<G, T, E, F, Fut>(
    groups: Vec<G>,
    fetch: F,
    policy: FailurePolicy,
) -> Aggregate<G, T>
where
    G: Clone + std::fmt::Debug,
    E: Display,
    F: Fn(G) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let settlements = join_all(groups.iter().cloned().map(&fetch)).await;

    let mut aggregate = Aggregate::default();
    for (index, (group, settlement)) in groups.into_iter().zip(settlements).enumerate() {
        match settlement {
            Ok(mut items) => {
                trace!("group {index} ({group:?}) settled with {} items", items.len());
                aggregate.items.append(&mut items);
            }
            Err(e) => {
                warn!("group {index} ({group:?}) failed: {e:#}");
                if policy == FailurePolicy::Report {
                    aggregate.failures.push(GroupFailure {
                        index,
                        group,
                        error: format!("{e:#}"),
                    });
                }
            }
        }
    }

    aggregate
}
