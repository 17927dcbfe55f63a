//! Interval poller
//!
//! A poller invokes an async [`Producer`] immediately and then once per
//! period until it is shut down. Every settlement, success or failure, is
//! published as a [`PollEvent`] on a broadcast channel. Failures are logged
//! and never stop the interval.
//!
//! ## Tick overlap
//!
//! A slow producer can still be running when the next tick fires.
//! [`TickPolicy`] makes the behaviour explicit:
//!
//! - `Serialize`: the tick waits for the outstanding call, missed ticks are
//!   delayed and never bursted.
//! - `Overlap`: every tick issues a new call at once; calls may settle in any
//!   order. Pair it with [`Snapshot`] and [`ResultOrdering::NewestIssued`] to
//!   drop stale results.
//!
//! ```text
//! Timer tick ──→ produce() ──→ PollEvent ──→ [Snapshot, subscribers, ...]
//!     ↑
//!     └─── Commands (PollNow, UpdateInterval, Shutdown)
//! ```
//!
//! Shutting down stops further calls. It never cancels a call already in
//! flight; such calls settle and publish as usual.

pub mod messages;
pub mod snapshot;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at};
use tracing::{debug, error, instrument, trace};

pub use messages::{PollEvent, PollerCommand};
pub use snapshot::{ResultOrdering, Snapshot, SnapshotState};

/// How a tick behaves while an earlier call is still outstanding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    #[default]
    Serialize,
    Overlap,
}

/// Source of the values a poller publishes
#[async_trait]
pub trait Producer: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    async fn produce(&self) -> Result<Self::Output>;
}

/// [`Producer`] backed by a closure returning a future
pub struct FnProducer<F>(F);

pub fn producer_fn<F, Fut, T>(f: F) -> FnProducer<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send,
    T: Clone + Send + Sync + 'static,
{
    FnProducer(f)
}

#[async_trait]
impl<F, Fut, T> Producer for FnProducer<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    async fn produce(&self) -> Result<T> {
        (self.0)().await
    }
}

/// Issue one producer call and publish its settlement
async fn invoke<P: Producer>(
    producer: Arc<P>,
    seq: u64,
    event_tx: broadcast::Sender<PollEvent<P::Output>>,
) -> Result<P::Output> {
    let issued_at = Utc::now();
    let result = producer.produce().await;

    let outcome = match &result {
        Ok(value) => {
            trace!("call {seq} settled");
            Ok(value.clone())
        }
        Err(e) => {
            error!("call {seq} failed: {e:#}");
            Err(format!("{e:#}"))
        }
    };

    // no subscribers is fine
    let _ = event_tx.send(PollEvent {
        seq,
        issued_at,
        settled_at: Utc::now(),
        outcome,
    });

    result
}

/// Actor driving one producer on an interval
pub struct PollerActor<P: Producer> {
    name: String,

    producer: Arc<P>,

    policy: TickPolicy,

    command_rx: mpsc::Receiver<PollerCommand<P::Output>>,

    event_tx: broadcast::Sender<PollEvent<P::Output>>,

    interval_duration: Duration,

    /// Number of calls issued so far, doubles as the next sequence number
    issued: Arc<AtomicU64>,
}

impl<P: Producer> PollerActor<P> {
    fn new(
        name: String,
        producer: P,
        interval_duration: Duration,
        policy: TickPolicy,
        command_rx: mpsc::Receiver<PollerCommand<P::Output>>,
        event_tx: broadcast::Sender<PollEvent<P::Output>>,
        issued: Arc<AtomicU64>,
    ) -> Self {
        Self {
            name,
            producer: Arc::new(producer),
            policy,
            command_rx,
            event_tx,
            interval_duration,
            issued,
        }
    }

    /// Run until a Shutdown command arrives or every handle is dropped
    #[instrument(skip(self), fields(poller = %self.name, policy = ?self.policy))]
    pub async fn run(mut self) {
        debug!("starting poller every {:?}", self.interval_duration);

        // first tick completes immediately, which is the initial call
        let mut ticker = self.ticker(interval(self.interval_duration));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.on_tick().await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PollerCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            self.poll_now(respond_to).await;
                        }

                        Some(PollerCommand::UpdateInterval { interval }) if interval.is_zero() => {
                            error!("ignoring zero interval");
                        }

                        Some(PollerCommand::UpdateInterval { interval }) => {
                            debug!("updating interval to {interval:?}");
                            self.interval_duration = interval;
                            ticker = self.ticker(interval_at(Instant::now() + interval, interval));
                        }

                        Some(PollerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            debug!("all handles dropped, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("poller stopped after {} calls", self.issued.load(Ordering::SeqCst));
    }

    fn ticker(&self, mut ticker: Interval) -> Interval {
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn next_seq(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst)
    }

    async fn on_tick(&self) {
        let seq = self.next_seq();
        let call = invoke(self.producer.clone(), seq, self.event_tx.clone());

        match self.policy {
            TickPolicy::Serialize => {
                // failure already logged and published
                let _ = call.await;
            }
            TickPolicy::Overlap => {
                tokio::spawn(call);
            }
        }
    }

    async fn poll_now(&self, respond_to: oneshot::Sender<Result<P::Output>>) {
        let seq = self.next_seq();
        let call = invoke(self.producer.clone(), seq, self.event_tx.clone());

        match self.policy {
            TickPolicy::Serialize => {
                let _ = respond_to.send(call.await);
            }
            TickPolicy::Overlap => {
                tokio::spawn(async move {
                    let _ = respond_to.send(call.await);
                });
            }
        }
    }
}

/// Handle for controlling a poller actor
///
/// Cloneable; the actor stops once every clone is dropped.
pub struct PollerHandle<T> {
    sender: mpsc::Sender<PollerCommand<T>>,

    event_tx: broadcast::Sender<PollEvent<T>>,

    issued: Arc<AtomicU64>,

    pub name: String,
}

impl<T> Clone for PollerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            event_tx: self.event_tx.clone(),
            issued: self.issued.clone(),
            name: self.name.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> PollerHandle<T> {
    /// Spawn a poller actor for `producer`
    ///
    /// Fails if `period` is zero.
    pub fn spawn<P>(
        name: impl ToString,
        producer: P,
        period: Duration,
        policy: TickPolicy,
    ) -> Result<Self>
    where
        P: Producer<Output = T>,
    {
        let (handle, actor) = Self::new(name, producer, period, policy)?;
        tokio::spawn(actor.run());
        Ok(handle)
    }

    /// Build a handle and its actor without starting it
    ///
    /// Subscribe before running the actor to be sure to see the initial call.
    pub fn new<P>(
        name: impl ToString,
        producer: P,
        period: Duration,
        policy: TickPolicy,
    ) -> Result<(Self, PollerActor<P>)>
    where
        P: Producer<Output = T>,
    {
        ensure!(!period.is_zero(), "poll interval must be greater than zero");

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(64);
        let issued = Arc::new(AtomicU64::new(0));
        let name = name.to_string();

        let actor = PollerActor::new(
            name.clone(),
            producer,
            period,
            policy,
            cmd_rx,
            event_tx.clone(),
            issued.clone(),
        );

        let handle = Self {
            sender: cmd_tx,
            event_tx,
            issued,
            name,
        };
        Ok((handle, actor))
    }

    /// Receive every settlement from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent<T>> {
        self.event_tx.subscribe()
    }

    /// Number of producer calls issued so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Trigger an immediate call and wait for its result
    pub async fn poll_now(&self) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn update_interval(&self, interval: Duration) -> Result<()> {
        ensure!(!interval.is_zero(), "poll interval must be greater than zero");
        self.sender
            .send(PollerCommand::UpdateInterval { interval })
            .await
            .context("failed to send UpdateInterval command")
    }

    /// Stop issuing calls; outstanding calls are left to settle
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }
}
