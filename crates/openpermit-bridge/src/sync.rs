//! Sync Loop
//!
//! Long-polls the transport and feeds every raw message through a bounded
//! channel to a dispatcher task, which hands them to
//! [`PermitBridge::handle_inbound`]. Waiting on the network and dispatching
//! run independently.
//!
//! Transport failures other than authentication loss are retried under the
//! configured [`RetryPolicy`](openpermit_transport::RetryPolicy). Losing
//! authentication ends the loop with [`BridgeError::Auth`].

use crate::bridge::PermitBridge;
use crate::config::SyncConfig;
use crate::inbound::InboundOutcome;
use openpermit_core::effects::{ChatTransport, RawMessage, Session};
use openpermit_core::{BridgeError, Result};
use openpermit_transport::{Backoff, RetryDecision};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Messages buffered between polling and dispatch
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Owner side of a stop signal
///
/// Dropping the handle stops every loop watching it.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// New handle in the running state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Signal to hand to a loop
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Ask every watching loop to stop after its current step
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Watching side of a stop signal
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Whether a stop has been requested
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once a stop is requested or the handle is gone
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Counts kept by the dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages taken off the queue
    pub received: u64,
    /// Messages that were not permit events from other participants
    pub ignored: u64,
    /// Permit events dropped by parsing or validation
    pub dropped: u64,
    /// Permit events dispatched
    pub dispatched: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: &InboundOutcome) {
        self.received += 1;
        match outcome {
            InboundOutcome::Ignored { .. } => self.ignored += 1,
            InboundOutcome::Dropped { .. } => self.dropped += 1,
            InboundOutcome::Dispatched { .. } => self.dispatched += 1,
        }
    }
}

/// Counts returned when a sync loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Long-poll calls issued, including one cut short by stop
    pub polls: u64,
    /// Raw messages received
    pub messages: u64,
    /// Failed polls that were retried
    pub transient_errors: u64,
    /// What the dispatcher did with the messages
    pub dispatch: DispatchStats,
}

/// Drains a message queue into the bridge
#[derive(Debug, Clone)]
pub struct InboundDispatcher {
    bridge: Arc<PermitBridge>,
}

impl InboundDispatcher {
    /// Dispatcher feeding `bridge`
    pub fn new(bridge: Arc<PermitBridge>) -> Self {
        Self { bridge }
    }

    /// Handle messages until the queue is closed and empty
    pub async fn run(self, mut queue: mpsc::Receiver<RawMessage>) -> DispatchStats {
        let mut stats = DispatchStats::default();
        while let Some(raw) = queue.recv().await {
            let outcome = self.bridge.handle_inbound(&raw).await;
            stats.record(&outcome);
        }
        stats
    }
}

/// Long-running poll loop for one logged-in session
pub struct SyncLoop {
    transport: Arc<dyn ChatTransport>,
    bridge: Arc<PermitBridge>,
    config: SyncConfig,
    queue_capacity: usize,
}

enum PollEnd {
    Stopped,
    Failed(BridgeError),
}

impl SyncLoop {
    /// Loop polling `transport` on behalf of `bridge`
    pub fn new(transport: Arc<dyn ChatTransport>, bridge: Arc<PermitBridge>, config: SyncConfig) -> Self {
        Self {
            transport,
            bridge,
            config,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Bound on messages waiting for dispatch
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Poll and dispatch until `stop` fires or authentication is lost
    ///
    /// Requires the session from a successful login as the bridge user. On
    /// stop, messages already queued are dispatched before returning; the
    /// rest of an in-flight batch is not.
    pub async fn run_forever(&self, session: &Session, mut stop: StopSignal) -> Result<SyncStats> {
        if session.user_id != *self.bridge.user_id() {
            return Err(BridgeError::config(format!(
                "session belongs to {} but the bridge acts as {}",
                session.user_id,
                self.bridge.user_id()
            )));
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let dispatcher = tokio::spawn(InboundDispatcher::new(self.bridge.clone()).run(rx));

        info!(user = %session.user_id, poll_timeout_ms = self.config.poll_timeout_ms, "Sync loop started");
        let mut stats = SyncStats::default();
        let end = self.poll(&tx, &mut stop, &mut stats).await;
        drop(tx);

        match dispatcher.await {
            Ok(dispatch) => stats.dispatch = dispatch,
            Err(err) => error!(error = %err, "Inbound dispatcher task failed"),
        }

        match end {
            PollEnd::Stopped => {
                info!(
                    polls = stats.polls,
                    messages = stats.messages,
                    transient_errors = stats.transient_errors,
                    dispatched = stats.dispatch.dispatched,
                    "Sync loop stopped"
                );
                Ok(stats)
            }
            PollEnd::Failed(err) => {
                error!(error = %err, polls = stats.polls, messages = stats.messages, "Sync loop terminated");
                Err(err)
            }
        }
    }

    async fn poll(
        &self,
        tx: &mpsc::Sender<RawMessage>,
        stop: &mut StopSignal,
        stats: &mut SyncStats,
    ) -> PollEnd {
        let timeout = self.config.poll_timeout();
        let mut backoff = Backoff::new(self.config.retry.clone());

        loop {
            if stop.is_stopped() {
                return PollEnd::Stopped;
            }

            stats.polls += 1;
            let result = tokio::select! {
                _ = stop.stopped() => return PollEnd::Stopped,
                result = self.transport.wait_for_updates(timeout) => result,
            };

            match result {
                Ok(batch) => {
                    backoff.record_success();
                    if !batch.is_empty() {
                        debug!(count = batch.len(), "Received inbound batch");
                    }
                    for raw in batch {
                        stats.messages += 1;
                        let sent = tokio::select! {
                            _ = stop.stopped() => return PollEnd::Stopped,
                            sent = tx.send(raw) => sent,
                        };
                        if sent.is_err() {
                            return PollEnd::Failed(BridgeError::config(
                                "inbound dispatcher stopped unexpectedly",
                            ));
                        }
                    }
                }
                Err(err) if err.is_fatal() => return PollEnd::Failed(err.into()),
                Err(err) => {
                    stats.transient_errors += 1;
                    match backoff.record_failure() {
                        RetryDecision::Retry { attempt, delay } => {
                            if err.is_transient() {
                                warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "Transient sync failure, retrying");
                            } else {
                                error!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "Sync request failed, retrying");
                            }
                            tokio::select! {
                                _ = stop.stopped() => return PollEnd::Stopped,
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        RetryDecision::GiveUp { attempts } => {
                            error!(error = %err, attempts, "Giving up on sync after repeated failures");
                            return PollEnd::Failed(err.into());
                        }
                    }
                }
            }

            tokio::task::yield_now().await;
        }
    }
}

impl std::fmt::Debug for SyncLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncLoop")
            .field("config", &self.config)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}
