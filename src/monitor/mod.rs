//! Vault event monitor.
//!
//! Polls one log filter per event kind, each in its own task:
//! - filters start at the head observed when the monitor starts (no backfill)
//! - every observed entry is delivered, decoded or raw with the decode error
//! - a failed fetch is logged and retried after a multiplied backoff, and a
//!   task that keeps failing reinstalls its filter from the last block it
//!   delivered (entries in that block may be delivered twice)
//! - each kind has its own ordered channel; nothing orders kinds relative to
//!   each other
//!
//! Architecture:
//! - `EventMonitor::start` creates the filters and spawns a `PollTask` per kind
//! - `MonitorHandle` owns the per-kind receivers and the shared cancel signal
//! - `MonitorHandle::stop` cancels every task, waits for them and collects
//!   per-task summaries; tasks uninstall their filters on the way out

pub mod schema;
pub mod types;

pub use schema::{builtin_vault_events, load_abi_events, EventKind, SchemaError};
pub use types::{DecodedEvent, MonitorEvent, RawEvent};

use crate::config::MonitorConfig;
use crate::gateway::{ChainGateway, FilterId, GatewayError};

use alloy::primitives::Address;
use alloy::rpc::types::{Filter, Log};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("no event kinds requested")]
    NoKinds,
    #[error("failed to read chain head: {0}")]
    Head(#[from] GatewayError),
    #[error("no event filter could be created")]
    NoFilters,
}

/// Per-task counters, returned when the task ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub kind: String,
    pub delivered: u64,
    pub raw: u64,
    pub fetch_failures: u64,
    pub reinstalls: u32,
}

/// Ordered stream of one event kind.
pub struct EventStream {
    pub kind: String,
    rx: mpsc::UnboundedReceiver<MonitorEvent>,
}

impl EventStream {
    /// Next event, or `None` once the task has stopped and the channel drained.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        self.rx.recv().await
    }

    fn into_stream(self) -> BoxStream<'static, MonitorEvent> {
        stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }
}

pub struct EventMonitor<G> {
    gateway: Arc<G>,
    vault: Address,
    config: MonitorConfig,
}

impl<G: ChainGateway> EventMonitor<G> {
    pub fn new(gateway: Arc<G>, vault: Address, config: MonitorConfig) -> Self {
        Self {
            gateway,
            vault,
            config,
        }
    }

    /// Install a filter per kind at the current head and spawn its poll task.
    ///
    /// A kind whose filter cannot be created is skipped with a warning; only
    /// when every kind fails does `start` fail.
    pub async fn start(&self, kinds: Vec<EventKind>) -> Result<MonitorHandle, MonitorError> {
        if kinds.is_empty() {
            return Err(MonitorError::NoKinds);
        }

        let head = self.gateway.block_number().await?;
        info!(block = head, vault = %self.vault, kinds = kinds.len(), "starting event monitor at head");

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut tasks = Vec::new();
        let mut streams = Vec::new();

        for kind in kinds {
            let filter = Filter::new()
                .address(self.vault)
                .event_signature(kind.topic())
                .from_block(head);

            let filter_id = match self.gateway.create_filter(&filter).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(event = kind.name(), error = %e, "could not create event filter, skipping");
                    continue;
                }
            };
            info!(event = kind.name(), topic = %kind.topic(), "event filter installed");

            let (tx, rx) = mpsc::unbounded_channel();
            let name = kind.name().to_string();
            let task = PollTask {
                gateway: self.gateway.clone(),
                filter,
                filter_id,
                start_block: head,
                last_block: None,
                config: self.config.clone(),
                consecutive_failures: 0,
                tx,
                cancel: cancel_rx.clone(),
                summary: TaskSummary {
                    kind: name.clone(),
                    ..Default::default()
                },
                kind,
            };
            tasks.push((name.clone(), tokio::spawn(task.run())));
            streams.push(EventStream { kind: name, rx });
        }

        if tasks.is_empty() {
            return Err(MonitorError::NoFilters);
        }

        Ok(MonitorHandle {
            cancel: cancel_tx,
            tasks,
            streams,
        })
    }
}

pub struct MonitorHandle {
    cancel: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<TaskSummary>)>,
    streams: Vec<EventStream>,
}

impl MonitorHandle {
    /// Kinds with a running task.
    pub fn kinds(&self) -> Vec<&str> {
        self.tasks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Take the per-kind streams. Subsequent calls return nothing.
    pub fn take_streams(&mut self) -> Vec<EventStream> {
        std::mem::take(&mut self.streams)
    }

    /// All kinds merged into one stream. Order holds within a kind only.
    pub fn merged(&mut self) -> BoxStream<'static, MonitorEvent> {
        stream::select_all(self.take_streams().into_iter().map(EventStream::into_stream)).boxed()
    }

    /// Cancel every task and wait for them. An in-flight cycle either
    /// finishes delivering its batch or is dropped before emitting anything.
    pub async fn stop(self) -> Vec<TaskSummary> {
        let _ = self.cancel.send(true);

        let mut summaries = Vec::with_capacity(self.tasks.len());
        for (name, handle) in self.tasks {
            match handle.await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(event = %name, error = %e, "poll task ended abnormally"),
            }
        }
        info!(tasks = summaries.len(), "event monitor stopped");
        summaries
    }
}

/// One event kind's polling loop. Owns its filter cursor exclusively.
struct PollTask<G> {
    gateway: Arc<G>,
    kind: EventKind,
    filter: Filter,
    filter_id: FilterId,
    start_block: u64,
    /// Block of the last delivered entry.
    last_block: Option<u64>,
    config: MonitorConfig,
    consecutive_failures: u32,
    tx: mpsc::UnboundedSender<MonitorEvent>,
    cancel: watch::Receiver<bool>,
    summary: TaskSummary,
}

impl<G: ChainGateway> PollTask<G> {
    async fn run(mut self) -> TaskSummary {
        debug!(event = self.kind.name(), "poll task started");

        loop {
            if *self.cancel.borrow() {
                break;
            }

            let fetched = tokio::select! {
                _ = self.cancel.changed() => break,
                result = self.gateway.poll_filter(self.filter_id) => result,
            };

            let pause = match fetched {
                Ok(logs) => {
                    self.consecutive_failures = 0;
                    if !self.deliver(logs) {
                        debug!(event = self.kind.name(), "consumer gone, stopping");
                        break;
                    }
                    self.config.poll_interval()
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    self.summary.fetch_failures += 1;
                    warn!(
                        event = self.kind.name(),
                        error = %e,
                        failures = self.consecutive_failures,
                        "event stream unavailable, backing off"
                    );
                    if self.consecutive_failures >= self.config.reinstall_after_failures.max(1) {
                        self.reinstall().await;
                    }
                    self.config.backoff_interval()
                }
            };

            tokio::select! {
                _ = self.cancel.changed() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.shutdown().await
    }

    /// Decode and send a whole batch without suspending, so cancellation
    /// never splits it. Returns false once the receiver is gone.
    fn deliver(&mut self, logs: Vec<Log>) -> bool {
        for log in logs {
            if let Some(block) = log.block_number {
                self.last_block = Some(self.last_block.map_or(block, |b| b.max(block)));
            }

            let event = match self.kind.decode(&log) {
                Ok(fields) => MonitorEvent::Decoded(DecodedEvent {
                    kind: self.kind.name().to_string(),
                    tx_hash: log.transaction_hash,
                    block_number: log.block_number,
                    log_index: log.log_index,
                    fields,
                }),
                Err(error) => {
                    warn!(
                        event = self.kind.name(),
                        tx = ?log.transaction_hash,
                        error = %error,
                        "log does not match schema, delivering raw"
                    );
                    self.summary.raw += 1;
                    MonitorEvent::Raw(RawEvent {
                        kind: self.kind.name().to_string(),
                        log,
                        error,
                    })
                }
            };

            self.summary.delivered += 1;
            if self.tx.send(event).is_err() {
                return false;
            }
        }
        true
    }

    /// Replace a filter the node may have expired. Resumes from the last
    /// delivered block, never before the monitor's start.
    async fn reinstall(&mut self) {
        let from = self.last_block.unwrap_or(self.start_block).max(self.start_block);
        let filter = self.filter.clone().from_block(from);

        match self.gateway.create_filter(&filter).await {
            Ok(id) => {
                let stale = std::mem::replace(&mut self.filter_id, id);
                if let Err(e) = self.gateway.uninstall_filter(stale).await {
                    debug!(event = self.kind.name(), error = %e, "stale filter uninstall failed");
                }
                self.filter = filter;
                self.consecutive_failures = 0;
                self.summary.reinstalls += 1;
                info!(event = self.kind.name(), from_block = from, "event filter reinstalled");
            }
            Err(e) => {
                warn!(event = self.kind.name(), error = %e, "event filter reinstall failed");
            }
        }
    }

    async fn shutdown(self) -> TaskSummary {
        if let Err(e) = self.gateway.uninstall_filter(self.filter_id).await {
            debug!(event = self.kind.name(), error = %e, "filter uninstall failed");
        }
        debug!(
            event = self.kind.name(),
            delivered = self.summary.delivered,
            raw = self.summary.raw,
            "poll task stopped"
        );
        self.summary
    }
}
