//! Telemetry Actor
//!
//! Publishes heartbeats and monitoring rows off the trading loop. Events go
//! through a bounded channel to a fixed pool of workers that write them to the
//! ledger. Publishing never waits: when the queue is full the event is dropped
//! and counted. Events carry no ordering guarantee between workers.

use crate::domain::entities::telemetry::{BotStatus, MonitoringSnapshot};
use crate::domain::repositories::ledger_store::LedgerStore;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Heartbeat(BotStatus),
    Monitoring(MonitoringSnapshot),
}

impl TelemetryEvent {
    fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::Heartbeat(_) => "heartbeat",
            TelemetryEvent::Monitoring(_) => "monitoring",
        }
    }
}

#[derive(Debug, Default)]
struct TelemetryCounters {
    published: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of the sink counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetryStats {
    pub published: u64,
    pub written: u64,
    /// Rejected because the queue was full or closed
    pub dropped: u64,
    /// Ledger write failed
    pub failed: u64,
}

/// Cheap, cloneable publishing side of the sink
#[derive(Clone)]
pub struct TelemetryHandle {
    sender: mpsc::Sender<TelemetryEvent>,
    counters: Arc<TelemetryCounters>,
}

impl TelemetryHandle {
    /// Queue an event without waiting. Returns false when it was dropped.
    pub fn publish(&self, event: TelemetryEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = event.kind(), "Telemetry queue full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = event.kind(), "Telemetry sink closed, event dropped");
                false
            }
        }
    }

    pub fn heartbeat(&self, status: BotStatus) -> bool {
        self.publish(TelemetryEvent::Heartbeat(status))
    }

    pub fn monitoring(&self, snapshot: MonitoringSnapshot) -> bool {
        self.publish(TelemetryEvent::Monitoring(snapshot))
    }

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            published: self.counters.published.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

/// Worker pool owning the receiving side
pub struct TelemetrySink {
    handle: TelemetryHandle,
    workers: Vec<JoinHandle<()>>,
}

impl TelemetrySink {
    pub fn spawn(ledger: Arc<dyn LedgerStore>, config: TelemetryConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(TelemetryCounters::default());

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                let ledger = ledger.clone();
                let counters = counters.clone();
                tokio::spawn(async move {
                    Self::run_worker(worker_id, receiver, ledger, counters).await;
                })
            })
            .collect();

        info!(
            workers = config.workers.max(1),
            capacity = config.queue_capacity.max(1),
            "Telemetry sink started"
        );

        Self {
            handle: TelemetryHandle { sender, counters },
            workers,
        }
    }

    pub fn handle(&self) -> TelemetryHandle {
        self.handle.clone()
    }

    async fn run_worker(
        worker_id: usize,
        receiver: Arc<Mutex<mpsc::Receiver<TelemetryEvent>>>,
        ledger: Arc<dyn LedgerStore>,
        counters: Arc<TelemetryCounters>,
    ) {
        loop {
            // Lock only while waiting for the next event
            let event = {
                let mut receiver = receiver.lock().await;
                receiver.recv().await
            };
            let Some(event) = event else {
                break;
            };

            let result = match &event {
                TelemetryEvent::Heartbeat(status) => ledger.upsert_status(status).await,
                TelemetryEvent::Monitoring(snapshot) => ledger.upsert_monitoring(snapshot).await,
            };
            match result {
                Ok(()) => {
                    counters.written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!(worker = worker_id, kind = event.kind(), "Telemetry write failed: {}", e);
                }
            }
        }
        debug!(worker = worker_id, "Telemetry worker stopped");
    }

    /// Stop accepting events and wait for queued ones to be written.
    ///
    /// Workers finish once every handle is dropped; `grace` bounds the wait.
    pub async fn shutdown(self, grace: Duration) -> TelemetryStats {
        let TelemetrySink { handle, workers } = self;
        let counters = handle.counters.clone();
        drop(handle);

        if tokio::time::timeout(grace, join_all(workers)).await.is_err() {
            warn!("Telemetry workers did not drain within {:?}", grace);
        }

        let stats = TelemetryStats {
            published: counters.published.load(Ordering::Relaxed),
            written: counters.written.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        };
        info!(
            published = stats.published,
            written = stats.written,
            dropped = stats.dropped,
            failed = stats.failed,
            "Telemetry sink stopped"
        );
        stats
    }
}
