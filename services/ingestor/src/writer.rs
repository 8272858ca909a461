//! Batched, transactional tick persistence
//!
//! A single writer task owns the pending batch, the deadline timer,
//! and the topic-id cache. Both enqueue commands and timer fires
//! funnel through its one `select!` loop, so the swap-and-clear batch
//! hand-off needs no locking at all.
//!
//! Failure policy: a flush that fails — topic-id resolution or the
//! insert transaction — drops the whole batch after logging. Items
//! are not re-enqueued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use types::tick::Tick;
use types::topic::TopicMeta;

use crate::batch::{BatcherConfig, PushOutcome, TickBatcher};
use crate::metrics::PipelineMetrics;
use crate::store::{TickRow, TickStore};

enum Command {
    Enqueue(Tick),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the writer task. Cloneable; all clones share the
/// shutdown flag.
#[derive(Clone)]
pub struct BatchWriterHandle {
    tx: mpsc::UnboundedSender<Command>,
    shutting_down: Arc<AtomicBool>,
    metrics: Arc<PipelineMetrics>,
}

impl BatchWriterHandle {
    /// Append a tick to the pending batch. Never blocks, never fails;
    /// after shutdown has been initiated this is a logged no-op.
    pub fn enqueue(&self, tick: Tick) {
        if self.shutting_down.load(Ordering::Acquire) {
            warn!(topic = %tick.topic, "Writer shutting down — dropping tick");
            self.metrics.incr(&self.metrics.ticks_dropped_shutdown);
            return;
        }
        match self.tx.send(Command::Enqueue(tick)) {
            Ok(()) => self.metrics.incr(&self.metrics.ticks_enqueued),
            Err(mpsc::error::SendError(cmd)) => {
                if let Command::Enqueue(tick) = cmd {
                    warn!(topic = %tick.topic, "Writer task gone — dropping tick");
                }
                self.metrics.incr(&self.metrics.ticks_dropped_shutdown);
            }
        }
    }

    /// Initiate shutdown: further enqueues become no-ops, one final
    /// flush of whatever is pending is honored, then the task exits.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        info!("Writer shut down");
    }
}

/// Spawn the writer task.
pub fn spawn(
    store: Arc<dyn TickStore>,
    config: BatcherConfig,
    metrics: Arc<PipelineMetrics>,
) -> BatchWriterHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(writer_task(rx, store, config, metrics.clone()));
    BatchWriterHandle {
        tx,
        shutting_down: Arc::new(AtomicBool::new(false)),
        metrics,
    }
}

async fn writer_task(
    mut rx: mpsc::UnboundedReceiver<Command>,
    store: Arc<dyn TickStore>,
    config: BatcherConfig,
    metrics: Arc<PipelineMetrics>,
) {
    info!(
        max_size = config.max_size,
        max_wait_ms = config.max_wait.as_millis() as u64,
        "Writer task started"
    );

    let mut batcher = TickBatcher::new(config);
    let mut topic_ids: HashMap<String, i64> = HashMap::new();

    loop {
        let deadline = batcher.deadline();
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Enqueue(tick)) => {
                    if let PushOutcome::SizeTriggered(batch) =
                        batcher.push(tick, Instant::now())
                    {
                        flush(store.as_ref(), &mut topic_ids, batch, &metrics).await;
                    }
                }
                Some(Command::Shutdown(ack)) => {
                    let batch = batcher.take();
                    if !batch.is_empty() {
                        flush(store.as_ref(), &mut topic_ids, batch, &metrics).await;
                    }
                    let _ = ack.send(());
                    break;
                }
                None => {
                    // All handles dropped; behave like shutdown.
                    let batch = batcher.take();
                    if !batch.is_empty() {
                        flush(store.as_ref(), &mut topic_ids, batch, &metrics).await;
                    }
                    break;
                }
            },
            _ = wait_until(deadline) => {
                let batch = batcher.take();
                if !batch.is_empty() {
                    flush(store.as_ref(), &mut topic_ids, batch, &metrics).await;
                }
            }
        }
    }
}

/// Sleep until the deadline, or forever when no batch is pending.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Persist one drained batch: resolve topic ids (cache first), then
/// insert every row in one transaction.
async fn flush(
    store: &dyn TickStore,
    topic_ids: &mut HashMap<String, i64>,
    batch: Vec<Tick>,
    metrics: &PipelineMetrics,
) {
    let size = batch.len();
    let mut rows = Vec::with_capacity(size);

    for tick in &batch {
        let topic_id = match topic_ids.get(&tick.topic) {
            Some(id) => *id,
            None => match store.resolve_topic_id(&topic_meta(tick)).await {
                Ok(id) => {
                    topic_ids.insert(tick.topic.clone(), id);
                    id
                }
                Err(err) => {
                    error!(
                        topic = %tick.topic,
                        batch_size = size,
                        error = %err,
                        "Topic resolution failed — dropping batch"
                    );
                    metrics.incr(&metrics.flush_failures);
                    return;
                }
            },
        };
        rows.push(TickRow {
            topic_id,
            price: tick.price,
            received_at: tick.received_at.unwrap_or_else(chrono::Utc::now),
        });
    }

    match store.insert_ticks(&rows).await {
        Ok(written) => {
            metrics.incr(&metrics.batches_flushed);
            metrics.add(&metrics.rows_written, written);
            debug!(batch_size = size, written, "Batch flushed");
        }
        Err(err) => {
            error!(batch_size = size, error = %err, "Flush failed — dropping batch");
            metrics.incr(&metrics.flush_failures);
        }
    }
}

/// Topic metadata for first-sight registration: derived from the
/// topic string, backfilled from what the decoder knew.
fn topic_meta(tick: &Tick) -> TopicMeta {
    let mut meta = TopicMeta::from_topic(&tick.topic);
    if meta.index_name.is_none() {
        meta.index_name = tick.index_name.clone();
    }
    if meta.strike.is_none() {
        meta.strike = tick.strike;
    }
    meta
}
