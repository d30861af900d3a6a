use std::mem;
use std::sync::{Arc, Mutex};

use crmsync_db::actions::models::ActionEvent;
use crmsync_db::actions::repositories::ActionRepository;
use tokio::sync::{mpsc, oneshot};

use crate::error::SyncError;

/// Snapshots waiting for the flusher before the buffer task blocks.
const FLUSH_BACKLOG: usize = 8;

/// Totals for the flushes completed since the previous drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub flushes: usize,
    pub items: usize,
}

enum Command {
    Push(ActionEvent),
    Drain(oneshot::Sender<DrainReport>),
}

enum FlushJob {
    Batch(Vec<ActionEvent>),
    Barrier(oneshot::Sender<DrainReport>),
}

type Failure = Arc<Mutex<Option<String>>>;

/// Accumulates action events and writes them to the sink in batches.
///
/// Producers hold cloned handles and send into a bounded channel. One task
/// owns the buffer: when it grows past `flush_threshold` the buffer is
/// swapped for an empty one and the snapshot goes to a separate flusher
/// task, which writes snapshots in the order they were taken. `drain` sends
/// whatever is left and waits until the flusher has caught up.
///
/// The first failed flush poisons the queue: every later `push` and `drain`
/// returns [`SyncError::SinkWrite`].
#[derive(Clone)]
pub struct BatchQueue {
    tx: mpsc::Sender<Command>,
    failure: Failure,
}

impl BatchQueue {
    pub fn new(sink: Arc<dyn ActionRepository>, flush_threshold: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (flush_tx, flush_rx) = mpsc::channel(FLUSH_BACKLOG);
        let failure: Failure = Arc::new(Mutex::new(None));

        tokio::spawn(buffer_loop(rx, flush_tx, flush_threshold));
        tokio::spawn(flush_loop(sink, flush_rx, Arc::clone(&failure)));

        Self { tx, failure }
    }

    pub async fn push(&self, event: ActionEvent) -> Result<(), SyncError> {
        self.check_failure()?;
        self.tx
            .send(Command::Push(event))
            .await
            .map_err(|_| SyncError::QueueClosed)
    }

    /// Flush everything buffered and wait for all in-flight flushes.
    pub async fn drain(&self) -> Result<DrainReport, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Drain(reply_tx))
            .await
            .map_err(|_| SyncError::QueueClosed)?;
        let report = reply_rx.await.map_err(|_| SyncError::QueueClosed)?;

        self.check_failure()?;
        Ok(report)
    }

    fn check_failure(&self) -> Result<(), SyncError> {
        let failure = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        match failure.as_ref() {
            Some(reason) => Err(SyncError::SinkWrite(reason.clone())),
            None => Ok(()),
        }
    }
}

async fn buffer_loop(
    mut rx: mpsc::Receiver<Command>,
    flush_tx: mpsc::Sender<FlushJob>,
    flush_threshold: usize,
) {
    let mut buffer: Vec<ActionEvent> = Vec::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Push(event) => {
                buffer.push(event);
                if buffer.len() > flush_threshold {
                    let snapshot = mem::take(&mut buffer);
                    if flush_tx.send(FlushJob::Batch(snapshot)).await.is_err() {
                        break;
                    }
                }
            }
            Command::Drain(reply) => {
                if !buffer.is_empty() {
                    let snapshot = mem::take(&mut buffer);
                    if flush_tx.send(FlushJob::Batch(snapshot)).await.is_err() {
                        break;
                    }
                }
                if flush_tx.send(FlushJob::Barrier(reply)).await.is_err() {
                    break;
                }
            }
        }
    }

    if !buffer.is_empty() {
        tracing::warn!(pending = buffer.len(), "batch queue closed without drain, flushing remainder");
        let _ = flush_tx.send(FlushJob::Batch(buffer)).await;
    }
}

async fn flush_loop(
    sink: Arc<dyn ActionRepository>,
    mut rx: mpsc::Receiver<FlushJob>,
    failure: Failure,
) {
    let mut report = DrainReport::default();

    while let Some(job) = rx.recv().await {
        match job {
            FlushJob::Batch(batch) => match sink.append_actions(&batch).await {
                Ok(written) => {
                    report.flushes += 1;
                    report.items += batch.len();
                    tracing::debug!(count = batch.len(), written, "flushed action batch");
                }
                Err(e) => {
                    tracing::error!(count = batch.len(), error = %e, "failed to flush action batch");
                    let mut slot = failure.lock().unwrap_or_else(|e| e.into_inner());
                    if slot.is_none() {
                        *slot = Some(e.to_string());
                    }
                }
            },
            FlushJob::Barrier(reply) => {
                let _ = reply.send(mem::take(&mut report));
            }
        }
    }
}
