use crate::engine::{EngineError, RawBatch, RawBatchStream};
use crate::pipeline::channel::{create_queue, QueueGauge, QueueReceiver, QueueSender};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Ways the background producer can end without delivering the terminator.
#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("source failed: {0}")]
    Source(#[from] EngineError),

    #[error("prefetch task ended without end-of-stream marker: {0}")]
    Lost(String),
}

/// Entry in the prefetch queue.
#[derive(Debug)]
pub enum QueueItem {
    Batch {
        batch: RawBatch,
        /// Time the source took to produce this batch
        load_time: Duration,
    },
    EndOfStream,
}

/// Drains a batch source into a bounded queue from a background task.
///
/// The source is only polled for the next batch once the queue has room, so
/// at most `queue_size` batches wait for the consumer. The task is cancelled
/// when the prefetcher is dropped.
pub struct Prefetcher {
    queue: QueueReceiver<QueueItem>,
    load_time: Duration,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<u64, EngineError>>>,
}

impl Prefetcher {
    /// Start prefetching from `source`. Must be called within a tokio runtime.
    pub fn spawn(source: RawBatchStream, queue_size: usize) -> Self {
        let (tx, queue) = create_queue(queue_size);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(prefetch_worker(source, tx, cancel.clone()));

        Self {
            queue,
            load_time: Duration::ZERO,
            cancel,
            task: Some(task),
        }
    }

    /// Load time of the most recently dequeued batch.
    pub fn load_time(&self) -> Duration {
        self.load_time
    }

    pub fn gauge(&self) -> &Arc<QueueGauge> {
        self.queue.gauge()
    }

    /// Wait for the next queue entry.
    ///
    /// If the producer stopped without enqueuing [`QueueItem::EndOfStream`],
    /// the reason is collected from the task and returned as an error.
    pub async fn recv(&mut self) -> Result<QueueItem, PrefetchError> {
        match self.queue.recv().await {
            Some(item) => {
                if let QueueItem::Batch { load_time, .. } = &item {
                    self.load_time = *load_time;
                }
                Ok(item)
            }
            None => Err(self.collect_failure().await),
        }
    }

    /// Acknowledge the last received entry as processed.
    pub fn task_done(&self) {
        self.queue.task_done();
    }

    /// Cancel the producer and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(fetched)) => debug!(fetched, "Prefetch task stopped"),
                Ok(Err(e)) => debug!(error = %e, "Prefetch task had failed before shutdown"),
                Err(e) => debug!(error = %e, "Prefetch task did not exit cleanly"),
            }
        }
    }

    async fn collect_failure(&mut self) -> PrefetchError {
        let Some(task) = self.task.take() else {
            return PrefetchError::Lost("prefetch task already collected".to_string());
        };

        match task.await {
            Ok(Err(e)) => PrefetchError::Source(e),
            Ok(Ok(fetched)) => {
                PrefetchError::Lost(format!("prefetch task stopped after {} batches", fetched))
            }
            Err(e) => PrefetchError::Lost(e.to_string()),
        }
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn prefetch_worker(
    mut source: RawBatchStream,
    tx: QueueSender<QueueItem>,
    cancel: CancellationToken,
) -> Result<u64, EngineError> {
    info!(queue_size = tx.capacity(), "Start pre-fetching data");

    let mut fetched = 0u64;

    loop {
        // Hold a free slot before asking the source for the next batch
        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(fetched, "Prefetch cancelled while waiting for queue capacity");
                return Ok(fetched);
            }
            permit = tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(fetched, "Prefetch queue receiver dropped");
                    return Ok(fetched);
                }
            },
        };

        let start = Instant::now();
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(fetched, "Prefetch cancelled while waiting for source");
                return Ok(fetched);
            }
            next = source.next() => next,
        };

        match next {
            Some(Ok(batch)) => {
                let load_time = start.elapsed();
                fetched += 1;
                debug!(batch = batch.index, load_time = ?load_time, "Read waveform batch");
                permit.send(QueueItem::Batch { batch, load_time });
            }
            Some(Err(e)) => {
                error!(fetched, error = %e, "Waveform source failed");
                return Err(e);
            }
            None => {
                permit.send(QueueItem::EndOfStream);
                info!(fetched, "Waveform source exhausted");
                return Ok(fetched);
            }
        }
    }
}
