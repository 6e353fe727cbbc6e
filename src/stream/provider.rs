use crate::engine::{Completeness, RetrievalEngine, WindowQuery};
use crate::pipeline::{Prefetcher, QueueGauge, QueueItem, StreamStats};
use crate::stream::span::{TimeBounds, TimeSpan};
use crate::stream::{StreamError, StreamPhase};
use crate::waveform::{query_codes, Batch, BatchClass, ChannelSelector, StationSelection};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

fn default_prefetch_batches() -> usize {
    10
}

/// Provider-level settings shared by every stream.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub channel_selector: ChannelSelector,
    /// Capacity of the prefetch queue
    pub prefetch_batches: usize,
    pub completeness: Completeness,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            channel_selector: ChannelSelector::default(),
            prefetch_batches: default_prefetch_batches(),
            completeness: Completeness::default(),
        }
    }
}

/// Windowing parameters of a single stream.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub window_increment: Duration,
    pub window_padding: Duration,
    /// Overrides the provider's configured start
    pub start_time: Option<DateTime<Utc>>,
    /// Overrides the provider's configured end
    pub end_time: Option<DateTime<Utc>>,
    /// Batches shorter than this are dropped
    pub min_length: Option<Duration>,
}

impl StreamRequest {
    pub fn new(window_increment: Duration, window_padding: Duration) -> Self {
        Self {
            window_increment,
            window_padding,
            start_time: None,
            end_time: None,
            min_length: None,
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_min_length(mut self, min_length: Duration) -> Self {
        self.min_length = Some(min_length);
        self
    }
}

fn to_chrono(duration: Duration, name: &str) -> Result<chrono::Duration, StreamError> {
    chrono::Duration::from_std(duration).map_err(|_| {
        StreamError::InvalidConfiguration(format!("{} out of range: {:?}", name, duration))
    })
}

/// Streams windowed waveform batches from a retrieval engine.
pub struct WaveformProvider {
    engine: Arc<dyn RetrievalEngine>,
    settings: ProviderSettings,
    stations: Option<Arc<dyn StationSelection>>,
}

impl WaveformProvider {
    pub fn new(engine: Arc<dyn RetrievalEngine>, settings: ProviderSettings) -> Self {
        Self {
            engine,
            settings,
            stations: None,
        }
    }

    /// Bind the stations whose channels will be queried.
    pub fn prepare<S>(&mut self, stations: S)
    where
        S: StationSelection + 'static,
    {
        info!(stations = stations.nsls().len(), "Preparing waveform provider");
        self.stations = Some(Arc::new(stations));
    }

    pub fn is_prepared(&self) -> bool {
        self.stations.is_some()
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Resolve the time span and start streaming batches.
    ///
    /// Fails before any I/O if no stations have been prepared.
    pub async fn iter_batches(&self, request: StreamRequest) -> Result<BatchStream, StreamError> {
        let stations = self.stations.as_ref().ok_or(StreamError::NotPrepared)?;
        let id = Uuid::new_v4();
        debug!(stream_id = %id, phase = ?StreamPhase::Init, "Starting waveform stream");

        let increment = to_chrono(request.window_increment, "window increment")?;
        let padding = to_chrono(request.window_padding, "window padding")?;
        let min_length = request
            .min_length
            .map(|min| to_chrono(min, "minimum batch length"))
            .transpose()?;
        if increment <= chrono::Duration::zero() {
            return Err(StreamError::InvalidConfiguration(
                "window increment must be positive".to_string(),
            ));
        }

        let span = TimeSpan::resolve(
            TimeBounds::new(request.start_time, request.end_time),
            TimeBounds::new(self.settings.start_time, self.settings.end_time),
            self.engine.as_ref(),
        )
        .await?;
        info!(
            stream_id = %id,
            start = %span.start,
            end = %span.end,
            duration = %span.duration(),
            "Searching time span"
        );
        debug!(stream_id = %id, phase = ?StreamPhase::SpanResolved, "Time span resolved");

        let codes = query_codes(stations.as_ref(), &self.settings.channel_selector);
        if codes.is_empty() {
            warn!(stream_id = %id, "No channel codes to query, stream will be empty");
        }

        let (tmin, tmax) = span
            .start
            .checked_add_signed(padding)
            .zip(span.end.checked_sub_signed(padding))
            .ok_or_else(|| {
                StreamError::InvalidConfiguration(format!(
                    "window padding {:?} leaves the representable time range",
                    request.window_padding
                ))
            })?;

        let query = WindowQuery {
            tmin,
            tmax,
            increment,
            padding,
            completeness: self.settings.completeness,
            codes,
        };
        let source = self
            .engine
            .stream_windows(query)
            .await
            .map_err(StreamError::Engine)?;

        let prefetcher = Prefetcher::spawn(source, self.settings.prefetch_batches);
        let stats = Arc::new(StreamStats::new(Arc::downgrade(prefetcher.gauge())));
        debug!(stream_id = %id, phase = ?StreamPhase::Streaming, "Prefetcher started");

        Ok(BatchStream {
            id,
            span,
            prefetcher,
            stats,
            min_length,
            phase: StreamPhase::Streaming,
            last_index: None,
            awaiting_ack: false,
        })
    }
}

/// Single-pass, pull-based stream of validated batches.
///
/// Dropping the stream cancels the background prefetcher.
pub struct BatchStream {
    id: Uuid,
    span: TimeSpan,
    prefetcher: Prefetcher,
    stats: Arc<StreamStats>,
    min_length: Option<chrono::Duration>,
    phase: StreamPhase,
    last_index: Option<u64>,
    /// The last yielded batch has not been acknowledged to the queue yet
    awaiting_ack: bool,
}

impl BatchStream {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn span(&self) -> TimeSpan {
        self.span
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    pub fn drain_handle(&self) -> DrainHandle {
        DrainHandle {
            gauge: Arc::clone(self.prefetcher.gauge()),
        }
    }

    /// Pull the next valid batch.
    ///
    /// Returns `Ok(None)` at the end of the stream, and on every call after
    /// the stream ended or failed.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>, StreamError> {
        if self.phase.is_terminal() {
            return Ok(None);
        }
        self.acknowledge_yielded();

        loop {
            let start = Instant::now();
            let item = match self.prefetcher.recv().await {
                Ok(item) => item,
                Err(e) => {
                    let e = StreamError::from(e);
                    error!(stream_id = %self.id, error = %e, "Waveform stream failed");
                    self.phase = StreamPhase::Failed;
                    return Err(e);
                }
            };

            let (raw, load_time) = match item {
                QueueItem::Batch { batch, load_time } => (batch, load_time),
                QueueItem::EndOfStream => {
                    self.prefetcher.task_done();
                    self.phase = StreamPhase::Done;
                    let stats = self.stats.snapshot();
                    info!(
                        stream_id = %self.id,
                        yielded = stats.yielded_batches,
                        empty = stats.empty_batches,
                        short = stats.short_batches,
                        "Waveform stream finished"
                    );
                    return Ok(None);
                }
            };

            let mut batch = Batch::from(raw);
            batch.clean();
            let class = batch.classify(self.min_length);
            self.stats
                .record_batch(start.elapsed(), load_time, batch.cumulative_bytes(), class);

            let i_batch = batch.i_batch();
            if let Some(last) = self.last_index {
                if i_batch <= last {
                    warn!(stream_id = %self.id, batch = i_batch, last, "Batch index out of order");
                }
            }
            self.last_index = Some(i_batch);

            match class {
                BatchClass::Empty => {
                    warn!(stream_id = %self.id, batch = i_batch, "Empty batch");
                    self.prefetcher.task_done();
                }
                BatchClass::Short => {
                    warn!(
                        stream_id = %self.id,
                        batch = i_batch,
                        duration = %batch.duration(),
                        "Duration of batch too short"
                    );
                    self.prefetcher.task_done();
                }
                BatchClass::Valid => {
                    debug!(
                        stream_id = %self.id,
                        batch = i_batch,
                        total = ?batch.n_batches(),
                        traces = batch.traces().len(),
                        "Yielding batch"
                    );
                    self.awaiting_ack = true;
                    return Ok(Some(batch));
                }
            }
        }
    }

    /// Adapt into a [`futures::Stream`]. The stream ends after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Batch, StreamError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next_batch().await {
                Ok(Some(batch)) => Some((Ok(batch), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }

    /// Stop streaming and wait for the prefetcher to exit.
    pub async fn close(mut self) {
        self.acknowledge_yielded();
        if !self.phase.is_terminal() {
            info!(stream_id = %self.id, "Closing waveform stream early");
        }
        self.prefetcher.shutdown().await;
    }

    fn acknowledge_yielded(&mut self) {
        if self.awaiting_ack {
            self.prefetcher.task_done();
            self.awaiting_ack = false;
        }
    }
}

/// Waits until a stream's queue has been fully drained and acknowledged.
#[derive(Debug, Clone)]
pub struct DrainHandle {
    gauge: Arc<QueueGauge>,
}

impl DrainHandle {
    pub async fn wait(&self) {
        self.gauge.join().await;
    }

    pub fn pending(&self) -> usize {
        self.gauge.unfinished()
    }
}
