//! Live counters for a batch stream.

use crate::pipeline::channel::QueueGauge;
use crate::waveform::BatchClass;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// Load times below this are treated as unmeasurable.
const MIN_LOAD_TIME: Duration = Duration::from_micros(1);

#[derive(Debug, Default)]
struct Counters {
    empty_batches: u64,
    short_batches: u64,
    yielded_batches: u64,
    total_bytes: u64,
    time_per_batch: Duration,
    load_time: Duration,
    bytes_per_second: f64,
}

/// Statistics of one stream.
///
/// Holds a non-owning view of the prefetch queue for occupancy reporting.
/// Once the stream is gone the queue reads as `0 / 0`.
#[derive(Debug)]
pub struct StreamStats {
    queue: Weak<QueueGauge>,
    counters: Mutex<Counters>,
}

impl StreamStats {
    pub fn new(queue: Weak<QueueGauge>) -> Self {
        Self {
            queue,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Snapshot of queued items and queue capacity.
    pub fn queue_occupancy(&self) -> (usize, usize) {
        self.queue
            .upgrade()
            .map(|gauge| gauge.occupancy())
            .unwrap_or((0, 0))
    }

    /// Record one dequeued batch.
    ///
    /// `latency` is the consumer-side time spent on the batch, `load_time`
    /// the source time measured by the prefetcher.
    pub fn record_batch(&self, latency: Duration, load_time: Duration, bytes: u64, class: BatchClass) {
        let mut counters = self.counters();
        counters.time_per_batch = latency;
        counters.load_time = load_time;
        counters.bytes_per_second = bytes_per_second(bytes, load_time);
        counters.total_bytes += bytes;

        match class {
            BatchClass::Empty => counters.empty_batches += 1,
            BatchClass::Short => counters.short_batches += 1,
            BatchClass::Valid => counters.yielded_batches += 1,
        }
    }

    pub fn empty_batches(&self) -> u64 {
        self.counters().empty_batches
    }

    pub fn short_batches(&self) -> u64 {
        self.counters().short_batches
    }

    pub fn bytes_per_second(&self) -> f64 {
        self.counters().bytes_per_second
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let (queue_size, queue_size_max) = self.queue_occupancy();
        let counters = self.counters();

        StatsSnapshot {
            queue_size,
            queue_size_max,
            empty_batches: counters.empty_batches,
            short_batches: counters.short_batches,
            yielded_batches: counters.yielded_batches,
            total_bytes: counters.total_bytes,
            time_per_batch: counters.time_per_batch,
            load_time: counters.load_time,
            bytes_per_second: counters.bytes_per_second,
        }
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Byte rate over a load time, zero when the load time is too small to
/// measure.
pub fn bytes_per_second(bytes: u64, load_time: Duration) -> f64 {
    if load_time < MIN_LOAD_TIME {
        return 0.0;
    }
    bytes as f64 / load_time.as_secs_f64()
}

/// Point-in-time copy of [`StreamStats`] for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub queue_size: usize,
    pub queue_size_max: usize,
    pub empty_batches: u64,
    pub short_batches: u64,
    pub yielded_batches: u64,
    pub total_bytes: u64,
    #[serde(with = "humantime_serde")]
    pub time_per_batch: Duration,
    #[serde(with = "humantime_serde")]
    pub load_time: Duration,
    pub bytes_per_second: f64,
}

impl StatsSnapshot {
    /// The consumer is outpacing the source.
    pub fn is_starved(&self) -> bool {
        self.queue_size_max > 0 && self.queue_size <= 1
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Queue              {} / {}", self.queue_size, self.queue_size_max)?;
        writeln!(f, "Waveform loading   {}/s", format_bytes(self.bytes_per_second))?;
        writeln!(f, "Batches yielded    {}", self.yielded_batches)?;
        writeln!(f, "Empty batches      {}", self.empty_batches)?;
        writeln!(f, "Short batches      {}", self.short_batches)?;
        write!(f, "Bytes loaded       {}", format_bytes(self.total_bytes as f64))
    }
}

/// Render a byte count with a binary unit, e.g. `1.5 MiB`.
pub fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    if !bytes.is_finite() || bytes <= 0.0 {
        return "0 B".to_string();
    }

    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{:.0} {}", value, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::create_queue;
    use std::sync::Arc;

    #[test]
    fn test_bytes_per_second() {
        let rate = bytes_per_second(1_000_000, Duration::from_millis(250));
        assert!((rate - 4_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_bytes_per_second_zero_load_time() {
        assert_eq!(bytes_per_second(1_000_000, Duration::ZERO), 0.0);
        assert_eq!(bytes_per_second(1_000_000, Duration::from_nanos(10)), 0.0);
    }

    #[test]
    fn test_record_batch_counts_filtered() {
        let stats = StreamStats::new(Weak::new());

        stats.record_batch(Duration::from_millis(1), Duration::from_secs(1), 0, BatchClass::Empty);
        stats.record_batch(Duration::from_millis(1), Duration::from_secs(1), 100, BatchClass::Short);
        stats.record_batch(Duration::from_millis(1), Duration::from_secs(2), 800, BatchClass::Valid);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.empty_batches, 1);
        assert_eq!(snapshot.short_batches, 1);
        assert_eq!(snapshot.yielded_batches, 1);
        assert_eq!(snapshot.total_bytes, 900);
        assert!((snapshot.bytes_per_second - 400.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_queue_occupancy_through_weak_view() {
        let (tx, rx) = create_queue::<u32>(4);
        let stats = StreamStats::new(Arc::downgrade(rx.gauge()));

        tx.send(1).await.unwrap();
        assert_eq!(stats.queue_occupancy(), (1, 4));
        assert!(stats.snapshot().is_starved());

        tx.send(2).await.unwrap();
        assert!(!stats.snapshot().is_starved());

        drop(tx);
        drop(rx);
        assert_eq!(stats.queue_occupancy(), (0, 0));
        assert!(!stats.snapshot().is_starved());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0.0), "0 B");
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(1536.0), "1.5 KiB");
        assert_eq!(format_bytes(3.0 * 1024.0 * 1024.0), "3.0 MiB");
        assert_eq!(format_bytes(f64::NAN), "0 B");
    }
}
