pub mod channel;
pub mod prefetch;
pub mod stats;

pub use channel::{create_queue, QueueGauge, QueuePermit, QueueReceiver, QueueSender};
pub use prefetch::{PrefetchError, Prefetcher, QueueItem};
pub use stats::{bytes_per_second, format_bytes, StatsSnapshot, StreamStats};
