pub mod provider;
pub mod span;

use crate::engine::EngineError;
use crate::pipeline::PrefetchError;
use thiserror::Error;

pub use provider::{BatchStream, DrainHandle, ProviderSettings, StreamRequest, WaveformProvider};
pub use span::{TimeBounds, TimeSpan};

/// Fatal stream errors. Filtered batches are never reported here.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("no stations prepared, call prepare() before streaming")]
    NotPrepared,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("retrieval engine error: {0}")]
    Engine(EngineError),

    #[error("waveform source failed during prefetch: {0}")]
    SourceFailure(EngineError),

    #[error("prefetch producer lost: {0}")]
    ProducerLost(String),
}

impl From<PrefetchError> for StreamError {
    fn from(e: PrefetchError) -> Self {
        match e {
            PrefetchError::Source(e) => StreamError::SourceFailure(e),
            PrefetchError::Lost(reason) => StreamError::ProducerLost(reason),
        }
    }
}

/// Lifecycle of a stream. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Init,
    SpanResolved,
    Streaming,
    Done,
    Failed,
}

impl StreamPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamPhase::Done | StreamPhase::Failed)
    }
}
