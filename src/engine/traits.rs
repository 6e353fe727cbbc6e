use crate::waveform::{ChannelCode, Trace};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("no {0:?} content available")]
    NoContent(Vec<ContentKind>),

    #[error("invalid window query: {0}")]
    InvalidQuery(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),
}

/// Kinds of content a retrieval engine can index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Waveform,
    Response,
}

/// Whether windows only receive traces that cover them completely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    /// Traces that do not span the whole padded window are left out
    #[default]
    Complete,
    /// Partial traces at the window edges are kept
    Incomplete,
}

/// Parameters for chopping a time range into windows.
#[derive(Debug, Clone)]
pub struct WindowQuery {
    pub tmin: DateTime<Utc>,
    pub tmax: DateTime<Utc>,
    /// Step between successive window starts
    pub increment: chrono::Duration,
    /// Extra time fetched on both sides of each window
    pub padding: chrono::Duration,
    pub completeness: Completeness,
    pub codes: Vec<ChannelCode>,
}

/// One window as produced by a retrieval engine.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub traces: Vec<Trace>,
    pub tmin: DateTime<Utc>,
    pub tmax: DateTime<Utc>,
    pub index: u64,
    /// Expected number of windows, if the engine knows it
    pub total: Option<u64>,
}

pub type RawBatchStream = BoxStream<'static, Result<RawBatch, EngineError>>;

/// Index and retrieval backend producing windowed trace batches.
///
/// Polling the returned stream may block for arbitrary wall-clock time.
#[async_trait]
pub trait RetrievalEngine: Send + Sync {
    /// Earliest start and latest end over the given content kinds.
    async fn get_time_span(
        &self,
        kinds: &[ContentKind],
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), EngineError>;

    /// Start streaming windows for the query, in window order.
    async fn stream_windows(&self, query: WindowQuery) -> Result<RawBatchStream, EngineError>;
}
