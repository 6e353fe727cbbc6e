use crate::engine::RawBatch;
use crate::waveform::trace::Trace;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of checking a cleaned batch against the filtering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchClass {
    /// No traces left after cleaning
    Empty,
    /// Window shorter than the requested minimum length
    Short,
    Valid,
}

/// A time window of traces as handed to the consumer.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    traces: Vec<Trace>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    /// Position in the stream, starting at 0
    i_batch: u64,
    /// Number of batches the source expects to produce
    n_batches: Option<u64>,
}

impl Batch {
    pub fn new(
        traces: Vec<Trace>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        i_batch: u64,
        n_batches: Option<u64>,
    ) -> Self {
        Self {
            traces,
            start_time,
            end_time,
            i_batch,
            n_batches,
        }
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn into_traces(self) -> Vec<Trace> {
        self.traces
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn i_batch(&self) -> u64 {
        self.i_batch
    }

    pub fn n_batches(&self) -> Option<u64> {
        self.n_batches
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    pub fn cumulative_bytes(&self) -> u64 {
        self.traces.iter().map(|tr| tr.bytes).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Drop traces that carry no usable data. Running it twice changes nothing.
    pub fn clean(&mut self) {
        self.traces.retain(Trace::is_valid);
    }

    /// Classify a cleaned batch. A duration exactly equal to `min_length`
    /// is accepted.
    pub fn classify(&self, min_length: Option<chrono::Duration>) -> BatchClass {
        if self.is_empty() {
            return BatchClass::Empty;
        }
        match min_length {
            Some(min) if self.duration() < min => BatchClass::Short,
            _ => BatchClass::Valid,
        }
    }
}

impl From<RawBatch> for Batch {
    fn from(raw: RawBatch) -> Self {
        Batch::new(raw.traces, raw.tmin, raw.tmax, raw.index, raw.total)
    }
}
