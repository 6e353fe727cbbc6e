use crate::engine::{ContentKind, RetrievalEngine};
use crate::stream::StreamError;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Optional start and end instants from one configuration layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeBounds {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeBounds {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Fill bounds missing here from `fallback`.
    pub fn or(self, fallback: TimeBounds) -> TimeBounds {
        TimeBounds {
            start: self.start.or(fallback.start),
            end: self.end.or(fallback.end),
        }
    }
}

/// Resolved time range of a stream; `start` is strictly before `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Resolve the span: explicit bounds win over configured ones, and the
    /// engine's waveform extent is only queried for bounds still missing.
    pub async fn resolve(
        explicit: TimeBounds,
        configured: TimeBounds,
        engine: &dyn RetrievalEngine,
    ) -> Result<TimeSpan, StreamError> {
        let bounds = explicit.or(configured);

        let (start, end) = match (bounds.start, bounds.end) {
            (Some(start), Some(end)) => (start, end),
            (start, end) => {
                let (engine_start, engine_end) = engine
                    .get_time_span(&[ContentKind::Waveform])
                    .await
                    .map_err(StreamError::Engine)?;
                debug!(%engine_start, %engine_end, "Queried available waveform extent");
                (start.unwrap_or(engine_start), end.unwrap_or(engine_end))
            }
        };

        if start >= end {
            return Err(StreamError::InvalidConfiguration(format!(
                "start time {} must be before end time {}",
                start, end
            )));
        }

        Ok(TimeSpan { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, RawBatch, RawBatchStream, WindowQuery};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ExtentEngine {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        queries: AtomicUsize,
    }

    #[async_trait]
    impl RetrievalEngine for ExtentEngine {
        async fn get_time_span(
            &self,
            _kinds: &[ContentKind],
        ) -> Result<(DateTime<Utc>, DateTime<Utc>), EngineError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok((self.start, self.end))
        }

        async fn stream_windows(&self, _query: WindowQuery) -> Result<RawBatchStream, EngineError> {
            Ok(Box::pin(futures::stream::empty::<Result<RawBatch, EngineError>>()))
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 28, hour, 0, 0).unwrap()
    }

    fn engine() -> ExtentEngine {
        ExtentEngine {
            start: at(0),
            end: at(23),
            queries: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_explicit_overrides_configured() {
        let engine = engine();
        let span = TimeSpan::resolve(
            TimeBounds::new(Some(at(5)), None),
            TimeBounds::new(Some(at(2)), Some(at(10))),
            &engine,
        )
        .await
        .unwrap();

        assert_eq!(span.start, at(5));
        assert_eq!(span.end, at(10));
        assert_eq!(engine.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_engine_fills_missing_bound() {
        let engine = engine();
        let span = TimeSpan::resolve(
            TimeBounds::default(),
            TimeBounds::new(Some(at(2)), None),
            &engine,
        )
        .await
        .unwrap();

        assert_eq!(span.start, at(2));
        assert_eq!(span.end, at(23));
        assert_eq!(span.duration(), chrono::Duration::hours(21));
        assert_eq!(engine.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_engine_extent_used_without_bounds() {
        let engine = engine();
        let span = TimeSpan::resolve(TimeBounds::default(), TimeBounds::default(), &engine)
            .await
            .unwrap();
        assert_eq!(span, TimeSpan { start: at(0), end: at(23) });
    }

    #[tokio::test]
    async fn test_inverted_span_is_invalid() {
        let engine = engine();
        let result = TimeSpan::resolve(
            TimeBounds::new(Some(at(10)), Some(at(10))),
            TimeBounds::default(),
            &engine,
        )
        .await;
        assert!(matches!(result, Err(StreamError::InvalidConfiguration(_))));
    }
}
