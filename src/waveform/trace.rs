use crate::waveform::nsl::Nsl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One continuous recording of a single channel.
///
/// Sample data is owned by the retrieval engine; a trace here carries only
/// the extent and size of its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub nsl: Nsl,
    pub channel: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Samples per second
    pub sampling_rate: f64,
    pub n_samples: u64,
    /// Size of the sample payload in bytes
    pub bytes: u64,
}

impl Trace {
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    /// A trace without samples or with an inverted extent carries no data.
    pub fn is_valid(&self) -> bool {
        self.n_samples > 0 && self.bytes > 0 && self.start_time <= self.end_time
    }

    pub fn covers(&self, tmin: DateTime<Utc>, tmax: DateTime<Utc>) -> bool {
        self.start_time <= tmin && self.end_time >= tmax
    }

    pub fn overlaps(&self, tmin: DateTime<Utc>, tmax: DateTime<Utc>) -> bool {
        self.start_time < tmax && self.end_time > tmin
    }

    /// Cut the trace down to `[tmin, tmax]`, scaling sample count and byte
    /// size with the retained fraction. Returns None if nothing overlaps.
    pub fn clip(&self, tmin: DateTime<Utc>, tmax: DateTime<Utc>) -> Option<Trace> {
        if !self.overlaps(tmin, tmax) {
            return None;
        }

        let start_time = self.start_time.max(tmin);
        let end_time = self.end_time.min(tmax);

        let total = self.duration().num_microseconds().unwrap_or(i64::MAX);
        let kept = (end_time - start_time).num_microseconds().unwrap_or(i64::MAX);
        let fraction = if total > 0 {
            kept as f64 / total as f64
        } else {
            1.0
        };

        Some(Trace {
            nsl: self.nsl.clone(),
            channel: self.channel.clone(),
            start_time,
            end_time,
            sampling_rate: self.sampling_rate,
            n_samples: (self.n_samples as f64 * fraction).round() as u64,
            bytes: (self.bytes as f64 * fraction).round() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_trace(start_secs: i64, end_secs: i64) -> Trace {
        let base = Utc.with_ymd_and_hms(2026, 1, 28, 10, 0, 0).unwrap();
        Trace {
            nsl: Nsl::new("6E", "TE01", "").unwrap(),
            channel: "HHZ".to_string(),
            start_time: base + chrono::Duration::seconds(start_secs),
            end_time: base + chrono::Duration::seconds(end_secs),
            sampling_rate: 100.0,
            n_samples: ((end_secs - start_secs) * 100) as u64,
            bytes: ((end_secs - start_secs) * 400) as u64,
        }
    }

    #[test]
    fn test_clip_scales_size() {
        let trace = make_trace(0, 100);
        let clipped = trace
            .clip(
                trace.start_time + chrono::Duration::seconds(25),
                trace.start_time + chrono::Duration::seconds(75),
            )
            .unwrap();

        assert_eq!(clipped.duration(), chrono::Duration::seconds(50));
        assert_eq!(clipped.n_samples, 5000);
        assert_eq!(clipped.bytes, 20000);
    }

    #[test]
    fn test_clip_outside_returns_none() {
        let trace = make_trace(0, 10);
        assert!(trace
            .clip(trace.end_time, trace.end_time + chrono::Duration::seconds(5))
            .is_none());
    }

    #[test]
    fn test_validity() {
        let mut trace = make_trace(0, 10);
        assert!(trace.is_valid());

        trace.n_samples = 0;
        assert!(!trace.is_valid());

        let mut inverted = make_trace(0, 10);
        std::mem::swap(&mut inverted.start_time, &mut inverted.end_time);
        assert!(!inverted.is_valid());
    }
}
