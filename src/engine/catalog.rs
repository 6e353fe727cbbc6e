use super::traits::{
    Completeness, ContentKind, EngineError, RawBatch, RawBatchStream, RetrievalEngine, WindowQuery,
};
use crate::waveform::Trace;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// In-memory catalog of trace extents loaded from YAML files.
///
/// Each catalog file holds a list of trace records. Windows are cut from the
/// catalog on demand; no sample data is read.
#[derive(Debug, Clone, Default)]
pub struct CatalogEngine {
    traces: Arc<Vec<Trace>>,
}

impl CatalogEngine {
    pub fn new(traces: Vec<Trace>) -> Self {
        Self {
            traces: Arc::new(traces),
        }
    }

    /// Load and merge all catalog files.
    pub fn load(paths: &[PathBuf]) -> Result<Self, EngineError> {
        let mut traces = Vec::new();
        for path in paths {
            let mut loaded = load_catalog_file(path)?;
            debug!(path = %path.display(), traces = loaded.len(), "Loaded catalog file");
            traces.append(&mut loaded);
        }

        traces.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        info!(traces = traces.len(), files = paths.len(), "Catalog loaded");

        Ok(Self::new(traces))
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

fn load_catalog_file(path: &Path) -> Result<Vec<Trace>, EngineError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        EngineError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read catalog '{}': {}", path.display(), e),
        ))
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

#[async_trait]
impl RetrievalEngine for CatalogEngine {
    async fn get_time_span(
        &self,
        kinds: &[ContentKind],
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), EngineError> {
        if !kinds.contains(&ContentKind::Waveform) {
            return Err(EngineError::NoContent(kinds.to_vec()));
        }

        let tmin = self.traces.iter().map(|tr| tr.start_time).min();
        let tmax = self.traces.iter().map(|tr| tr.end_time).max();
        match (tmin, tmax) {
            (Some(tmin), Some(tmax)) => Ok((tmin, tmax)),
            _ => Err(EngineError::NoContent(kinds.to_vec())),
        }
    }

    async fn stream_windows(&self, query: WindowQuery) -> Result<RawBatchStream, EngineError> {
        if query.increment <= chrono::Duration::zero() {
            return Err(EngineError::InvalidQuery(format!(
                "window increment must be positive, got {}",
                query.increment
            )));
        }
        if query.padding < chrono::Duration::zero() {
            return Err(EngineError::InvalidQuery(format!(
                "window padding must not be negative, got {}",
                query.padding
            )));
        }

        if query.tmin.checked_sub_signed(query.padding).is_none()
            || query.tmax.checked_add_signed(query.padding).is_none()
        {
            return Err(EngineError::InvalidQuery(format!(
                "window padding {} leaves the representable time range",
                query.padding
            )));
        }

        let n_windows = window_count(query.tmin, query.tmax, query.increment);
        debug!(
            tmin = %query.tmin,
            tmax = %query.tmax,
            windows = n_windows,
            codes = query.codes.len(),
            "Chopping catalog into windows"
        );

        let traces = Arc::clone(&self.traces);
        let stream = futures::stream::unfold(0u64, move |i_window| {
            let traces = Arc::clone(&traces);
            let query = query.clone();
            async move {
                if i_window >= n_windows {
                    return None;
                }
                match cut_window(&traces, &query, i_window, n_windows) {
                    Ok(batch) => Some((Ok(batch), i_window + 1)),
                    Err(e) => Some((Err(e), n_windows)),
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

const NANOS_PER_SEC: i128 = 1_000_000_000;

fn total_nanos(duration: chrono::Duration) -> i128 {
    i128::from(duration.num_seconds()) * NANOS_PER_SEC + i128::from(duration.subsec_nanos())
}

fn duration_from_nanos(nanos: i128) -> Option<chrono::Duration> {
    let secs = i64::try_from(nanos.div_euclid(NANOS_PER_SEC)).ok()?;
    let subsec = nanos.rem_euclid(NANOS_PER_SEC) as i64;
    chrono::Duration::try_seconds(secs)?.checked_add(&chrono::Duration::nanoseconds(subsec))
}

/// Number of increments needed to cover `[tmin, tmax]`; zero for an empty
/// or inverted range. Saturates at `u64::MAX`.
pub fn window_count(tmin: DateTime<Utc>, tmax: DateTime<Utc>, increment: chrono::Duration) -> u64 {
    let span = total_nanos(tmax - tmin);
    let step = total_nanos(increment);
    if span <= 0 || step <= 0 {
        return 0;
    }
    u64::try_from((span + step - 1) / step).unwrap_or(u64::MAX)
}

/// Start of window `i_window`, or None if it is not representable.
pub fn window_start(
    tmin: DateTime<Utc>,
    increment: chrono::Duration,
    i_window: u64,
) -> Option<DateTime<Utc>> {
    let offset = total_nanos(increment).checked_mul(i128::from(i_window))?;
    tmin.checked_add_signed(duration_from_nanos(offset)?)
}

fn cut_window(
    traces: &[Trace],
    query: &WindowQuery,
    i_window: u64,
    n_windows: u64,
) -> Result<RawBatch, EngineError> {
    let wmin = window_start(query.tmin, query.increment, i_window).ok_or_else(|| {
        EngineError::InvalidQuery(format!("start of window {} is out of range", i_window))
    })?;
    let wmax = wmin
        .checked_add_signed(query.increment)
        .map_or(query.tmax, |end| end.min(query.tmax));

    // Padding was checked against the query bounds, windows lie within them
    let padded_min = wmin.checked_sub_signed(query.padding).unwrap_or(wmin);
    let padded_max = wmax.checked_add_signed(query.padding).unwrap_or(wmax);

    let selected = traces
        .iter()
        .filter(|tr| query.codes.iter().any(|code| code.matches(&tr.nsl, &tr.channel)))
        .filter(|tr| match query.completeness {
            Completeness::Complete => tr.covers(padded_min, padded_max),
            Completeness::Incomplete => true,
        })
        .filter_map(|tr| tr.clip(padded_min, padded_max))
        .collect();

    Ok(RawBatch {
        traces: selected,
        tmin: wmin,
        tmax: wmax,
        index: i_window,
        total: Some(n_windows),
    })
}
