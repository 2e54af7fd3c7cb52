//! Per-(hour, status) baseline statistics learned from historical counts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detect::{parse_bucket_hour, DetectError};
use crate::model::{Observation, TransactionStatus};

/// Learned count distribution for one (hour, status) pair.
///
/// `mad` is the literal median of the counts, not the median of absolute
/// deviations. The alert thresholds were tuned against this definition,
/// so it is kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub hour: u8,
    pub status: TransactionStatus,
    pub mean: f64,
    pub std: f64,
    pub mad: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Baseline lookup keyed by (hour, status).
///
/// Replaced wholesale on every rebuild; a missing key means "no baseline
/// available" and disables scoring for that observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaselineStore {
    entries: HashMap<(u8, TransactionStatus), BaselineEntry>,
}

impl BaselineStore {
    pub fn from_entries(entries: impl IntoIterator<Item = BaselineEntry>) -> Self {
        let mut store = Self::default();
        for entry in entries {
            store.entries.insert((entry.hour, entry.status), entry);
        }
        store
    }

    pub fn get(&self, hour: u8, status: TransactionStatus) -> Option<&BaselineEntry> {
        self.entries.get(&(hour, status))
    }

    pub fn entries(&self) -> impl Iterator<Item = &BaselineEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a fresh baseline store from a batch of historical observations.
///
/// Fails on the first malformed time bucket; the batch is rejected whole.
/// (Hour, status) pairs with no data are simply absent, never zero-filled.
pub fn build_baseline(history: &[Observation]) -> Result<BaselineStore, DetectError> {
    let mut grouped: HashMap<(u8, TransactionStatus), Vec<f64>> = HashMap::new();
    for obs in history {
        let hour = parse_bucket_hour(&obs.time)?;
        grouped
            .entry((hour, obs.status))
            .or_default()
            .push(obs.count as f64);
    }

    let mut entries = Vec::with_capacity(grouped.len());
    for ((hour, status), mut counts) in grouped {
        counts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        entries.push(BaselineEntry {
            hour,
            status,
            mean: mean(&counts),
            std: sample_std(&counts),
            mad: median(&counts),
            p95: percentile(&counts, 0.95),
            p99: percentile(&counts, 0.99),
        });
    }

    Ok(BaselineStore::from_entries(entries))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n-1 denominator). Defaults to 1.0 when the
/// sample is degenerate, so a single historical point never divides by zero
/// downstream.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 1.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    let std = var.sqrt();
    if std.is_nan() {
        1.0
    } else {
        std
    }
}

/// Median of a sorted slice.
fn median(sorted: &[f64]) -> f64 {
    percentile(sorted, 0.5)
}

/// Linearly interpolated percentile of a sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
