//! Multivariate feature extraction over a batch of observations.
//!
//! Each distinct time bucket becomes one row: volume, bad-status rate, and
//! their deviations from trailing rolling means. The rows feed the outlier
//! model; the per-observation scoring path does not use them.

use std::collections::{BTreeMap, HashMap};

use crate::model::Observation;

/// Trailing window (in buckets) for the rolling means.
pub const ROLLING_WINDOW: usize = 60;

/// One feature row per distinct time bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub time: String,
    pub total_count: f64,
    pub bad_count: f64,
    pub bad_rate: f64,
    pub rolling_total_mean: f64,
    pub rolling_bad_rate_mean: f64,
    pub delta_total: f64,
    pub delta_bad_rate: f64,
}

impl FeatureRow {
    /// Numeric columns in model input order.
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.total_count,
            self.bad_count,
            self.bad_rate,
            self.delta_total,
            self.delta_bad_rate,
        ]
    }
}

/// Ordered feature table, indexed by time bucket for later lookup.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
    index: HashMap<String, usize>,
}

impl FeatureTable {
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row position for a time bucket, if the batch contained it.
    pub fn position(&self, bucket: &str) -> Option<usize> {
        self.index.get(bucket).copied()
    }

    pub fn get(&self, bucket: &str) -> Option<&FeatureRow> {
        self.position(bucket).map(|i| &self.rows[i])
    }

    /// Model input matrix, one vector per row.
    pub fn to_matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(FeatureRow::to_vector).collect()
    }
}

/// Pivot a batch into per-bucket features with trailing rolling means.
///
/// Buckets are ordered lexically, which matches chronological order for the
/// fixed-width `"HHh MM"` labels within a single day. The rolling window
/// shrinks near the start of the sequence; there is no look-ahead.
pub fn extract_features(batch: &[Observation]) -> FeatureTable {
    // BTreeMap keys give the lexical bucket ordering for free.
    let mut pivot: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for obs in batch {
        let cell = pivot.entry(obs.time.as_str()).or_insert((0.0, 0.0));
        cell.0 += obs.count as f64;
        if obs.status.is_bad() {
            cell.1 += obs.count as f64;
        }
    }

    let mut rows = Vec::with_capacity(pivot.len());
    let mut index = HashMap::with_capacity(pivot.len());
    let mut totals = Vec::with_capacity(pivot.len());
    let mut bad_rates = Vec::with_capacity(pivot.len());

    for (bucket, (total_count, bad_count)) in pivot {
        // Empty buckets would divide by zero; treat them as rate 0.
        let denom = if total_count > 0.0 { total_count } else { 1.0 };
        let bad_rate = bad_count / denom;

        totals.push(total_count);
        bad_rates.push(bad_rate);
        let i = rows.len();
        let rolling_total_mean = trailing_mean(&totals, i);
        let rolling_bad_rate_mean = trailing_mean(&bad_rates, i);

        index.insert(bucket.to_string(), i);
        rows.push(FeatureRow {
            time: bucket.to_string(),
            total_count,
            bad_count,
            bad_rate,
            rolling_total_mean,
            rolling_bad_rate_mean,
            delta_total: total_count - rolling_total_mean,
            delta_bad_rate: bad_rate - rolling_bad_rate_mean,
        });
    }

    FeatureTable { rows, index }
}

/// Mean of the trailing window ending at position `i` (inclusive).
fn trailing_mean(values: &[f64], i: usize) -> f64 {
    let start = (i + 1).saturating_sub(ROLLING_WINDOW);
    let window = &values[start..=i];
    window.iter().sum::<f64>() / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionStatus;

    fn obs(time: &str, status: TransactionStatus, count: u64) -> Observation {
        Observation {
            time: time.to_string(),
            status,
            count,
        }
    }

    #[test]
    fn test_pivot_sums_and_bad_rate() {
        let batch = vec![
            obs("00h 00", TransactionStatus::Approved, 80),
            obs("00h 00", TransactionStatus::Failed, 15),
            obs("00h 00", TransactionStatus::Failed, 5),
            obs("00h 01", TransactionStatus::Approved, 50),
        ];
        let table = extract_features(&batch);
        assert_eq!(table.len(), 2);

        let row = table.get("00h 00").unwrap();
        assert_eq!(row.total_count, 100.0);
        assert_eq!(row.bad_count, 20.0);
        assert_eq!(row.bad_rate, 0.2);

        let row = table.get("00h 01").unwrap();
        assert_eq!(row.bad_count, 0.0);
        assert_eq!(row.bad_rate, 0.0);
    }

    #[test]
    fn test_zero_count_bucket_has_zero_rate() {
        let batch = vec![obs("12h 00", TransactionStatus::Failed, 0)];
        let table = extract_features(&batch);
        let row = table.get("12h 00").unwrap();
        assert_eq!(row.total_count, 0.0);
        assert_eq!(row.bad_rate, 0.0);
    }

    #[test]
    fn test_rows_sorted_by_bucket() {
        let batch = vec![
            obs("00h 10", TransactionStatus::Approved, 1),
            obs("00h 02", TransactionStatus::Approved, 2),
            obs("00h 05", TransactionStatus::Approved, 3),
        ];
        let table = extract_features(&batch);
        let order: Vec<_> = table.rows().iter().map(|r| r.time.as_str()).collect();
        assert_eq!(order, ["00h 02", "00h 05", "00h 10"]);
        assert_eq!(table.position("00h 05"), Some(1));
        assert_eq!(table.position("00h 59"), None);
    }

    #[test]
    fn test_rolling_mean_and_delta() {
        let batch = vec![
            obs("00h 00", TransactionStatus::Approved, 10),
            obs("00h 01", TransactionStatus::Approved, 20),
            obs("00h 02", TransactionStatus::Approved, 30),
        ];
        let table = extract_features(&batch);
        let rows = table.rows();

        // Window shrinks at the start: first row's mean is itself.
        assert_eq!(rows[0].rolling_total_mean, 10.0);
        assert_eq!(rows[0].delta_total, 0.0);
        assert_eq!(rows[1].rolling_total_mean, 15.0);
        assert_eq!(rows[2].rolling_total_mean, 20.0);
        assert_eq!(rows[2].delta_total, 10.0);
    }

    #[test]
    fn test_trailing_window_caps_at_sixty() {
        let values: Vec<f64> = (0..120).map(|i| i as f64).collect();
        // Window over positions 60..=119: mean of 60..120 is 89.5.
        assert_eq!(trailing_mean(&values, 119), 89.5);
    }
}
