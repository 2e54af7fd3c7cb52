//! Detection engine: owns the baseline store and outlier model, exposes
//! the two public operations (`update_baseline`, `detect_anomalies`).

use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::detect::baseline::{build_baseline, BaselineEntry, BaselineStore};
use crate::detect::features::extract_features;
use crate::detect::forest::{ForestParams, IsolationForest};
use crate::detect::scoring::{robust_z, score, ScoreOutcome};
use crate::detect::{parse_bucket_hour, DetectError};
use crate::model::{AlertLevel, AnomalyRecord, Observation};

const Z_CRITICAL: f64 = 3.0;
const Z_WARNING: f64 = 2.0;

/// One coherent (baseline, model) pair produced by a single rebuild.
struct Snapshot {
    baseline: BaselineStore,
    forest: IsolationForest,
}

/// Engine instance for one monitoring scope.
///
/// `update_baseline` swaps in a fresh snapshot; concurrent
/// `detect_anomalies` calls keep reading the snapshot they loaded, so a
/// rebuild never mutates state under a reader.
pub struct DetectionEngine {
    params: ForestParams,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl DetectionEngine {
    pub fn new(params: ForestParams) -> Self {
        let empty = Snapshot {
            baseline: BaselineStore::default(),
            forest: IsolationForest::new(params.clone()),
        };
        Self {
            params,
            snapshot: RwLock::new(Arc::new(empty)),
        }
    }

    /// Rebuild the baseline store and refit the outlier model from a batch
    /// of historical observations. Deterministic for a fixed forest seed.
    pub fn update_baseline(&self, history: &[Observation]) -> Result<(), DetectError> {
        let baseline = build_baseline(history)?;
        let features = extract_features(history);
        let mut forest = IsolationForest::new(self.params.clone());
        forest.fit(&features.to_matrix());

        info!(
            entries = baseline.len(),
            feature_rows = features.len(),
            trained = forest.is_trained(),
            "baseline rebuilt"
        );

        *self.snapshot.write().unwrap() = Arc::new(Snapshot { baseline, forest });
        Ok(())
    }

    /// Whether the outlier model has been fit. When false, detection runs
    /// in score-only mode.
    pub fn is_trained(&self) -> bool {
        self.current().forest.is_trained()
    }

    /// Current baseline entries, for persistence and inspection.
    pub fn baseline_entries(&self) -> Vec<BaselineEntry> {
        self.current().baseline.entries().cloned().collect()
    }

    /// Classify a batch of observations against the current snapshot.
    ///
    /// Only BAD statuses can alert. With a trained model the percentile,
    /// deviation, and outlier-verdict conditions are AND-combined; without
    /// one the engine degrades to score-only warnings at |z| > 3.
    pub fn detect_anomalies(&self, batch: &[Observation]) -> Result<Vec<AnomalyRecord>, DetectError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        // Validate every bucket up front: one malformed label rejects the
        // whole batch, even on statuses that could never alert.
        for obs in batch {
            parse_bucket_hour(&obs.time)?;
        }
        let snap = self.current();

        if !snap.forest.is_trained() {
            debug!("outlier model untrained, falling back to score-only detection");
            return score_only(&snap.baseline, batch);
        }

        let features = extract_features(batch);
        let verdicts = snap.forest.predict(&features.to_matrix())?;

        let mut records = Vec::new();
        for obs in batch {
            if !obs.status.is_bad() {
                continue;
            }
            let hour = parse_bucket_hour(&obs.time)?;
            let Some(entry) = snap.baseline.get(hour, obs.status) else {
                continue;
            };
            let Some(pos) = features.position(&obs.time) else {
                debug!(bucket = %obs.time, "observation has no feature row, skipping");
                continue;
            };
            let (z, _) = robust_z(entry, obs.count);
            let is_outlier = verdicts[pos] == -1;
            if let Some((level, message)) = classify(entry, obs.count, z, is_outlier) {
                records.push(AnomalyRecord {
                    time: obs.time.clone(),
                    status: obs.status,
                    count: obs.count,
                    level,
                    score: z,
                    message,
                });
            }
        }

        info!(
            batch = batch.len(),
            anomalies = records.len(),
            "anomaly detection complete"
        );
        Ok(records)
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().unwrap().clone()
    }
}

/// Alert decision for one BAD observation. The CRITICAL check runs first,
/// so an observation satisfying both levels is reported once, as CRITICAL.
fn classify(
    entry: &BaselineEntry,
    count: u64,
    z: f64,
    is_outlier: bool,
) -> Option<(AlertLevel, String)> {
    if !is_outlier {
        return None;
    }
    let c = count as f64;
    if c > entry.p99 && z.abs() > Z_CRITICAL {
        Some((
            AlertLevel::Critical,
            format!(
                "count {} above p99 ({:.2}), |z| {:.2} above {}, flagged by outlier model",
                count,
                entry.p99,
                z.abs(),
                Z_CRITICAL
            ),
        ))
    } else if c > entry.p95 && z.abs() > Z_WARNING {
        Some((
            AlertLevel::Warning,
            format!(
                "count {} above p95 ({:.2}), |z| {:.2} above {}, flagged by outlier model",
                count,
                entry.p95,
                z.abs(),
                Z_WARNING
            ),
        ))
    } else {
        None
    }
}

/// Degraded detection used until a model has been fit: WARNING on any BAD
/// observation more than three robust sigmas from its baseline mean.
fn score_only(
    baseline: &BaselineStore,
    batch: &[Observation],
) -> Result<Vec<AnomalyRecord>, DetectError> {
    let mut records = Vec::new();
    for obs in batch {
        if !obs.status.is_bad() {
            continue;
        }
        match score(baseline, obs)? {
            ScoreOutcome::Scored { z, .. } if z.abs() > Z_CRITICAL => {
                records.push(AnomalyRecord {
                    time: obs.time.clone(),
                    status: obs.status,
                    count: obs.count,
                    level: AlertLevel::Warning,
                    score: z,
                    message: format!(
                        "count {} deviates from baseline mean by |z| {:.2} (score-only mode)",
                        obs.count,
                        z.abs()
                    ),
                });
            }
            _ => {}
        }
    }
    Ok(records)
}
