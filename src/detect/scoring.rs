//! Robust per-observation deviation scoring against the baseline.

use crate::detect::baseline::{BaselineEntry, BaselineStore};
use crate::detect::{parse_bucket_hour, DetectError};
use crate::model::Observation;

/// Normal-consistency correction for a median-based spread estimate.
const MAD_SCALE: f64 = 1.4826;

/// Sigma never drops below this, so near-constant history cannot blow up
/// the score.
const SIGMA_FLOOR: f64 = 1.0;

/// Outcome of scoring one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored { z: f64, sigma: f64 },
    /// No baseline entry for this (hour, status). Not an error; the
    /// observation is simply excluded from scoring.
    NoBaseline,
}

/// Robust deviation of a count from its baseline entry: `(z, sigma)`.
///
/// The median-based spread is preferred; when the median is zero the
/// sample standard deviation stands in.
pub fn robust_z(entry: &BaselineEntry, count: u64) -> (f64, f64) {
    let spread = if entry.mad > 0.0 {
        MAD_SCALE * entry.mad
    } else {
        entry.std
    };
    let sigma = spread.max(SIGMA_FLOOR);
    ((count as f64 - entry.mean) / sigma, sigma)
}

/// Score an observation against the matching baseline bucket.
///
/// Fails only on a malformed time bucket; a missing baseline is reported
/// as [`ScoreOutcome::NoBaseline`].
pub fn score(store: &BaselineStore, obs: &Observation) -> Result<ScoreOutcome, DetectError> {
    let hour = parse_bucket_hour(&obs.time)?;
    match store.get(hour, obs.status) {
        Some(entry) => {
            let (z, sigma) = robust_z(entry, obs.count);
            Ok(ScoreOutcome::Scored { z, sigma })
        }
        None => Ok(ScoreOutcome::NoBaseline),
    }
}
