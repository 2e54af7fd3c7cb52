//! Anomaly scoring engine: baselines, features, outlier model, alert policy.

pub mod baseline;
pub mod engine;
pub mod features;
pub mod forest;
pub mod scoring;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("malformed time bucket {0:?}: expected \"HHh MM\"")]
    MalformedTimeBucket(String),

    #[error("outlier model has not been fit yet")]
    ModelNotTrained,
}

/// Parse the hour component out of an `"HHh MM"` bucket label.
///
/// A bucket that does not parse is a hard validation error: the whole
/// batch it came from is rejected, not partially processed.
pub fn parse_bucket_hour(bucket: &str) -> Result<u8, DetectError> {
    let malformed = || DetectError::MalformedTimeBucket(bucket.to_string());

    let (digits, _) = bucket.split_once('h').ok_or_else(&malformed)?;
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let hour: u8 = digits.parse().map_err(|_| malformed())?;
    if hour > 23 {
        return Err(malformed());
    }
    Ok(hour)
}
