//! CSV ingestion of observation batches.
//!
//! Validation lives here, at the boundary: unknown statuses and negative
//! counts never reach the detection engine.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::model::{Observation, TransactionStatus};

#[derive(Debug, Deserialize)]
struct RawRecord {
    time: String,
    status: String,
    count: i64,
}

/// Load a batch of observations from a CSV file with
/// `time,status,count` columns.
pub fn load_csv(path: &str) -> Result<Vec<Observation>> {
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path))?;

    let mut batch = Vec::new();
    for (i, record) in rdr.deserialize::<RawRecord>().enumerate() {
        let record = record.with_context(|| format!("reading {} row {}", path, i + 1))?;
        let obs = validate(record).with_context(|| format!("{} row {}", path, i + 1))?;
        batch.push(obs);
    }
    Ok(batch)
}

fn validate(raw: RawRecord) -> Result<Observation> {
    let Some(status) = TransactionStatus::parse(&raw.status) else {
        bail!("unknown transaction status {:?}", raw.status);
    };
    if raw.count < 0 {
        bail!("negative count {}", raw.count);
    }
    Ok(Observation {
        time: raw.time,
        status,
        count: raw.count as u64,
    })
}
