//! Domain types shared across the crate: observations, statuses, alerts.

use serde::{Deserialize, Serialize};

/// Transaction outcome reported by the payment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Approved,
    Denied,
    Reversed,
    Refunded,
    Processing,
    BackendReversed,
    Failed,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 7] = [
        TransactionStatus::Approved,
        TransactionStatus::Denied,
        TransactionStatus::Reversed,
        TransactionStatus::Refunded,
        TransactionStatus::Processing,
        TransactionStatus::BackendReversed,
        TransactionStatus::Failed,
    ];

    /// Failure-indicative statuses. Only these are eligible for alerting.
    pub fn is_bad(self) -> bool {
        matches!(
            self,
            TransactionStatus::Failed
                | TransactionStatus::Denied
                | TransactionStatus::Reversed
                | TransactionStatus::BackendReversed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Approved => "approved",
            TransactionStatus::Denied => "denied",
            TransactionStatus::Reversed => "reversed",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Processing => "processing",
            TransactionStatus::BackendReversed => "backend_reversed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Parse the wire string form. Unknown statuses are a boundary error,
    /// handled by ingestion rather than the detection engine.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|st| st.as_str() == s)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity for a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

/// Count of transactions with a given status inside one time bucket.
///
/// Buckets are labelled `"HHh MM"` within a 24-hour cycle, e.g. `"00h 05"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub time: String,
    pub status: TransactionStatus,
    pub count: u64,
}

/// A classified anomaly, ready for persistence and delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub time: String,
    pub status: TransactionStatus,
    pub count: u64,
    pub level: AlertLevel,
    pub score: f64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in TransactionStatus::ALL {
            assert_eq!(TransactionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TransactionStatus::parse("chargeback"), None);
    }

    #[test]
    fn test_bad_subset() {
        let bad: Vec<_> = TransactionStatus::ALL
            .iter()
            .filter(|s| s.is_bad())
            .collect();
        assert_eq!(bad.len(), 4);
        assert!(TransactionStatus::Failed.is_bad());
        assert!(TransactionStatus::BackendReversed.is_bad());
        assert!(!TransactionStatus::Approved.is_bad());
        assert!(!TransactionStatus::Refunded.is_bad());
        assert!(!TransactionStatus::Processing.is_bad());
    }

    #[test]
    fn test_serde_wire_strings() {
        let obs = Observation {
            time: "00h 05".to_string(),
            status: TransactionStatus::BackendReversed,
            count: 3,
        };
        let json = serde_json::to_string(&obs).unwrap();
        assert!(json.contains("\"backend_reversed\""));

        let level = serde_json::to_string(&AlertLevel::Critical).unwrap();
        assert_eq!(level, "\"CRITICAL\"");
    }
}
