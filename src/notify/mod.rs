//! Alert delivery -- webhook dispatch of anomaly records.
//!
//! Delivery failures are logged and swallowed: by the time an alert is
//! dispatched the records are already persisted, and a flaky webhook must
//! never fail the detection path.

use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{AlertLevel, AnomalyRecord};

pub struct AlertNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl AlertNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    /// Dispatch a batch of anomaly records to the configured webhook.
    pub async fn send_alert(&self, anomalies: &[AnomalyRecord]) {
        if anomalies.is_empty() {
            return;
        }
        let Some(url) = &self.webhook_url else {
            info!(
                count = anomalies.len(),
                "no webhook configured, skipping alert dispatch"
            );
            return;
        };

        let critical = anomalies
            .iter()
            .filter(|a| a.level == AlertLevel::Critical)
            .count();
        let warnings = anomalies.len() - critical;

        let payload = json!({
            "dispatch_id": Uuid::new_v4(),
            "subject": format!(
                "Transaction anomalies detected - {} critical, {} warnings",
                critical, warnings
            ),
            "body": format_alert_message(anomalies),
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "anomalies": anomalies,
        });

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(count = anomalies.len(), critical, "alert dispatched");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "alert webhook rejected payload");
            }
            Err(e) => {
                warn!(error = %e, "failed to deliver alert");
            }
        }
    }
}

/// Plain-text summary, critical records first.
fn format_alert_message(anomalies: &[AnomalyRecord]) -> String {
    let mut message = String::from("Transaction Anomaly Alert\n");

    for level in [AlertLevel::Critical, AlertLevel::Warning] {
        let group: Vec<_> = anomalies.iter().filter(|a| a.level == level).collect();
        if group.is_empty() {
            continue;
        }
        message.push_str(&format!("\n{}: {}\n", level.as_str(), group.len()));
        for a in group {
            message.push_str(&format!(
                " - {} {} count={} score={:.2}: {}\n",
                a.time, a.status, a.count, a.score, a.message
            ));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionStatus;

    fn record(level: AlertLevel, time: &str) -> AnomalyRecord {
        AnomalyRecord {
            time: time.to_string(),
            status: TransactionStatus::Failed,
            count: 40,
            level,
            score: 15.0,
            message: "count 40 above p99".to_string(),
        }
    }

    #[test]
    fn test_message_groups_critical_first() {
        let msg = format_alert_message(&[
            record(AlertLevel::Warning, "00h 05"),
            record(AlertLevel::Critical, "00h 06"),
        ]);
        let critical_pos = msg.find("CRITICAL").unwrap();
        let warning_pos = msg.find("WARNING").unwrap();
        assert!(critical_pos < warning_pos);
        assert!(msg.contains("00h 06"));
        assert!(msg.contains("score=15.00"));
    }

    #[tokio::test]
    async fn test_no_webhook_is_a_noop() {
        let notifier = AlertNotifier::new(None);
        // Must not panic or block.
        notifier
            .send_alert(&[record(AlertLevel::Critical, "00h 05")])
            .await;
    }
}
