/// Quality threshold checking for joined records.
///
/// The limit is inclusive: a quality reading equal to the limit alerts.
/// Records without a quality side never alert, whatever the level says.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::JoinedRecord;

/// Marks `record` alert or normal against `limit`. Pure.
pub fn evaluate(record: JoinedRecord, limit: f64) -> JoinedRecord {
    let is_alert = record.quality.as_ref().is_some_and(|q| q.value >= limit);
    JoinedRecord { is_alert, ..record }
}

/// Counts over an evaluated series, for reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertSummary {
    pub records: usize,
    pub with_quality: usize,
    pub alerts: usize,
    pub first_alert: Option<DateTime<Utc>>,
    pub peak_quality: Option<f64>,
}

pub fn summarize(records: &[JoinedRecord]) -> AlertSummary {
    let mut summary = AlertSummary {
        records: records.len(),
        ..AlertSummary::default()
    };
    for record in records {
        if let Some(q) = &record.quality {
            summary.with_quality += 1;
            summary.peak_quality = Some(summary.peak_quality.map_or(q.value, |p| p.max(q.value)));
        }
        if record.is_alert {
            summary.alerts += 1;
            if summary.first_alert.is_none() {
                summary.first_alert = Some(record.timestamp);
            }
        }
    }
    summary
}
