use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column holding the forecast that used live telemetry
pub const POWER_KW: &str = "power_kw";
/// Column holding the forecast computed without live telemetry
pub const POWER_KW_NO_LIVE: &str = "power_kw_no_live_pv";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a timestamp the way prediction keys are written
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Forecast AC power at the start of one step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerPoint {
    pub timestamp: NaiveDateTime,
    pub power_kw: f64,
}

/// Prediction table keyed `column -> formatted timestamp -> kW`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionTable {
    columns: BTreeMap<String, BTreeMap<String, f64>>,
}

impl PredictionTable {
    /// Table holding a single column
    pub fn from_series(column: &str, series: &[PowerPoint]) -> Self {
        let mut table = Self::default();
        table.insert_column(column, series);
        table
    }

    /// Add or replace a column
    pub fn insert_column(&mut self, column: &str, series: &[PowerPoint]) {
        let values = series
            .iter()
            .map(|p| (format_timestamp(p.timestamp), p.power_kw))
            .collect();
        self.columns.insert(column.to_string(), values);
    }

    /// Move a column to a new name; no-op when `from` is absent
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(values) = self.columns.remove(from) {
            self.columns.insert(to.to_string(), values);
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Values of one column keyed by formatted timestamp
    pub fn column(&self, column: &str) -> Option<&BTreeMap<String, f64>> {
        self.columns.get(column)
    }

    /// Number of timestamps in the longest column
    pub fn len(&self) -> usize {
        self.columns.values().map(BTreeMap::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether the live-data forecast actually used live telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LiveDataStatus {
    /// Site has no inverter configured
    NotRequested,
    Used { readings: usize },
    Unavailable { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(values: &[f64]) -> Vec<PowerPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| PowerPoint {
                timestamp: start + chrono::Duration::hours(i as i64),
                power_kw: *v,
            })
            .collect()
    }

    #[test]
    fn test_table_to_dict_shape() {
        let mut table = PredictionTable::from_series(POWER_KW, &series(&[1.0, 2.0]));
        table.insert_column(POWER_KW_NO_LIVE, &series(&[0.5, 1.5]));

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json[POWER_KW]["2024-06-01 10:00:00"], 1.0);
        assert_eq!(json[POWER_KW_NO_LIVE]["2024-06-01 11:00:00"], 1.5);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rename_column() {
        let mut table = PredictionTable::from_series(POWER_KW, &series(&[1.0]));
        table.rename_column(POWER_KW, POWER_KW_NO_LIVE);

        assert!(!table.has_column(POWER_KW));
        assert!(table.has_column(POWER_KW_NO_LIVE));
    }

    #[test]
    fn test_live_status_serialization() {
        let json = serde_json::to_value(LiveDataStatus::Unavailable {
            reason: "no system id".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "no system id");

        let json = serde_json::to_value(LiveDataStatus::NotRequested).unwrap();
        assert_eq!(json["status"], "not_requested");
    }
}
