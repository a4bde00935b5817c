use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One live power reading reported by an inverter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationReading {
    pub timestamp: NaiveDateTime,
    pub power_kw: f64,
}

impl GenerationReading {
    pub fn new(timestamp: NaiveDateTime, power_kw: f64) -> Self {
        Self {
            timestamp,
            power_kw,
        }
    }
}

/// Live generation time series in the order the provider returned it.
///
/// Ordering is not enforced: providers occasionally return rows out of order
/// or ahead of the reference time, and the harmonizer filters those out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiveSeries(Vec<GenerationReading>);

impl LiveSeries {
    pub fn new(readings: Vec<GenerationReading>) -> Self {
        Self(readings)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Readings at or before `ts`, original order preserved
    pub fn up_to(&self, ts: NaiveDateTime) -> impl Iterator<Item = &GenerationReading> {
        self.0.iter().filter(move |r| r.timestamp <= ts)
    }

    /// Readings in provider order
    pub fn into_inner(self) -> Vec<GenerationReading> {
        self.0
    }
}

impl From<Vec<GenerationReading>> for LiveSeries {
    fn from(readings: Vec<GenerationReading>) -> Self {
        Self(readings)
    }
}

impl FromIterator<GenerationReading> for LiveSeries {
    fn from_iter<I: IntoIterator<Item = GenerationReading>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_up_to_keeps_order_and_drops_future() {
        let series = LiveSeries::new(vec![
            GenerationReading::new(at(10), 1.0),
            GenerationReading::new(at(13), 9.0),
            GenerationReading::new(at(9), 0.5),
            GenerationReading::new(at(12), 2.0),
        ]);

        let kept: Vec<f64> = series.up_to(at(12)).map(|r| r.power_kw).collect();
        assert_eq!(kept, vec![1.0, 0.5, 2.0]);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let series = LiveSeries::new(vec![GenerationReading::new(at(10), 1.5)]);
        let json = serde_json::to_value(&series).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["power_kw"], 1.5);
    }
}
