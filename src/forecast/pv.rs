//! PV generation array for the model
//!
//! The model is single-site: `pv_id` always has exactly one entry (id 1) and
//! the site attributes are coordinates along that dimension. When there is no
//! usable live telemetry the array holds a single NaN at the reference time.

use anyhow::{ensure, Result};
use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::domain::{LiveSeries, Site};

pub const PV_ID: u32 = 1;
pub const GENERATION_VARIABLE: &str = "generation_kw";

/// Per-site coordinates carried alongside the generation values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PvSiteCoords {
    pub longitude: f64,
    pub latitude: f64,
    pub kwp: f64,
    pub tilt: f64,
    pub orientation: f64,
}

impl From<&Site> for PvSiteCoords {
    fn from(site: &Site) -> Self {
        Self {
            longitude: site.longitude,
            latitude: site.latitude,
            kwp: site.capacity_kwp,
            tilt: site.tilt,
            orientation: site.orientation,
        }
    }
}

/// `(pv_id, timestamp)` generation array
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDataset {
    pv_id: Vec<u32>,
    timestamp: Vec<NaiveDateTime>,
    generation_kw: Array2<f64>,
    coords: PvSiteCoords,
}

/// Build the generation array from whatever live telemetry was resolved.
///
/// Readings after `ts` are dropped, the rest keep their original order. An
/// absent series, an empty one, or one with nothing at or before `ts` all
/// yield the 1x1 missing sentinel.
pub fn harmonize(live: Option<&LiveSeries>, ts: NaiveDateTime, site: &Site) -> GenerationDataset {
    let (timestamp, values): (Vec<_>, Vec<_>) = live
        .map(|series| series.up_to(ts).map(|r| (r.timestamp, r.power_kw)).unzip())
        .unwrap_or_default();

    let (timestamp, values) = if timestamp.is_empty() {
        (vec![ts], vec![f64::NAN])
    } else {
        (timestamp, values)
    };

    let generation_kw = Array2::from_shape_vec((1, values.len()), values)
        .unwrap_or_else(|_| Array2::from_elem((1, 1), f64::NAN));

    GenerationDataset {
        pv_id: vec![PV_ID],
        timestamp,
        generation_kw,
        coords: PvSiteCoords::from(site),
    }
}

impl GenerationDataset {
    pub fn pv_id(&self) -> &[u32] {
        &self.pv_id
    }

    pub fn timestamp(&self) -> &[NaiveDateTime] {
        &self.timestamp
    }

    pub fn generation_kw(&self) -> &Array2<f64> {
        &self.generation_kw
    }

    pub fn coords(&self) -> &PvSiteCoords {
        &self.coords
    }

    /// Values for the single site
    pub fn series(&self) -> ArrayView1<'_, f64> {
        self.generation_kw.index_axis(Axis(0), 0)
    }

    /// True when the array holds only the missing sentinel
    pub fn is_missing(&self) -> bool {
        self.series().iter().all(|v| v.is_nan())
    }

    /// Most recent non-missing reading
    pub fn latest(&self) -> Option<(NaiveDateTime, f64)> {
        self.timestamp
            .iter()
            .zip(self.series().iter())
            .filter(|(_, v)| !v.is_nan())
            .max_by_key(|(t, _)| **t)
            .map(|(t, v)| (*t, *v))
    }

    pub fn to_frame(&self) -> GenerationFrame {
        let rows = self
            .timestamp
            .iter()
            .zip(self.series().iter())
            .map(|(t, v)| GenerationRow {
                pv_id: PV_ID,
                timestamp: *t,
                generation_kw: (!v.is_nan()).then_some(*v),
            })
            .collect();
        GenerationFrame {
            coords: self.coords,
            rows,
        }
    }

    pub fn from_frame(frame: GenerationFrame) -> Result<Self> {
        ensure!(!frame.rows.is_empty(), "generation frame has no rows");
        ensure!(
            frame.rows.iter().all(|r| r.pv_id == PV_ID),
            "generation frame must describe a single site"
        );

        let timestamp = frame.rows.iter().map(|r| r.timestamp).collect();
        let values: Vec<f64> = frame
            .rows
            .iter()
            .map(|r| r.generation_kw.unwrap_or(f64::NAN))
            .collect();
        let generation_kw = Array2::from_shape_vec((1, values.len()), values)?;

        Ok(Self {
            pv_id: vec![PV_ID],
            timestamp,
            generation_kw,
            coords: frame.coords,
        })
    }
}

/// Plain tabular form of a [`GenerationDataset`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationFrame {
    pub coords: PvSiteCoords,
    pub rows: Vec<GenerationRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRow {
    pub pv_id: u32,
    pub timestamp: NaiveDateTime,
    pub generation_kw: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GenerationReading;
    use chrono::{Duration, NaiveDate};

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn site() -> Site {
        Site::new(51.5, -0.1, 4.0).with_orientation(30.0, 170.0)
    }

    fn reading(minutes_from_ts: i64, kw: f64) -> GenerationReading {
        GenerationReading::new(ts() + Duration::minutes(minutes_from_ts), kw)
    }

    #[test]
    fn test_absent_series_yields_sentinel() {
        let ds = harmonize(None, ts(), &site());

        assert_eq!(ds.pv_id(), [PV_ID]);
        assert_eq!(ds.timestamp(), [ts()]);
        assert_eq!(ds.generation_kw().dim(), (1, 1));
        assert!(ds.generation_kw()[[0, 0]].is_nan());
        assert!(ds.is_missing());
        assert!(ds.latest().is_none());
    }

    #[test]
    fn test_empty_series_same_as_absent() {
        let empty = LiveSeries::default();
        assert_eq!(
            harmonize(Some(&empty), ts(), &site()).to_frame(),
            harmonize(None, ts(), &site()).to_frame()
        );
    }

    #[test]
    fn test_future_readings_dropped_in_original_order() {
        let live = LiveSeries::new(vec![
            reading(-30, 1.2),
            reading(-60, 0.8),
            reading(15, 3.0),
            reading(0, 1.5),
        ]);
        let ds = harmonize(Some(&live), ts(), &site());

        assert_eq!(ds.generation_kw().dim(), (1, 3));
        assert_eq!(ds.series().to_vec(), vec![1.2, 0.8, 1.5]);
        assert_eq!(
            ds.timestamp(),
            [
                ts() - Duration::minutes(30),
                ts() - Duration::minutes(60),
                ts()
            ]
        );
        assert_eq!(ds.latest(), Some((ts(), 1.5)));
    }

    #[test]
    fn test_only_future_readings_fall_back_to_sentinel() {
        let live = LiveSeries::new(vec![reading(5, 1.0), reading(10, 2.0)]);
        let ds = harmonize(Some(&live), ts(), &site());

        assert_eq!(ds.timestamp(), [ts()]);
        assert!(ds.is_missing());
    }

    #[test]
    fn test_site_coords() {
        let ds = harmonize(None, ts(), &site());
        let coords = ds.coords();

        assert_eq!(coords.longitude, -0.1);
        assert_eq!(coords.latitude, 51.5);
        assert_eq!(coords.kwp, 4.0);
        assert_eq!(coords.tilt, 30.0);
        assert_eq!(coords.orientation, 170.0);
    }

    #[test]
    fn test_frame_round_trip() {
        let live = LiveSeries::new(vec![reading(-15, 1.0 / 3.0), reading(-5, 2.2)]);
        let ds = harmonize(Some(&live), ts(), &site());
        let back = GenerationDataset::from_frame(ds.to_frame()).unwrap();
        assert_eq!(back, ds);

        let sentinel = harmonize(None, ts(), &site());
        let frame = sentinel.to_frame();
        assert_eq!(frame.rows[0].generation_kw, None);
        let back = GenerationDataset::from_frame(frame).unwrap();
        assert!(back.is_missing());
        assert_eq!(back.timestamp(), sentinel.timestamp());
    }
}
