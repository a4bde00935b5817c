use anyhow::{bail, Result};
use chrono::{Duration, NaiveDateTime, Timelike};

use super::dataset::WeatherDataset;
use super::pv::GenerationDataset;
use crate::domain::PowerPoint;

/// Forecast model consuming the weather and generation arrays.
///
/// Implementations rely on the variable names produced by the NWP client
/// (`dswrf`, `t`, `vis`, ...) and the single-site generation layout.
#[cfg_attr(test, mockall::automock)]
pub trait ForecastModel: Send + Sync {
    fn predict(
        &self,
        nwp: &WeatherDataset,
        pv: &GenerationDataset,
        ts: NaiveDateTime,
    ) -> Result<Vec<PowerPoint>>;
}

/// Baseline model: shortwave irradiance scaled by capacity and a fixed
/// performance ratio, nudged toward the latest live reading.
#[derive(Debug, Clone)]
pub struct IrradianceModel {
    pub horizon_hours: u32,
    pub performance_ratio: f64,
    /// Hours over which the live-reading bias decays to zero
    pub live_blend_hours: u32,
}

impl Default for IrradianceModel {
    fn default() -> Self {
        Self {
            horizon_hours: 48,
            performance_ratio: 0.85,
            live_blend_hours: 4,
        }
    }
}

/// Standard test condition irradiance (W/m2)
const STC_IRRADIANCE: f64 = 1000.0;

fn hour_floor(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap_or(ts)
}

impl IrradianceModel {
    fn estimate(&self, nwp: &WeatherDataset, kwp: f64, at: NaiveDateTime) -> f64 {
        nwp.value_at("dswrf", at)
            .filter(|g| !g.is_nan())
            .map(|g| (kwp * g / STC_IRRADIANCE * self.performance_ratio).clamp(0.0, kwp))
            .unwrap_or(0.0)
    }

    fn bias_weight(&self, step: u32) -> f64 {
        if self.live_blend_hours == 0 {
            return 0.0;
        }
        (1.0 - f64::from(step) / f64::from(self.live_blend_hours)).max(0.0)
    }
}

impl ForecastModel for IrradianceModel {
    fn predict(
        &self,
        nwp: &WeatherDataset,
        pv: &GenerationDataset,
        ts: NaiveDateTime,
    ) -> Result<Vec<PowerPoint>> {
        if nwp.sel("dswrf").is_none() {
            bail!("weather dataset has no dswrf variable");
        }

        let kwp = pv.coords().kwp;
        let start = hour_floor(ts);
        let bias = pv
            .latest()
            .map(|(at, kw)| kw - self.estimate(nwp, kwp, hour_floor(at)))
            .unwrap_or(0.0);

        let points = (0..self.horizon_hours)
            .map(|step| {
                let timestamp = start + Duration::hours(i64::from(step));
                let base = self.estimate(nwp, kwp, timestamp);
                let power_kw = (base + bias * self.bias_weight(step)).clamp(0.0, kwp);
                PowerPoint {
                    timestamp,
                    power_kw,
                }
            })
            .collect();
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GenerationReading, LiveSeries, Site};
    use crate::forecast::dataset::{normalize, HourlyWeatherTable};
    use crate::forecast::pv::harmonize;
    use chrono::NaiveDate;

    fn midnight() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn weather(site: &Site, dswrf: Vec<f64>) -> WeatherDataset {
        let index = (0..dswrf.len())
            .map(|i| midnight() + Duration::hours(i as i64))
            .collect();
        let table = HourlyWeatherTable::new(index)
            .with_column("dswrf", dswrf)
            .unwrap();
        normalize(&table, "icon", site).unwrap()
    }

    fn model(horizon_hours: u32) -> IrradianceModel {
        IrradianceModel {
            horizon_hours,
            performance_ratio: 1.0,
            live_blend_hours: 2,
        }
    }

    #[test]
    fn test_scales_irradiance_by_capacity() {
        let site = Site::new(51.5, -0.1, 4.0);
        let nwp = weather(&site, vec![0.0, 250.0, 500.0, 2000.0]);
        let pv = harmonize(None, midnight(), &site);

        let points = model(4).predict(&nwp, &pv, midnight()).unwrap();
        let kw: Vec<f64> = points.iter().map(|p| p.power_kw).collect();

        assert_eq!(kw, vec![0.0, 1.0, 2.0, 4.0]);
        assert_eq!(points[0].timestamp, midnight());
    }

    #[test]
    fn test_starts_at_reference_hour_and_pads_beyond_window() {
        let site = Site::new(51.5, -0.1, 4.0);
        let nwp = weather(&site, vec![500.0; 3]);
        let pv = harmonize(None, midnight(), &site);
        let ts = midnight() + Duration::minutes(90);

        let points = model(3).predict(&nwp, &pv, ts).unwrap();

        assert_eq!(points[0].timestamp, midnight() + Duration::hours(1));
        assert_eq!(points[1].power_kw, 2.0);
        assert_eq!(points[2].power_kw, 0.0);
    }

    #[test]
    fn test_live_bias_decays() {
        let site = Site::new(51.5, -0.1, 4.0);
        let nwp = weather(&site, vec![500.0; 4]);
        let ts = midnight() + Duration::hours(1);
        let live = LiveSeries::new(vec![GenerationReading::new(ts, 3.0)]);
        let pv = harmonize(Some(&live), ts, &site);

        let points = model(3).predict(&nwp, &pv, ts).unwrap();
        let kw: Vec<f64> = points.iter().map(|p| p.power_kw).collect();

        // model says 2.0, live says 3.0: +1.0 decaying over two hours
        assert_eq!(kw, vec![3.0, 2.5, 2.0]);
    }

    #[test]
    fn test_requires_shortwave_radiation() {
        let site = Site::new(51.5, -0.1, 4.0);
        let table = HourlyWeatherTable::new(vec![midnight()])
            .with_column("t", vec![15.0])
            .unwrap();
        let nwp = normalize(&table, "icon", &site).unwrap();
        let pv = harmonize(None, midnight(), &site);

        assert!(model(1).predict(&nwp, &pv, midnight()).is_err());
    }
}
