//! Hourly weather table and its normalized, coordinate-indexed form
//!
//! The model consumes a `(step, variable)` array of float64 values with scalar
//! coordinates `x` (longitude), `y` (latitude) and `time` (first row of the
//! table). Step coordinates are offsets from `time`, so the first is always
//! zero.

use anyhow::{ensure, Result};
use chrono::{Duration, NaiveDateTime};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use super::error::NwpError;
use crate::domain::Site;

/// Hourly rows over the NWP window, stored column-wise
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyWeatherTable {
    index: Vec<NaiveDateTime>,
    variables: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl HourlyWeatherTable {
    /// Empty table over the given hourly index
    pub fn new(index: Vec<NaiveDateTime>) -> Self {
        Self {
            index,
            variables: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Append a column; its length must match the time index
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Result<Self, NwpError> {
        if values.len() != self.index.len() {
            return Err(NwpError::MalformedResponse(format!(
                "column {} has {} values for {} timestamps",
                name,
                values.len(),
                self.index.len()
            )));
        }
        self.variables.push(name.to_string());
        self.columns.push(values);
        Ok(self)
    }

    /// Append a column holding the same value in every row
    pub fn with_constant(mut self, name: &str, value: f64) -> Self {
        self.columns.push(vec![value; self.index.len()]);
        self.variables.push(name.to_string());
        self
    }

    /// Number of hourly rows
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Weather array handed to the model
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherDataset {
    /// Data variable name; the NWP source label the caller asked for
    name: String,
    step: Vec<Duration>,
    variable: Vec<String>,
    data: Array2<f64>,
    x: f64,
    y: f64,
    time: NaiveDateTime,
}

/// Reshape an hourly table into the model's weather array.
pub fn normalize(
    table: &HourlyWeatherTable,
    source: &str,
    site: &Site,
) -> Result<WeatherDataset, NwpError> {
    let Some(&start) = table.index.first() else {
        return Err(NwpError::EmptyData);
    };

    let step = table.index.iter().map(|t| *t - start).collect();
    let data = Array2::from_shape_fn((table.len(), table.columns.len()), |(row, col)| {
        table.columns[col][row]
    });

    Ok(WeatherDataset {
        name: source.to_string(),
        step,
        variable: table.variables.clone(),
        data,
        x: site.longitude,
        y: site.latitude,
        time: start,
    })
}

impl WeatherDataset {
    /// Source label the dataset was fetched for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offsets of each row from [`WeatherDataset::time`]
    pub fn step(&self) -> &[Duration] {
        &self.step
    }

    pub fn variables(&self) -> &[String] {
        &self.variable
    }

    /// `(step, variable)` values, NaN where the provider had none
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Longitude
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Latitude
    pub fn y(&self) -> f64 {
        self.y
    }

    /// Window start (first timestamp of the hourly table)
    pub fn time(&self) -> NaiveDateTime {
        self.time
    }

    /// All steps of one variable
    pub fn sel(&self, variable: &str) -> Option<ArrayView1<'_, f64>> {
        self.variable
            .iter()
            .position(|v| v == variable)
            .map(|col| self.data.index_axis(Axis(1), col))
    }

    /// Value of `variable` at absolute time `at`, if `at` falls on a step
    pub fn value_at(&self, variable: &str, at: NaiveDateTime) -> Option<f64> {
        let offset = at - self.time;
        let row = self.step.iter().position(|s| *s == offset)?;
        self.sel(variable).map(|col| col[row])
    }

    /// Flatten into rows; NaN becomes `None`
    pub fn to_frame(&self) -> WeatherFrame {
        let rows = self
            .step
            .iter()
            .zip(self.data.rows())
            .map(|(step, row)| WeatherRow {
                step_seconds: step.num_seconds(),
                values: row.iter().map(|v| (!v.is_nan()).then_some(*v)).collect(),
            })
            .collect();

        WeatherFrame {
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            time: self.time,
            variables: self.variable.clone(),
            rows,
        }
    }

    /// Rebuild from rows produced by [`WeatherDataset::to_frame`]
    pub fn from_frame(frame: WeatherFrame) -> Result<Self> {
        let width = frame.variables.len();
        ensure!(
            frame.rows.iter().all(|r| r.values.len() == width),
            "every row must carry {} values",
            width
        );

        let step = frame
            .rows
            .iter()
            .map(|r| Duration::seconds(r.step_seconds))
            .collect();
        let flat = frame
            .rows
            .iter()
            .flat_map(|r| r.values.iter().map(|v| v.unwrap_or(f64::NAN)))
            .collect();
        let data = Array2::from_shape_vec((frame.rows.len(), width), flat)?;

        Ok(Self {
            name: frame.name,
            step,
            variable: frame.variables,
            data,
            x: frame.x,
            y: frame.y,
            time: frame.time,
        })
    }
}

/// Plain tabular form of a [`WeatherDataset`]; missing values are `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherFrame {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub time: NaiveDateTime,
    pub variables: Vec<String>,
    pub rows: Vec<WeatherRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRow {
    pub step_seconds: i64,
    pub values: Vec<Option<f64>>,
}
