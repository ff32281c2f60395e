//! Temporal reduction: climatological means over months and seasons
//!
//! The reducer works in two modes:
//!
//! - [`TemporalReducer::climatology`] keeps the time steps matching a
//!   [`TimeSelector`] and averages them, dropping the time dimension;
//! - [`TemporalReducer::seasonal_climatology`] groups time steps by season and
//!   averages within each group, replacing time with a `season` dimension.
//!
//! Means skip missing cells and accumulate in `f64`.

use crate::calendar::{Season, TimeSelector, TimeStamp};
use crate::errors::{ClimError, Result};
use crate::field::{GriddedField, SEASON_DIM, TIME_DIM};
use ndarray::{ArrayD, Axis};
use tracing::{debug, info};

/// Trait for arrays that can be averaged along an axis ignoring missing cells
pub trait NanMean {
    /// Mean along `axis`; cells with no valid sample become NaN.
    fn nan_mean_axis(&self, axis: usize) -> Result<ArrayD<f32>>;
}

impl NanMean for ArrayD<f32> {
    fn nan_mean_axis(&self, axis: usize) -> Result<ArrayD<f32>> {
        if axis >= self.ndim() {
            return Err(ClimError::PreconditionViolation(format!(
                "Axis {axis} is out of bounds for array with {} dimensions",
                self.ndim()
            )));
        }

        Ok(self.map_axis(Axis(axis), |lane| {
            let (sum, count) = lane
                .iter()
                .filter(|v| v.is_finite())
                .fold((0.0f64, 0usize), |(sum, count), &v| {
                    (sum + f64::from(v), count + 1)
                });
            if count > 0 {
                (sum / count as f64) as f32
            } else {
                f32::NAN
            }
        }))
    }
}

/// Computes climatologies over the time dimension of a field
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalReducer;

impl TemporalReducer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Mean over the time steps matching `selector`.
    pub fn climatology(&self, field: &GriddedField, selector: TimeSelector) -> Result<GriddedField> {
        let (axis, dates) = time_dates(field)?;

        let indices: Vec<usize> = dates
            .iter()
            .enumerate()
            .filter(|(_, stamp)| selector.matches(stamp))
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            return Err(ClimError::EmptySelection {
                selector: selector.to_string(),
            });
        }

        info!(
            "Averaging {} of {} time steps for '{}' ({})",
            indices.len(),
            dates.len(),
            field.name(),
            selector
        );

        let mean = field
            .data()
            .select(Axis(axis), &indices)
            .nan_mean_axis(axis)?;

        let dims = without_dim(field.dims(), axis);
        Ok(field
            .derive(dims, mean)?
            .with_attribute("cell_methods", "time: mean")
            .with_attribute("climatology_period", selector.label()))
    }

    /// Group time steps by season and average within each group.
    ///
    /// The result has a leading `season` dimension holding the seasons present
    /// in the data, ordered DJF, MAM, JJA, SON.
    pub fn seasonal_climatology(&self, field: &GriddedField) -> Result<GriddedField> {
        let (axis, dates) = time_dates(field)?;

        let mut labels = Vec::new();
        let mut slices = Vec::new();
        for season in Season::ALL {
            let indices = indices_for(&dates, season);
            if indices.is_empty() {
                debug!("No time steps fall in {season}");
                continue;
            }
            let mean = field
                .data()
                .select(Axis(axis), &indices)
                .nan_mean_axis(axis)?;
            labels.push(season.label().to_string());
            slices.push(mean);
        }

        if slices.is_empty() {
            return Err(ClimError::EmptySelection {
                selector: "any season".to_string(),
            });
        }

        let views: Vec<_> = slices.iter().map(|s| s.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views)?;

        let mut dims = vec![SEASON_DIM.to_string()];
        dims.extend(without_dim(field.dims(), axis));

        field
            .derive(dims, stacked)?
            .with_attribute("cell_methods", "time: mean within seasons")
            .with_labels(SEASON_DIM, labels)
    }

    /// Extract one slice of a labelled dimension, e.g. `season = "JJA"`.
    pub fn select_label(&self, field: &GriddedField, dim: &str, label: &str) -> Result<GriddedField> {
        let axis = field.axis_index(dim)?;
        let labels = field.labels(dim).ok_or_else(|| {
            ClimError::PreconditionViolation(format!(
                "dimension '{dim}' of '{}' has no labels",
                field.name()
            ))
        })?;

        let position = labels
            .iter()
            .position(|l| l.eq_ignore_ascii_case(label))
            .ok_or_else(|| {
                ClimError::InputValidation(format!(
                    "label '{label}' not found in '{dim}' (available: {})",
                    labels.join(", ")
                ))
            })?;

        let slice = field.data().index_axis(Axis(axis), position).to_owned();
        let dims = without_dim(field.dims(), axis);
        Ok(field
            .derive(dims, slice)?
            .with_attribute("climatology_period", labels[position].clone()))
    }
}

fn time_dates(field: &GriddedField) -> Result<(usize, Vec<TimeStamp>)> {
    let axis = field.axis_index(TIME_DIM)?;
    let time = field.time_axis().ok_or_else(|| {
        ClimError::PreconditionViolation(format!(
            "field '{}' has a '{TIME_DIM}' dimension but no decoded time coordinate",
            field.name()
        ))
    })?;
    Ok((axis, time.dates()?))
}

fn indices_for(dates: &[TimeStamp], season: Season) -> Vec<usize> {
    let selector = TimeSelector::Season(season);
    dates
        .iter()
        .enumerate()
        .filter(|(_, stamp)| selector.matches(stamp))
        .map(|(i, _)| i)
        .collect()
}

fn without_dim(dims: &[String], axis: usize) -> Vec<String> {
    dims.iter()
        .enumerate()
        .filter_map(|(i, name)| if i != axis { Some(name.clone()) } else { None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Calendar, Month, TimeAxis};

    /// Twelve monthly steps for one year on a 1x2 grid; value = month number,
    /// second cell is missing in July.
    fn monthly_field() -> GriddedField {
        let mut values = Vec::new();
        for month in 1..=12 {
            values.push(month as f32);
            values.push(if month == 7 { f32::NAN } else { 10.0 * month as f32 });
        }
        let data = ArrayD::from_shape_vec(vec![12, 1, 2], values).unwrap();
        let offsets: Vec<f64> = (0..12).map(|m| f64::from(m) * 30.0 + 15.0).collect();
        let axis = TimeAxis::new(
            offsets,
            "days since 2001-01-01".parse().unwrap(),
            Calendar::Day360,
        );
        GriddedField::new(
            "pr",
            vec!["time".into(), "lat".into(), "lon".into()],
            data,
            "kg m-2 s-1",
        )
        .unwrap()
        .with_time_axis(axis)
        .unwrap()
    }

    #[test]
    fn test_nan_mean_axis() {
        let data =
            ArrayD::from_shape_vec(vec![3, 2], vec![1.0, f32::NAN, 3.0, f32::NAN, 5.0, 4.0]).unwrap();
        let mean = data.nan_mean_axis(0).unwrap();
        assert_eq!(mean[[0]], 3.0);
        assert_eq!(mean[[1]], 4.0);

        let all_missing = ArrayD::from_shape_vec(vec![2, 1], vec![f32::NAN, f32::NAN]).unwrap();
        assert!(all_missing.nan_mean_axis(0).unwrap()[[0]].is_nan());

        assert!(data.nan_mean_axis(2).is_err());
    }

    #[test]
    fn test_season_climatology() {
        let field = monthly_field();
        let clim = TemporalReducer::new()
            .climatology(&field, TimeSelector::Season(Season::Djf))
            .unwrap();

        assert_eq!(clim.dims(), &["lat".to_string(), "lon".to_string()]);
        // months 12, 1, 2
        assert_eq!(clim.data()[[0, 0]], 5.0);
        assert_eq!(clim.data()[[0, 1]], 50.0);
        assert_eq!(clim.attribute("cell_methods"), Some("time: mean"));
        assert_eq!(clim.attribute("climatology_period"), Some("DJF"));
        assert!(clim.time_axis().is_none());
        assert_eq!(clim.version(), field.version() + 1);
    }

    #[test]
    fn test_month_climatology_skips_missing() {
        let field = monthly_field();
        let clim = TemporalReducer::new()
            .climatology(&field, TimeSelector::Month(Month::July))
            .unwrap();
        assert_eq!(clim.data()[[0, 0]], 7.0);
        assert!(clim.data()[[0, 1]].is_nan());

        let jja = TemporalReducer::new()
            .climatology(&field, TimeSelector::Season(Season::Jja))
            .unwrap();
        // July is missing in the second cell: mean of June and August only
        assert_eq!(jja.data()[[0, 1]], 70.0);
    }

    #[test]
    fn test_empty_selection_fails() {
        let field = monthly_field();
        let axis = field.time_axis().unwrap().select(&[0, 1]);
        let data = field
            .data()
            .select(Axis(0), &[0, 1]);
        let january_february = GriddedField::new("pr", field.dims().to_vec(), data, "mm/day")
            .unwrap()
            .with_time_axis(axis)
            .unwrap();

        let result = TemporalReducer::new()
            .climatology(&january_february, TimeSelector::Season(Season::Jja));
        assert!(matches!(result, Err(ClimError::EmptySelection { .. })));
    }

    #[test]
    fn test_missing_time_axis_is_precondition() {
        let data = ArrayD::<f32>::zeros(vec![2, 1]);
        let field = GriddedField::new("pr", vec!["time".into(), "lat".into()], data, "mm/day")
            .unwrap();
        let result = TemporalReducer::new().climatology(&field, TimeSelector::All);
        assert!(matches!(result, Err(ClimError::PreconditionViolation(_))));
    }

    #[test]
    fn test_seasonal_grouping_and_selection() {
        let field = monthly_field();
        let reducer = TemporalReducer::new();
        let grouped = reducer.seasonal_climatology(&field).unwrap();

        assert_eq!(grouped.shape(), &[4, 1, 2]);
        assert_eq!(grouped.dims()[0], SEASON_DIM);
        assert_eq!(
            grouped.labels(SEASON_DIM).unwrap(),
            &["DJF", "MAM", "JJA", "SON"].map(String::from)
        );
        assert_eq!(grouped.data()[[1, 0, 0]], 4.0);
        assert_eq!(grouped.data()[[3, 0, 1]], 100.0);

        let djf = reducer.select_label(&grouped, SEASON_DIM, "djf").unwrap();
        let direct = reducer
            .climatology(&field, TimeSelector::Season(Season::Djf))
            .unwrap();
        assert_eq!(djf.data(), direct.data());

        let missing = reducer.select_label(&grouped, SEASON_DIM, "XYZ");
        assert!(matches!(missing, Err(ClimError::InputValidation(_))));
    }
}
