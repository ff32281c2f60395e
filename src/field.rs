//! Labeled gridded field
//!
//! [`GriddedField`] is the value passed between pipeline stages: an `f32` array
//! with named dimensions, a required unit string, attributes and coordinates.
//! Missing cells are NaN. Stages never mutate a field in place; they derive a
//! new one with [`GriddedField::derive`], which bumps [`GriddedField::version`].
//!
//! Attributes keep the value type they were read with, so numeric metadata
//! such as `valid_min` or `realization` survives a load and write cycle.

use crate::calendar::TimeAxis;
use crate::errors::{ClimError, Result};
use ndarray::ArrayD;
use std::collections::BTreeMap;

/// Name of the time dimension
pub const TIME_DIM: &str = "time";

/// Name of the categorical season dimension produced by seasonal grouping
pub const SEASON_DIM: &str = "season";

const LATITUDE_NAMES: [&str; 2] = ["lat", "latitude"];
const LONGITUDE_NAMES: [&str; 2] = ["lon", "longitude"];

/// Global attributes that identify the producing model, in order of preference
const SOURCE_ATTRIBUTES: [&str; 3] = ["model_id", "source_id", "source"];

/// Value of a variable, coordinate or global attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl AttrValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(vec![value])
    }
}

impl From<f32> for AttrValue {
    fn from(value: f32) -> Self {
        Self::Float(vec![value])
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Double(vec![value])
    }
}

/// Attributes by name
pub type Attributes = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct GriddedField {
    name: String,
    dims: Vec<String>,
    data: ArrayD<f32>,
    units: String,
    attributes: Attributes,
    global_attributes: Attributes,
    coordinates: BTreeMap<String, Vec<f64>>,
    coordinate_attributes: BTreeMap<String, Attributes>,
    labels: BTreeMap<String, Vec<String>>,
    time: Option<TimeAxis>,
    version: u32,
}

impl GriddedField {
    /// Create a field. Non-finite cells are stored as missing (NaN).
    pub fn new(
        name: impl Into<String>,
        dims: Vec<String>,
        data: ArrayD<f32>,
        units: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        if dims.len() != data.ndim() {
            return Err(ClimError::PreconditionViolation(format!(
                "field '{name}' has {} dimension names for a {}-dimensional array",
                dims.len(),
                data.ndim()
            )));
        }

        let units = units.into();
        if units.trim().is_empty() {
            return Err(ClimError::MissingAttribute {
                field: name,
                attribute: "units".to_string(),
            });
        }

        Ok(Self {
            name,
            dims,
            data: data.mapv_into(|v| if v.is_finite() { v } else { f32::NAN }),
            units,
            attributes: BTreeMap::new(),
            global_attributes: BTreeMap::new(),
            coordinates: BTreeMap::new(),
            coordinate_attributes: BTreeMap::new(),
            labels: BTreeMap::new(),
            time: None,
            version: 0,
        })
    }

    /// Attach a numeric coordinate to `dim`.
    pub fn with_coordinate(mut self, dim: &str, values: Vec<f64>) -> Result<Self> {
        let len = self.dim_len(dim)?;
        if values.len() != len {
            return Err(ClimError::PreconditionViolation(format!(
                "coordinate '{dim}' has {} values but the dimension has length {len}",
                values.len()
            )));
        }
        self.coordinates.insert(dim.to_string(), values);
        Ok(self)
    }

    /// Attach categorical labels to `dim`.
    pub fn with_labels(mut self, dim: &str, labels: Vec<String>) -> Result<Self> {
        let len = self.dim_len(dim)?;
        if labels.len() != len {
            return Err(ClimError::PreconditionViolation(format!(
                "label coordinate '{dim}' has {} entries but the dimension has length {len}",
                labels.len()
            )));
        }
        self.labels.insert(dim.to_string(), labels);
        Ok(self)
    }

    /// Attach the decoded time axis to the `time` dimension.
    pub fn with_time_axis(mut self, axis: TimeAxis) -> Result<Self> {
        let len = self.dim_len(TIME_DIM)?;
        if axis.len() != len {
            return Err(ClimError::PreconditionViolation(format!(
                "time axis has {} steps but the '{TIME_DIM}' dimension has length {len}",
                axis.len()
            )));
        }
        self.time = Some(axis);
        Ok(self)
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_global_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttrValue>,
    ) -> Self {
        self.global_attributes.insert(key.into(), value.into());
        self
    }

    /// Attach an attribute to the coordinate variable of `dim` (e.g. `lat:units`).
    pub fn with_coordinate_attribute(
        mut self,
        dim: &str,
        key: impl Into<String>,
        value: impl Into<AttrValue>,
    ) -> Result<Self> {
        self.axis_index(dim)?;
        self.coordinate_attributes
            .entry(dim.to_string())
            .or_default()
            .insert(key.into(), value.into());
        Ok(self)
    }

    /// Start a new version of this field with replaced data and dimensions.
    ///
    /// Attributes carry over; coordinates, labels and the time axis are kept only
    /// for dimensions that survive with unchanged length.
    pub fn derive(&self, dims: Vec<String>, data: ArrayD<f32>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(ClimError::PreconditionViolation(format!(
                "derived field '{}' has {} dimension names for a {}-dimensional array",
                self.name,
                dims.len(),
                data.ndim()
            )));
        }

        let keeps = |dim: &str| -> bool {
            let old = self.dims.iter().position(|d| d == dim);
            let new = dims.iter().position(|d| d == dim);
            match (old, new) {
                (Some(o), Some(n)) => self.data.shape()[o] == data.shape()[n],
                _ => false,
            }
        };

        let coordinates = self
            .coordinates
            .iter()
            .filter(|(dim, _)| keeps(dim))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let labels = self
            .labels
            .iter()
            .filter(|(dim, _)| keeps(dim))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let coordinate_attributes = self
            .coordinate_attributes
            .iter()
            .filter(|(dim, _)| keeps(dim))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let time = self.time.clone().filter(|_| keeps(TIME_DIM));

        Ok(Self {
            name: self.name.clone(),
            dims,
            data: data.mapv_into(|v| if v.is_finite() { v } else { f32::NAN }),
            units: self.units.clone(),
            attributes: self.attributes.clone(),
            global_attributes: self.global_attributes.clone(),
            coordinates,
            coordinate_attributes,
            labels,
            time,
            version: self.version + 1,
        })
    }

    /// Same as [`GriddedField::derive`] with the existing dimensions.
    pub fn with_data(&self, data: ArrayD<f32>) -> Result<Self> {
        if data.shape() != self.data.shape() {
            return Err(ClimError::PreconditionViolation(format!(
                "replacement data for '{}' has shape {:?}, expected {:?}",
                self.name,
                data.shape(),
                self.data.shape()
            )));
        }
        self.derive(self.dims.clone(), data)
    }

    /// Rewrite the unit string. Only callers that rescale the data should use this.
    #[must_use]
    pub fn relabel_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    #[must_use]
    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn units(&self) -> &str {
        &self.units
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Text value of a variable attribute
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttrValue::as_text)
    }

    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Text value of a global attribute
    #[must_use]
    pub fn global_attribute(&self, key: &str) -> Option<&str> {
        self.global_attributes.get(key).and_then(AttrValue::as_text)
    }

    #[must_use]
    pub fn global_attributes(&self) -> &Attributes {
        &self.global_attributes
    }

    #[must_use]
    pub fn coordinate_attributes(&self, dim: &str) -> Option<&Attributes> {
        self.coordinate_attributes.get(dim)
    }

    #[must_use]
    pub fn coordinate(&self, dim: &str) -> Option<&[f64]> {
        self.coordinates.get(dim).map(Vec::as_slice)
    }

    #[must_use]
    pub fn labels(&self, dim: &str) -> Option<&[String]> {
        self.labels.get(dim).map(Vec::as_slice)
    }

    #[must_use]
    pub fn time_axis(&self) -> Option<&TimeAxis> {
        self.time.as_ref()
    }

    /// Position of `dim` in the dimension list.
    pub fn axis_index(&self, dim: &str) -> Result<usize> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .ok_or_else(|| ClimError::DimensionNotFound {
                var: self.name.clone(),
                dim: dim.to_string(),
            })
    }

    fn dim_len(&self, dim: &str) -> Result<usize> {
        Ok(self.data.shape()[self.axis_index(dim)?])
    }

    /// Name of the latitude dimension (`lat` or `latitude`)
    pub fn latitude_dim(&self) -> Result<&str> {
        self.find_dim(&LATITUDE_NAMES)
    }

    /// Name of the longitude dimension (`lon` or `longitude`)
    pub fn longitude_dim(&self) -> Result<&str> {
        self.find_dim(&LONGITUDE_NAMES)
    }

    fn find_dim(&self, candidates: &[&str]) -> Result<&str> {
        self.dims
            .iter()
            .find(|d| candidates.iter().any(|c| d.eq_ignore_ascii_case(c)))
            .map(String::as_str)
            .ok_or_else(|| ClimError::DimensionNotFound {
                var: self.name.clone(),
                dim: candidates[0].to_string(),
            })
    }

    /// Processing history carried in the `history` global attribute.
    pub fn history(&self) -> Result<&str> {
        self.global_attribute("history")
            .ok_or_else(|| ClimError::MissingAttribute {
                field: self.name.clone(),
                attribute: "history".to_string(),
            })
    }

    /// Model or source identifier (`model_id`, else `source_id`, else `source`).
    pub fn source_id(&self) -> Result<&str> {
        SOURCE_ATTRIBUTES
            .iter()
            .find_map(|key| self.global_attribute(key))
            .ok_or_else(|| ClimError::MissingAttribute {
                field: self.name.clone(),
                attribute: SOURCE_ATTRIBUTES[0].to_string(),
            })
    }

    /// Number of cells that are not missing.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}
