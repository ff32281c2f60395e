//! NetCDF I/O: loading variables into [`GriddedField`]s and writing them back
//!
//! Loading reads the whole variable, its coordinate variables and every
//! attribute of a supported type, then closes the file. Fill values become NaN and the
//! `time` coordinate is decoded with its `units` and `calendar` attributes.
//! Writing goes through a staged temporary file so the destination is replaced
//! only once the new file is complete; a field loaded from a path can be written
//! back to the same path.

use crate::calendar::{Calendar, TimeAxis, TimeUnits};
use crate::errors::{ClimError, Result};
use crate::field::{AttrValue, GriddedField, TIME_DIM};
use crate::utils::{commit_all, staged_file};
use ndarray::{Array1, ArrayD};
use netcdf::{AttributeValue, Variable};
use std::path::Path;
use tracing::{debug, info};

/// Fill value written for missing cells
pub const DEFAULT_FILL_VALUE: f32 = 1.0e20;

/// Variable attributes handled explicitly rather than copied
const RESERVED_ATTRIBUTES: [&str; 4] = ["units", "_FillValue", "scale_factor", "add_offset"];

/// Coordinate attributes that do not survive a rewrite: fill values would not
/// match the `f64` coordinate and cell bounds variables are not carried
const COORDINATE_RESERVED: [&str; 3] = ["_FillValue", "missing_value", "bounds"];

/// Time attributes regenerated from the decoded axis
const TIME_RESERVED: [&str; 2] = ["units", "calendar"];

/// Anything that can produce a named variable as a field
pub trait FieldSource {
    fn load(&self, path: &Path, variable: &str) -> Result<GriddedField>;
}

/// Reads fields from NetCDF files
#[derive(Debug, Clone, Copy, Default)]
pub struct NetCdfSource;

impl FieldSource for NetCdfSource {
    fn load(&self, path: &Path, variable: &str) -> Result<GriddedField> {
        load_field(path, variable)
    }
}

/// Load `variable` from the NetCDF file at `path`.
pub fn load_field(path: &Path, variable: &str) -> Result<GriddedField> {
    if !path.exists() {
        return Err(ClimError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        ));
    }

    let file = netcdf::open(path)?;
    let var = file
        .variable(variable)
        .ok_or_else(|| ClimError::VariableNotFound {
            var: variable.to_string(),
            path: path.to_path_buf(),
        })?;

    let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

    let units = string_attribute(&var, "units")?.ok_or_else(|| ClimError::MissingAttribute {
        field: variable.to_string(),
        attribute: "units".to_string(),
    })?;

    let mut values: Vec<f32> = var.get_values::<f32, _>(..)?;
    mask_fill_values(&var, &mut values)?;
    unpack(&var, &mut values)?;

    let data = ArrayD::from_shape_vec(shape, values)?;
    debug!("Read '{variable}' {:?} from {}", data.shape(), path.display());

    let mut field = GriddedField::new(variable, dims.clone(), data, units)?;

    for attr in var.attributes() {
        let name = attr.name();
        if RESERVED_ATTRIBUTES.contains(&name) {
            continue;
        }
        if let Some(value) = attribute_value(name, attr.value()?) {
            field = field.with_attribute(name, value);
        }
    }

    for attr in file.attributes() {
        if let Some(value) = attribute_value(attr.name(), attr.value()?) {
            field = field.with_global_attribute(attr.name(), value);
        }
    }

    for dim in &dims {
        let Some(coord) = file.variable(dim) else {
            continue;
        };
        if coord.dimensions().len() != 1 {
            continue;
        }
        let values: Vec<f64> = coord.get_values::<f64, _>(..)?;

        if dim == TIME_DIM {
            let units_text =
                string_attribute(&coord, "units")?.ok_or_else(|| ClimError::MissingAttribute {
                    field: TIME_DIM.to_string(),
                    attribute: "units".to_string(),
                })?;
            let units: TimeUnits = units_text.parse()?;
            let calendar = match string_attribute(&coord, "calendar")? {
                Some(name) => name.parse()?,
                None => Calendar::Standard,
            };
            debug!("Time axis: {} steps, {units}, {calendar}", values.len());
            field = field.with_time_axis(TimeAxis::new(values, units, calendar))?;
        } else {
            field = field.with_coordinate(dim, values)?;
        }

        for attr in coord.attributes() {
            let name = attr.name();
            if COORDINATE_RESERVED.contains(&name)
                || (dim == TIME_DIM && TIME_RESERVED.contains(&name))
            {
                continue;
            }
            if let Some(value) = attribute_value(name, attr.value()?) {
                field = field.with_coordinate_attribute(dim, name, value)?;
            }
        }
    }

    info!(
        "Loaded '{variable}' [{}] from {}",
        dims.join(", "),
        path.display()
    );
    Ok(field)
}

fn string_attribute(var: &Variable, name: &str) -> Result<Option<String>> {
    match var.attribute(name) {
        Some(attr) => Ok(attribute_text(attr.value()?)),
        None => Ok(None),
    }
}

fn attribute_text(value: AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Str(s) => Some(s),
        AttributeValue::Strs(ss) => Some(ss.join("\n")),
        _ => None,
    }
}

fn attribute_value(name: &str, value: AttributeValue) -> Option<AttrValue> {
    match value {
        AttributeValue::Str(s) => Some(AttrValue::Text(s)),
        AttributeValue::Strs(ss) => Some(AttrValue::Text(ss.join("\n"))),
        AttributeValue::Short(v) => Some(AttrValue::Short(vec![v])),
        AttributeValue::Shorts(vs) => Some(AttrValue::Short(vs)),
        AttributeValue::Int(v) => Some(AttrValue::Int(vec![v])),
        AttributeValue::Ints(vs) => Some(AttrValue::Int(vs)),
        AttributeValue::Float(v) => Some(AttrValue::Float(vec![v])),
        AttributeValue::Floats(vs) => Some(AttrValue::Float(vs)),
        AttributeValue::Double(v) => Some(AttrValue::Double(vec![v])),
        AttributeValue::Doubles(vs) => Some(AttrValue::Double(vs)),
        _ => {
            debug!("Skipped attribute '{name}' of unsupported type");
            None
        }
    }
}

fn netcdf_value(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::Text(s) => AttributeValue::Str(s.clone()),
        AttrValue::Short(vs) => AttributeValue::Shorts(vs.clone()),
        AttrValue::Int(vs) => AttributeValue::Ints(vs.clone()),
        AttrValue::Float(vs) => AttributeValue::Floats(vs.clone()),
        AttrValue::Double(vs) => AttributeValue::Doubles(vs.clone()),
    }
}

fn attribute_number(value: AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Floats(vs) => vs.first().map(|&v| f64::from(v)),
        AttributeValue::Doubles(vs) => vs.first().copied(),
        _ => None,
    }
}

fn numeric_attribute(var: &Variable, name: &str) -> Result<Option<f64>> {
    match var.attribute(name) {
        Some(attr) => Ok(attribute_number(attr.value()?)),
        None => Ok(None),
    }
}

/// Replace `_FillValue` / `missing_value` cells with NaN.
fn mask_fill_values(var: &Variable, values: &mut [f32]) -> Result<()> {
    for name in ["_FillValue", "missing_value"] {
        if let Some(fill) = numeric_attribute(var, name)? {
            let fill = fill as f32;
            values
                .iter_mut()
                .filter(|v| **v == fill)
                .for_each(|v| *v = f32::NAN);
        }
    }
    Ok(())
}

/// Apply CF packing (`scale_factor`, `add_offset`) when present.
fn unpack(var: &Variable, values: &mut [f32]) -> Result<()> {
    let scale = numeric_attribute(var, "scale_factor")?;
    let offset = numeric_attribute(var, "add_offset")?;
    if scale.is_none() && offset.is_none() {
        return Ok(());
    }
    let scale = scale.unwrap_or(1.0);
    let offset = offset.unwrap_or(0.0);
    for v in values.iter_mut() {
        *v = (f64::from(*v) * scale + offset) as f32;
    }
    Ok(())
}

/// Writes fields to NetCDF files
#[derive(Debug, Clone, Copy)]
pub struct NetCDFWriter {
    fill_value: f32,
}

impl Default for NetCDFWriter {
    fn default() -> Self {
        Self {
            fill_value: DEFAULT_FILL_VALUE,
        }
    }
}

impl NetCDFWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fill_value(mut self, fill_value: f32) -> Self {
        self.fill_value = fill_value;
        self
    }

    /// Write `field` with its coordinates, attributes and global attributes.
    ///
    /// The time coordinate carries its `units` and `calendar`. Missing cells are
    /// written as the fill value, which also replaces any `missing_value`.
    pub fn write_field(&self, field: &GriddedField, output_path: &Path) -> Result<()> {
        let staged = staged_file(output_path)?;

        {
            let mut file = netcdf::create(staged.path())?;

            for (dim, &len) in field.dims().iter().zip(field.shape()) {
                file.add_dimension(dim, len)?;
            }

            for dim in field.dims() {
                if dim == TIME_DIM {
                    if let Some(axis) = field.time_axis() {
                        let mut time = file.add_variable::<f64>(TIME_DIM, &[TIME_DIM])?;
                        time.put_attribute("units", axis.units().to_string())?;
                        time.put_attribute("calendar", axis.calendar().as_str())?;
                        let extra = field.coordinate_attributes(TIME_DIM).into_iter().flatten();
                        for (key, value) in extra {
                            if !TIME_RESERVED.contains(&key.as_str()) {
                                time.put_attribute(key, netcdf_value(value))?;
                            }
                        }
                        time.put(Array1::from(axis.offsets().to_vec()).view(), ..)?;
                    }
                } else if let Some(values) = field.coordinate(dim) {
                    let mut coord = file.add_variable::<f64>(dim, &[dim.as_str()])?;
                    for (key, value) in field.coordinate_attributes(dim).into_iter().flatten() {
                        coord.put_attribute(key, netcdf_value(value))?;
                    }
                    coord.put(Array1::from(values.to_vec()).view(), ..)?;
                } else if field.labels(dim).is_some() {
                    debug!("Label coordinate '{dim}' is not written");
                }
            }

            let dim_refs: Vec<&str> = field.dims().iter().map(String::as_str).collect();
            let mut var = file.add_variable::<f32>(field.name(), &dim_refs)?;
            var.put_attribute("_FillValue", self.fill_value)?;
            var.put_attribute("units", field.units())?;
            for (key, value) in field.attributes() {
                if key == "missing_value" {
                    var.put_attribute(key, self.fill_value)?;
                } else {
                    var.put_attribute(key, netcdf_value(value))?;
                }
            }

            let fill = self.fill_value;
            let data = field.data().mapv(|v| if v.is_nan() { fill } else { v });
            var.put(data.view(), ..)?;

            for (key, value) in field.global_attributes() {
                file.add_attribute(key, netcdf_value(value))?;
            }
        }

        commit_all(vec![(staged, output_path.to_path_buf())])?;
        info!("Wrote '{}' to {}", field.name(), output_path.display());
        Ok(())
    }
}
