//! Command-line interfaces of the `precip_clim` and `change_time_units` binaries.

use crate::calendar::TimeSelector;
use crate::errors::{ClimError, Result};
use crate::mask::Realm;
use crate::pipeline::{MaskSpec, PipelineConfig, DEFAULT_MASK_VARIABLE, DEFAULT_VARIABLE};
use crate::provenance::PersistMode;
use crate::render::{ContourLevels, Extend, ImageFormat, Palette, DEFAULT_DPI};
use crate::units::BoundsPolicy;
use clap::Parser;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Arguments that parsed but do not describe a valid run
#[derive(Error, Debug)]
#[error("argument validation failed: {0}")]
pub struct ArgumentError(pub ClimError);

/// Plot a precipitation climatology
#[derive(Parser, Debug)]
#[command(
    name = "precip_clim",
    version,
    about = "Plot the precipitation climatology of a NetCDF file"
)]
pub struct Args {
    /// Precipitation NetCDF file
    pub input: PathBuf,

    /// Month (e.g. Jan, July), season (DJF, MAM, JJA, SON) or "all"
    #[arg(value_parser = parse_selector)]
    pub selector: TimeSelector,

    /// Output image (.png or .svg)
    pub output: PathBuf,

    /// Precipitation variable name
    #[arg(long, default_value = DEFAULT_VARIABLE)]
    pub variable: String,

    /// Include gridlines on the plot
    #[arg(long, default_value_t = false)]
    pub gridlines: bool,

    /// Contour levels for the colour bar (at least two, strictly increasing)
    #[arg(long, num_args = 2.., value_name = "LEVEL", allow_negative_numbers = true)]
    pub cbar_levels: Option<Vec<f32>>,

    /// Land fraction file and realm to keep (land or ocean)
    #[arg(long, num_args = 2, value_names = ["FILE", "REALM"])]
    pub mask: Option<Vec<String>>,

    /// Land fraction variable name in the mask file
    #[arg(long, default_value = DEFAULT_MASK_VARIABLE)]
    pub mask_variable: String,

    /// Colour bar extension: neither, min, max or both
    #[arg(long, default_value = "max", value_parser = parse_extend)]
    pub extend: Extend,

    /// Colour palette: haline_r or viridis
    #[arg(long, default_value = "haline_r", value_parser = parse_palette)]
    pub palette: Palette,

    /// Output resolution in dots per inch
    #[arg(long, default_value_t = DEFAULT_DPI)]
    pub dpi: u32,

    /// Plausibility check after unit conversion: strict, warn or off
    #[arg(long, default_value = "strict", value_parser = parse_bounds)]
    pub bounds_check: BoundsPolicy,

    /// Store the provenance log inside the image instead of a .txt file
    #[arg(long, default_value_t = false)]
    pub embed_provenance: bool,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Validate the arguments and build the run configuration.
    pub fn into_config(
        self,
        command_line: impl Into<String>,
    ) -> std::result::Result<PipelineConfig, ArgumentError> {
        self.validated(command_line).map_err(ArgumentError)
    }

    fn validated(self, command_line: impl Into<String>) -> Result<PipelineConfig> {
        ImageFormat::from_path(&self.output)?;
        if self.dpi == 0 {
            return Err(ClimError::InputValidation("--dpi must be positive".to_string()));
        }

        let mut config =
            PipelineConfig::new(self.input, self.selector, self.output, command_line);
        config.variable = self.variable;

        if let Some(levels) = self.cbar_levels {
            config.render.levels = ContourLevels::new(levels)?;
        }
        config.render.extend = self.extend;
        config.render.palette = self.palette;
        config.render.gridlines = self.gridlines;
        config.render.dpi = self.dpi;

        if let Some(tokens) = self.mask {
            let [path, realm] = <[String; 2]>::try_from(tokens).map_err(|tokens| {
                ClimError::InputValidation(format!(
                    "--mask takes a file and a realm, got {} value(s)",
                    tokens.len()
                ))
            })?;
            let mut mask = MaskSpec::new(path, realm.parse::<Realm>()?);
            mask.variable = self.mask_variable;
            config.mask = Some(mask);
        }

        config.bounds = self.bounds_check;
        config.persist = if self.embed_provenance {
            PersistMode::Embedded
        } else {
            PersistMode::SiblingText
        };

        Ok(config)
    }
}

/// Change the units of the time axis
#[derive(Parser, Debug)]
#[command(
    name = "change_time_units",
    version,
    about = "Re-encode the time axis of a NetCDF variable in new units"
)]
pub struct TimeUnitsArgs {
    /// Input NetCDF file
    pub infile: PathBuf,

    /// Variable to process
    pub variable: String,

    /// New time units, e.g. "days since 1850-01-01"
    pub new_time_units: String,

    /// Output NetCDF file (may be the input file)
    pub outfile: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the level.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn parse_selector(s: &str) -> std::result::Result<TimeSelector, String> {
    s.parse().map_err(|e: ClimError| e.to_string())
}

fn parse_extend(s: &str) -> std::result::Result<Extend, String> {
    s.parse().map_err(|e: ClimError| e.to_string())
}

fn parse_palette(s: &str) -> std::result::Result<Palette, String> {
    s.parse().map_err(|e: ClimError| e.to_string())
}

fn parse_bounds(s: &str) -> std::result::Result<BoundsPolicy, String> {
    s.parse().map_err(|e: ClimError| e.to_string())
}
