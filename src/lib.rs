//! precip_clim: precipitation climatology maps with chained provenance
//!
//! Reads a gridded precipitation variable from a NetCDF file, averages it over a
//! month, a season or the whole record, converts it to mm/day, optionally keeps
//! only land or ocean cells, draws it as a filled contour map and records how
//! the image was produced.
//!
//! ## Module Organization
//!
//! - [`calendar`]: CF time decoding, months, seasons and time selectors
//! - [`field`]: the labeled gridded field passed between stages
//! - [`temporal`]: climatological means
//! - [`units`]: conversion to mm/day and plausibility checks
//! - [`mask`]: land / ocean masking from a land fraction field
//! - [`render`]: contour map rendering to PNG or SVG
//! - [`provenance`]: chained history logs and all-or-nothing output
//! - [`netcdf_io`]: NetCDF reading and writing
//! - [`pipeline`]: the staged run
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use precip_clim::prelude::*;
//!
//! let selector: TimeSelector = "DJF".parse().unwrap();
//! let config = PipelineConfig::new("pr.nc", selector, "pr-clim_DJF.png", "precip_clim");
//! let report = Pipeline::netcdf().run(&config).unwrap();
//! println!("wrote {:?}", report.written);
//! ```

pub mod calendar;
pub mod cli;
pub mod errors;
pub mod field;
pub mod mask;
pub mod netcdf_io;
pub mod pipeline;
pub mod provenance;
pub mod render;
pub mod temporal;
pub mod units;

mod utils;

pub use errors::*;

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::calendar::{Calendar, Month, Season, TimeAxis, TimeSelector, TimeUnits};
    pub use crate::errors::{ClimError, ErrorKind, Result};
    pub use crate::field::{AttrValue, GriddedField};
    pub use crate::mask::{Realm, RealmMasker};
    pub use crate::netcdf_io::{load_field, FieldSource, NetCDFWriter, NetCdfSource};
    pub use crate::pipeline::{
        MaskSpec, Pipeline, PipelineConfig, PipelineError, RenderOptions, RunReport, Stage,
    };
    pub use crate::provenance::{PersistMode, ProvenanceEntry, ProvenanceLog};
    pub use crate::render::{
        ContourLevels, ContourMapRenderer, Extend, ImageFormat, Palette, RenderSpec, Renderer,
    };
    pub use crate::temporal::TemporalReducer;
    pub use crate::units::{BoundsPolicy, UnitNormalizer};
}
