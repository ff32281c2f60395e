//! Climatology pipeline orchestration
//!
//! A run moves through a fixed sequence of stages:
//!
//! ```text
//! Loaded -> Reduced -> UnitNormalized -> [Masked] -> Rendered -> Logged
//! ```
//!
//! Each stage produces a new versioned [`GriddedField`]; the rendered image is
//! held in memory and only the Logged stage touches the filesystem, so a run
//! that fails anywhere leaves neither an image nor a log behind.

use crate::calendar::{TimeSelector, TimeUnits};
use crate::errors::{ClimError, Result};
use crate::field::GriddedField;
use crate::mask::{Realm, RealmMasker};
use crate::netcdf_io::{load_field, FieldSource, NetCDFWriter, NetCdfSource};
use crate::provenance::{code_revision, persist, PersistMode, ProvenanceEntry, ProvenanceLog};
use crate::render::{
    ContourLevels, ContourMapRenderer, Extend, ImageFormat, Palette, RenderSpec, Renderer,
    DEFAULT_DPI, DEFAULT_FIGSIZE,
};
use crate::temporal::TemporalReducer;
use crate::units::{BoundsPolicy, UnitNormalizer};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Default precipitation variable name
pub const DEFAULT_VARIABLE: &str = "pr";

/// Default land-area-fraction variable name
pub const DEFAULT_MASK_VARIABLE: &str = "sftlf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    Reduced,
    UnitNormalized,
    Masked,
    Rendered,
    Logged,
}

impl Stage {
    /// Stages that may directly follow this one.
    fn successors(self) -> &'static [Stage] {
        match self {
            Stage::Loaded => &[Stage::Reduced],
            Stage::Reduced => &[Stage::UnitNormalized],
            Stage::UnitNormalized => &[Stage::Masked, Stage::Rendered],
            Stage::Masked => &[Stage::Rendered],
            Stage::Rendered => &[Stage::Logged],
            Stage::Logged => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Loaded => "load",
            Stage::Reduced => "reduce",
            Stage::UnitNormalized => "unit normalization",
            Stage::Masked => "mask",
            Stage::Rendered => "render",
            Stage::Logged => "log",
        })
    }
}

/// One-way record of completed stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTracker {
    completed: Vec<Stage>,
}

impl StageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<Stage> {
        self.completed.last().copied()
    }

    #[must_use]
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    /// Whether `next` may run now.
    #[must_use]
    pub fn allows(&self, next: Stage) -> bool {
        match self.current() {
            None => next == Stage::Loaded,
            Some(stage) => stage.successors().contains(&next),
        }
    }

    /// Mark `next` as completed.
    pub fn advance(&mut self, next: Stage) -> Result<()> {
        if !self.allows(next) {
            return Err(ClimError::PreconditionViolation(format!(
                "stage '{next}' cannot follow {}",
                self.current()
                    .map_or_else(|| "the start of the run".to_string(), |s| format!("'{s}'"))
            )));
        }
        self.completed.push(next);
        Ok(())
    }
}

/// A failed run: the stage being attempted and why it failed
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ClimError,
}

impl PipelineError {
    #[must_use]
    pub fn new(stage: Stage, source: ClimError) -> Self {
        Self { stage, source }
    }
}

/// Optional realm restriction
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSpec {
    pub path: PathBuf,
    pub realm: Realm,
    pub variable: String,
}

impl MaskSpec {
    pub fn new(path: impl Into<PathBuf>, realm: Realm) -> Self {
        Self {
            path: path.into(),
            realm,
            variable: DEFAULT_MASK_VARIABLE.to_string(),
        }
    }
}

/// Map appearance independent of the data
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub levels: ContourLevels,
    pub extend: Extend,
    pub palette: Palette,
    pub gridlines: bool,
    pub dpi: u32,
    pub figsize: (f64, f64),
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            levels: ContourLevels::default(),
            extend: Extend::default(),
            palette: Palette::default(),
            gridlines: false,
            dpi: DEFAULT_DPI,
            figsize: DEFAULT_FIGSIZE,
        }
    }
}

/// Inputs of one run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub variable: String,
    pub selector: TimeSelector,
    pub output: PathBuf,
    pub mask: Option<MaskSpec>,
    pub render: RenderOptions,
    pub bounds: BoundsPolicy,
    pub persist: PersistMode,
    /// Command line recorded in the provenance entry
    pub command_line: String,
    /// Code revision to record instead of the one captured at build time
    pub revision: Option<String>,
}

impl PipelineConfig {
    pub fn new(
        input: impl Into<PathBuf>,
        selector: TimeSelector,
        output: impl Into<PathBuf>,
        command_line: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            variable: DEFAULT_VARIABLE.to_string(),
            selector,
            output: output.into(),
            mask: None,
            render: RenderOptions::default(),
            bounds: BoundsPolicy::default(),
            persist: PersistMode::default(),
            command_line: command_line.into(),
            revision: None,
        }
    }

    /// Output image format, inferred from the output extension.
    pub fn output_format(&self) -> Result<ImageFormat> {
        ImageFormat::from_path(&self.output)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stages: Vec<Stage>,
    /// Final field as drawn
    pub field: GriddedField,
    pub log: ProvenanceLog,
    pub written: Vec<PathBuf>,
}

/// Load, reduce, normalize, mask, render and log one climatology
pub struct Pipeline<S, R> {
    source: S,
    renderer: R,
}

impl Pipeline<NetCdfSource, ContourMapRenderer> {
    /// Pipeline reading NetCDF and drawing with [`ContourMapRenderer`].
    #[must_use]
    pub fn netcdf() -> Self {
        Self::new(NetCdfSource, ContourMapRenderer)
    }
}

impl<S: FieldSource, R: Renderer> Pipeline<S, R> {
    pub fn new(source: S, renderer: R) -> Self {
        Self { source, renderer }
    }

    pub fn run(&self, config: &PipelineConfig) -> std::result::Result<RunReport, PipelineError> {
        let mut tracker = StageTracker::new();

        let (field, history, model, format) = run_stage(&mut tracker, Stage::Loaded, || {
            let format = config.output_format()?;
            let field = self.source.load(&config.input, &config.variable)?;
            let history = field.history()?.to_string();
            let model = field.source_id()?.to_string();
            Ok((field, history, model, format))
        })?;

        let reduced = run_stage(&mut tracker, Stage::Reduced, || {
            TemporalReducer::new().climatology(&field, config.selector)
        })?;
        drop(field);

        let mut current = run_stage(&mut tracker, Stage::UnitNormalized, || {
            UnitNormalizer::new(config.bounds).normalize(&reduced)
        })?;

        let mut mask_history = None;
        if let Some(mask) = &config.mask {
            let (masked, land_history) = run_stage(&mut tracker, Stage::Masked, || {
                let land_fraction = self.source.load(&mask.path, &mask.variable)?;
                let land_history = land_fraction.history().ok().map(str::to_string);
                let masked = RealmMasker::new(mask.realm).mask(&current, &land_fraction)?;
                Ok((masked, land_history))
            })?;
            current = masked;
            mask_history = land_history.map(|h| (mask.path.clone(), h));
        }

        let image = run_stage(&mut tracker, Stage::Rendered, || {
            let spec = RenderSpec {
                levels: config.render.levels.clone(),
                extend: config.render.extend,
                palette: config.render.palette,
                gridlines: config.render.gridlines,
                dpi: config.render.dpi,
                figsize: config.render.figsize,
                title: format!(
                    "{model} precipitation climatology ({})",
                    config.selector.label()
                ),
                colorbar_label: current.units().to_string(),
            };
            self.renderer.render(&current, &spec, format)
        })?;

        let (log, written) = run_stage(&mut tracker, Stage::Logged, || {
            let revision = config.revision.clone().unwrap_or_else(code_revision);

            let mut entry = ProvenanceEntry::new(config.command_line.as_str(), revision)
                .with_input(&config.input, history.as_str());
            if let Some((path, history)) = &mask_history {
                entry = entry.with_input(path, history.as_str());
            }

            let mut log = ProvenanceLog::new();
            log.record(entry);
            let written = persist(&log, &image, &config.output, config.persist)?;
            Ok((log, written))
        })?;

        Ok(RunReport {
            stages: tracker.completed().to_vec(),
            field: current,
            log,
            written,
        })
    }
}

/// Rewrite the time axis of `variable` in `new_units` and chain provenance.
///
/// The variable is fully read before the output is staged, so `outfile` may be
/// `infile`. The output's `history` attribute holds the new log, with the input
/// history chained when the input has one.
pub fn change_time_units(
    infile: &Path,
    variable: &str,
    new_units: &str,
    outfile: &Path,
    command_line: &str,
    revision: Option<String>,
) -> Result<GriddedField> {
    let units: TimeUnits = new_units.parse()?;
    let field = load_field(infile, variable)?;
    let axis = field.time_axis().ok_or_else(|| {
        ClimError::PreconditionViolation(format!(
            "'{variable}' in {} has no time coordinate",
            infile.display()
        ))
    })?;
    let converted = axis.convert_units(units)?;
    info!("Re-encoding time of '{variable}': {} -> {units}", axis.units());

    let revision = revision.unwrap_or_else(code_revision);
    let mut entry = ProvenanceEntry::new(command_line, revision);
    match field.history() {
        Ok(history) => entry = entry.with_input(infile, history),
        Err(_) => debug!("{} has no history to chain", infile.display()),
    }
    let mut log = ProvenanceLog::new();
    log.record(entry);

    let output = field
        .with_data(field.data().clone())?
        .with_time_axis(converted)?
        .with_global_attribute("history", log.text());
    NetCDFWriter::new().write_field(&output, outfile)?;
    Ok(output)
}

fn run_stage<T>(
    tracker: &mut StageTracker,
    stage: Stage,
    work: impl FnOnce() -> Result<T>,
) -> std::result::Result<T, PipelineError> {
    if !tracker.allows(stage) {
        return Err(PipelineError::new(
            stage,
            ClimError::PreconditionViolation(format!("stage '{stage}' attempted out of order")),
        ));
    }
    debug!("Entering {stage} stage");
    let output = work().map_err(|source| PipelineError::new(stage, source))?;
    tracker
        .advance(stage)
        .map_err(|source| PipelineError::new(stage, source))?;
    info!("Completed {stage} stage");
    Ok(output)
}
