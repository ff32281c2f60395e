//! Centralized error handling for precip_clim
//!
//! Every failure in the climatology pipeline is fatal. Errors are grouped into
//! four categories ([`ErrorKind`]) so callers can tell a bad argument from a bad
//! input file or a failed physical-plausibility check.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for precip_clim operations
#[derive(Error, Debug)]
pub enum ClimError {
    /// Bad selector, realm token, output format or contour levels
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// No time step matched the requested selector
    #[error("Empty selection: no time steps match '{selector}'")]
    EmptySelection { selector: String },

    /// Shape, unit or attribute requirements of a field are not met
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    /// Required attribute missing from a field
    #[error("Required attribute '{attribute}' missing from '{field}'")]
    MissingAttribute { field: String, attribute: String },

    /// Variable not found in a NetCDF file
    #[error("Variable '{var}' not found in {}", path.display())]
    VariableNotFound { var: String, path: PathBuf },

    /// Dimension not found in a field
    #[error("Dimension '{dim}' not found in variable '{var}'")]
    DimensionNotFound { var: String, dim: String },

    /// Values outside the physically plausible range
    #[error("Data quality check failed: {0}")]
    DataQuality(String),

    /// File could not be read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// NetCDF library errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Drawing backend failure
    #[error("Render error: {0}")]
    Render(String),

    /// PNG encoder failure
    #[error("PNG encoding error: {0}")]
    Png(#[from] png::EncodingError),
}

/// Error taxonomy used to report what class of problem stopped a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputValidation,
    PreconditionViolation,
    DataQuality,
    Io,
}

impl ClimError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ClimError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Classify this error into the four reported categories.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClimError::InputValidation(_) | ClimError::EmptySelection { .. } => {
                ErrorKind::InputValidation
            }
            ClimError::PreconditionViolation(_)
            | ClimError::MissingAttribute { .. }
            | ClimError::VariableNotFound { .. }
            | ClimError::DimensionNotFound { .. }
            | ClimError::Array(_) => ErrorKind::PreconditionViolation,
            ClimError::DataQuality(_) => ErrorKind::DataQuality,
            ClimError::Io { .. } | ClimError::NetCDF(_) | ClimError::Render(_) | ClimError::Png(_) => {
                ErrorKind::Io
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InputValidation => "input validation error",
            ErrorKind::PreconditionViolation => "precondition violation",
            ErrorKind::DataQuality => "data quality error",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(name)
    }
}

/// Result type alias for precip_clim operations
pub type Result<T> = std::result::Result<T, ClimError>;
