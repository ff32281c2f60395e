//! Unit normalization for precipitation fields
//!
//! Model output stores precipitation as a mass flux (`kg m-2 s-1`); maps are
//! drawn in daily accumulation (`mm/day`). Every recognised unit string maps to
//! exactly one action, and anything else is rejected rather than guessed.

use crate::errors::{ClimError, Result};
use crate::field::GriddedField;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Seconds per day: 1 kg m-2 s-1 of water is 86400 mm/day
pub const SECONDS_PER_DAY: f32 = 86_400.0;

/// Unit string written on normalized fields
pub const DAILY_ACCUMULATION_UNITS: &str = "mm/day";

/// Upper sanity bound for a daily precipitation climatology, in mm/day
pub const MAX_PLAUSIBLE_PRECIPITATION: f32 = 2_000.0;

/// What a recognised unit string means for the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Mass per area per second
    FluxRate,
    /// Depth per day
    DailyAccumulation,
}

const RECOGNISED_UNITS: [(&str, UnitKind); 7] = [
    ("kg m-2 s-1", UnitKind::FluxRate),
    ("kg m^-2 s^-1", UnitKind::FluxRate),
    ("kg/m2/s", UnitKind::FluxRate),
    ("kg m-2 s**-1", UnitKind::FluxRate),
    ("mm/day", UnitKind::DailyAccumulation),
    ("mm day-1", UnitKind::DailyAccumulation),
    ("mm d-1", UnitKind::DailyAccumulation),
];

impl UnitKind {
    /// Look up a unit string in the table of recognised units.
    pub fn classify(units: &str) -> Result<Self> {
        let normalized = units.split_whitespace().collect::<Vec<_>>().join(" ");
        RECOGNISED_UNITS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&normalized))
            .map(|&(_, kind)| kind)
            .ok_or_else(|| {
                ClimError::PreconditionViolation(format!(
                    "unrecognised precipitation units '{units}' (expected kg m-2 s-1 or mm/day)"
                ))
            })
    }
}

/// How to react when normalized values fall outside the plausible range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundsPolicy {
    /// Fail with a data quality error
    #[default]
    Strict,
    /// Log a warning and continue
    Warn,
    /// Skip the check
    Off,
}

impl FromStr for BoundsPolicy {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "warn" => Ok(Self::Warn),
            "off" => Ok(Self::Off),
            other => Err(ClimError::InputValidation(format!(
                "unknown bounds policy '{other}' (expected strict, warn or off)"
            ))),
        }
    }
}

/// Converts precipitation fields to mm/day and checks the result is plausible
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitNormalizer {
    bounds: BoundsPolicy,
}

impl UnitNormalizer {
    #[must_use]
    pub fn new(bounds: BoundsPolicy) -> Self {
        Self { bounds }
    }

    /// Return a field in mm/day.
    ///
    /// Flux rates are multiplied by 86400; fields already in mm/day are returned
    /// with identical data.
    pub fn normalize(&self, field: &GriddedField) -> Result<GriddedField> {
        let normalized = match UnitKind::classify(field.units())? {
            UnitKind::FluxRate => {
                info!(
                    "Converting '{}' from {} to {}",
                    field.name(),
                    field.units(),
                    DAILY_ACCUMULATION_UNITS
                );
                field
                    .with_data(field.data().mapv(|v| v * SECONDS_PER_DAY))?
                    .relabel_units(DAILY_ACCUMULATION_UNITS)
            }
            UnitKind::DailyAccumulation => {
                debug!("'{}' is already in {}", field.name(), field.units());
                field
                    .with_data(field.data().clone())?
                    .relabel_units(DAILY_ACCUMULATION_UNITS)
            }
        };

        self.check_bounds(&normalized)?;
        Ok(normalized)
    }

    /// Verify every valid cell lies in `[0, MAX_PLAUSIBLE_PRECIPITATION)`.
    pub fn check_bounds(&self, field: &GriddedField) -> Result<()> {
        if self.bounds == BoundsPolicy::Off {
            return Ok(());
        }

        let offending: Vec<f32> = field
            .data()
            .iter()
            .copied()
            .filter(|v| !v.is_nan() && (*v < 0.0 || *v >= MAX_PLAUSIBLE_PRECIPITATION))
            .collect();

        if offending.is_empty() {
            return Ok(());
        }

        let min = offending.iter().copied().fold(f32::INFINITY, f32::min);
        let max = offending.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let message = format!(
            "{} value(s) of '{}' outside [0, {MAX_PLAUSIBLE_PRECIPITATION}) {} (min {min}, max {max})",
            offending.len(),
            field.name(),
            field.units()
        );

        match self.bounds {
            BoundsPolicy::Strict => Err(ClimError::DataQuality(message)),
            BoundsPolicy::Warn => {
                warn!("{message}");
                Ok(())
            }
            BoundsPolicy::Off => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn field(values: Vec<f32>, units: &str) -> GriddedField {
        let n = values.len();
        GriddedField::new(
            "pr",
            vec!["lon".into()],
            ArrayD::from_shape_vec(vec![n], values).unwrap(),
            units,
        )
        .unwrap()
    }

    #[test]
    fn test_classify_units() {
        assert_eq!(UnitKind::classify("kg m-2 s-1").unwrap(), UnitKind::FluxRate);
        assert_eq!(UnitKind::classify("  kg  m-2 s-1 ").unwrap(), UnitKind::FluxRate);
        assert_eq!(UnitKind::classify("MM/DAY").unwrap(), UnitKind::DailyAccumulation);
        assert!(matches!(
            UnitKind::classify("K"),
            Err(ClimError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn test_flux_rate_is_scaled() {
        let input = field(vec![1.0e-5, 2.5e-5, f32::NAN], "kg m-2 s-1");
        let output = UnitNormalizer::default().normalize(&input).unwrap();

        assert_eq!(output.units(), DAILY_ACCUMULATION_UNITS);
        assert_eq!(output.data()[[0]], 1.0e-5 * SECONDS_PER_DAY);
        assert_eq!(output.data()[[1]], 2.5e-5 * SECONDS_PER_DAY);
        assert!(output.data()[[2]].is_nan());
        // the input keeps its own units
        assert_eq!(input.units(), "kg m-2 s-1");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = UnitNormalizer::default();
        let once = normalizer
            .normalize(&field(vec![3.0e-5], "kg m-2 s-1"))
            .unwrap();
        let twice = normalizer.normalize(&once).unwrap();
        assert_eq!(once.data(), twice.data());
        assert_eq!(twice.units(), DAILY_ACCUMULATION_UNITS);
    }

    #[test]
    fn test_daily_input_is_unchanged() {
        let input = field(vec![0.0, 4.2, 13.5], "mm day-1");
        let output = UnitNormalizer::default().normalize(&input).unwrap();
        assert_eq!(output.data(), input.data());
        assert_eq!(output.units(), DAILY_ACCUMULATION_UNITS);
    }

    #[test]
    fn test_bounds_policies() {
        let negative = field(vec![-1.0, 2.0], "mm/day");
        let result = UnitNormalizer::new(BoundsPolicy::Strict).normalize(&negative);
        assert!(matches!(result, Err(ClimError::DataQuality(_))));

        let too_wet = field(vec![0.05], "kg m-2 s-1"); // 4320 mm/day
        assert!(UnitNormalizer::new(BoundsPolicy::Strict)
            .normalize(&too_wet)
            .is_err());
        assert!(UnitNormalizer::new(BoundsPolicy::Warn)
            .normalize(&too_wet)
            .is_ok());
        assert!(UnitNormalizer::new(BoundsPolicy::Off)
            .normalize(&negative)
            .is_ok());
    }

    #[test]
    fn test_unknown_units_rejected() {
        let input = field(vec![1.0], "inches");
        assert!(matches!(
            UnitNormalizer::default().normalize(&input),
            Err(ClimError::PreconditionViolation(_))
        ));
    }
}
