//! Land / ocean masking from a land-area-fraction field
//!
//! A cell belongs to the land realm when its land fraction is strictly above
//! 50 %, and to the ocean realm when strictly below. Cells exactly at the
//! threshold, or with a missing fraction, belong to neither.

use crate::errors::{ClimError, Result};
use crate::field::GriddedField;
use ndarray::{ArrayD, Zip};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Land fraction threshold in percent
pub const LAND_FRACTION_THRESHOLD_PERCENT: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Realm {
    Land,
    Ocean,
}

impl FromStr for Realm {
    type Err = ClimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "land" => Ok(Realm::Land),
            "ocean" => Ok(Realm::Ocean),
            _ => Err(ClimError::InputValidation(format!(
                "unknown realm '{s}' (expected 'land' or 'ocean')"
            ))),
        }
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Realm::Land => "land",
            Realm::Ocean => "ocean",
        })
    }
}

/// Boolean keep-mask for one realm
#[derive(Debug, Clone, PartialEq)]
pub struct RealmMask {
    realm: Realm,
    keep: ArrayD<bool>,
}

impl RealmMask {
    /// Threshold a land-area-fraction field (`%` or dimensionless `1`).
    pub fn from_land_fraction(land_fraction: &GriddedField, realm: Realm) -> Result<Self> {
        let threshold = match land_fraction.units().trim() {
            "%" | "percent" => LAND_FRACTION_THRESHOLD_PERCENT,
            "1" => LAND_FRACTION_THRESHOLD_PERCENT / 100.0,
            other => {
                return Err(ClimError::PreconditionViolation(format!(
                    "land fraction '{}' has units '{other}', expected '%' or '1'",
                    land_fraction.name()
                )))
            }
        };

        let keep = land_fraction.data().mapv(|fraction| match realm {
            Realm::Land => fraction > threshold,
            Realm::Ocean => fraction < threshold,
        });

        Ok(Self { realm, keep })
    }

    #[must_use]
    pub fn realm(&self) -> Realm {
        self.realm
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.keep.shape()
    }

    #[must_use]
    pub fn keep(&self) -> &ArrayD<bool> {
        &self.keep
    }

    /// Set every cell outside the realm to missing.
    ///
    /// The mask must have exactly the field's shape; nothing is broadcast.
    pub fn apply(&self, field: &GriddedField) -> Result<GriddedField> {
        if self.keep.shape() != field.shape() {
            return Err(ClimError::PreconditionViolation(format!(
                "mask shape {:?} does not match shape {:?} of '{}'",
                self.keep.shape(),
                field.shape(),
                field.name()
            )));
        }

        let mut masked = field.data().clone();
        Zip::from(&mut masked)
            .and(&self.keep)
            .for_each(|value, &keep| {
                if !keep {
                    *value = f32::NAN;
                }
            });

        Ok(field
            .with_data(masked)?
            .with_attribute("realm", self.realm.to_string()))
    }
}

/// Restricts fields to one realm using a land fraction field
#[derive(Debug, Clone, Copy)]
pub struct RealmMasker {
    realm: Realm,
}

impl RealmMasker {
    #[must_use]
    pub fn new(realm: Realm) -> Self {
        Self { realm }
    }

    pub fn mask(&self, field: &GriddedField, land_fraction: &GriddedField) -> Result<GriddedField> {
        let mask = RealmMask::from_land_fraction(land_fraction, self.realm)?;
        let masked = mask.apply(field)?;
        info!(
            "Masked '{}' to {}: {} of {} cells retained",
            field.name(),
            self.realm,
            masked.valid_count(),
            field.data().len()
        );
        Ok(masked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(name: &str, values: Vec<f32>, units: &str) -> GriddedField {
        GriddedField::new(
            name,
            vec!["lat".into(), "lon".into()],
            ArrayD::from_shape_vec(vec![2, 2], values).unwrap(),
            units,
        )
        .unwrap()
    }

    #[test]
    fn test_realm_parsing() {
        assert_eq!("Land".parse::<Realm>().unwrap(), Realm::Land);
        assert_eq!("ocean".parse::<Realm>().unwrap(), Realm::Ocean);
        assert!(matches!(
            "ice".parse::<Realm>(),
            Err(ClimError::InputValidation(_))
        ));
    }

    #[test]
    fn test_ocean_mask() {
        let pr = grid("pr", vec![1.0, 2.0, 3.0, 4.0], "mm/day");
        let sftlf = grid("sftlf", vec![80.0, 20.0, 50.0, 0.0], "%");

        let masked = RealmMasker::new(Realm::Ocean).mask(&pr, &sftlf).unwrap();
        assert!(masked.data()[[0, 0]].is_nan());
        assert_eq!(masked.data()[[0, 1]], 2.0);
        assert!(masked.data()[[1, 0]].is_nan());
        assert_eq!(masked.data()[[1, 1]], 4.0);
        assert_eq!(masked.attribute("realm"), Some("ocean"));
    }

    #[test]
    fn test_land_and_ocean_partition() {
        let pr = grid("pr", vec![1.0, 2.0, 3.0, 4.0], "mm/day");
        let sftlf = grid("sftlf", vec![0.9, 0.1, 0.5, f32::NAN], "1");

        let land = RealmMasker::new(Realm::Land).mask(&pr, &sftlf).unwrap();
        let ocean = RealmMasker::new(Realm::Ocean).mask(&pr, &sftlf).unwrap();

        for ((l, o), original) in land
            .data()
            .iter()
            .zip(ocean.data().iter())
            .zip(pr.data().iter())
        {
            // never both
            assert!(l.is_nan() || o.is_nan());
            if !l.is_nan() {
                assert_eq!(l, original);
            }
            if !o.is_nan() {
                assert_eq!(o, original);
            }
        }
        assert_eq!(land.valid_count() + ocean.valid_count(), 2);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let pr = grid("pr", vec![1.0, 2.0, 3.0, 4.0], "mm/day");
        let sftlf = GriddedField::new(
            "sftlf",
            vec!["lat".into(), "lon".into()],
            ArrayD::from_shape_vec(vec![1, 4], vec![80.0, 20.0, 50.0, 0.0]).unwrap(),
            "%",
        )
        .unwrap();

        let before = pr.clone();
        let result = RealmMasker::new(Realm::Land).mask(&pr, &sftlf);
        assert!(matches!(result, Err(ClimError::PreconditionViolation(_))));
        assert_eq!(pr, before);
    }

    #[test]
    fn test_bad_fraction_units() {
        let pr = grid("pr", vec![1.0, 2.0, 3.0, 4.0], "mm/day");
        let sftlf = grid("sftlf", vec![1.0, 2.0, 3.0, 4.0], "km2");
        assert!(RealmMasker::new(Realm::Land).mask(&pr, &sftlf).is_err());
    }
}
