//! Persisted calibration artifacts.
//!
//! Calibration is deterministic, so the per-stratum scalers can be computed
//! once, written to a human-readable TOML file, and reused by later runs.
//! An engine holding an artifact answers integer-age queries from it and
//! falls back to live bisection for anything else; both paths produce
//! identical numbers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

use crate::calibration::Calibrator;
use crate::incidence::IncidenceError;
use crate::patient::Sex;

/// Current on-disk format version.
pub const CALIBRATION_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read or write calibration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML calibration file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize calibration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error(
        "Calibration file has format version {found}, but this build reads version {CALIBRATION_FORMAT_VERSION}."
    )]
    UnsupportedVersion { found: u32 },
}

/// Calibrated log scalers for one integer age, both sexes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibratedStratum {
    pub age: u32,
    pub female_log_alpha: f64,
    pub male_log_alpha: f64,
}

/// The complete precomputed calibration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationModel {
    pub version: u32,
    /// Strata sorted by age; lookups binary-search this.
    pub strata: Vec<CalibratedStratum>,
}

impl CalibrationModel {
    /// Runs the calibrator over every integer age the incidence table
    /// covers, both sexes per age. Overlapping bands are harmless here: the
    /// calibrator resolves each age through the same first-match lookup the
    /// live path uses.
    pub fn build(calibrator: &Calibrator<'_>) -> Result<Self, IncidenceError> {
        let mut ages = BTreeSet::new();
        for band in calibrator.incidence().bands() {
            for age in band.start..=band.end {
                ages.insert(age);
            }
        }
        let mut strata = Vec::with_capacity(ages.len());
        for age in ages {
            let at = f64::from(age);
            strata.push(CalibratedStratum {
                age,
                female_log_alpha: calibrator.calibrate_log_alpha(at, Sex::Female)?,
                male_log_alpha: calibrator.calibrate_log_alpha(at, Sex::Male)?,
            });
        }
        Ok(Self {
            version: CALIBRATION_FORMAT_VERSION,
            strata,
        })
    }

    /// Precomputed log scaler for an exact integer age, if present.
    /// Fractional ages always miss so the caller can calibrate live.
    pub fn log_alpha(&self, age: f64, sex: Sex) -> Option<f64> {
        if !age.is_finite() || age < 0.0 || age.fract() != 0.0 || age > f64::from(u32::MAX) {
            return None;
        }
        let key = age as u32;
        self.strata
            .binary_search_by_key(&key, |stratum| stratum.age)
            .ok()
            .map(|index| match sex {
                Sex::Female => self.strata[index].female_log_alpha,
                Sex::Male => self.strata[index].male_log_alpha,
            })
    }

    /// Saves the calibration surface to a TOML file.
    pub fn save(&self, path: &str) -> Result<(), ArtifactError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads a calibration surface, rejecting files written by an
    /// incompatible build.
    pub fn load(path: &str) -> Result<Self, ArtifactError> {
        let toml_string = fs::read_to_string(path)?;
        let model: Self = toml::from_str(&toml_string)?;
        if model.version != CALIBRATION_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: model.version,
            });
        }
        Ok(model)
    }
}
