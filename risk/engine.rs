//! Per-patient risk assembly.
//!
//! The engine is the crate's main entry point: it validates the record,
//! resolves the calibrated population scaler for the patient's (age, sex)
//! stratum, personalizes it through the alpha composer, and derives the
//! conditional and lifetime risks. Every step is deterministic and the
//! engine is immutable after construction, so batch scoring shards freely
//! across threads.

use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::alpha::{AlphaComposer, ClinicalScale, CoefficientTable};
use crate::artifact::CalibrationModel;
use crate::calibration::Calibrator;
use crate::hazard::HazardModel;
use crate::incidence::{IncidenceError, IncidenceTable};
use crate::patient::{PatientRecord, Sex};

/// Lifetime risk is evaluated at this reference age.
pub const LIFETIME_REFERENCE_AGE: f64 = 80.0;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("patient age must be a positive, finite number of years (got {0})")]
    InvalidAge(f64),
    #[error("patient BMI must be a positive, finite value (got {0})")]
    InvalidBmi(f64),
    #[error("incidence lookup failed: {0}")]
    Incidence(#[from] IncidenceError),
}

/// Trend-adjusted lifetime risk of the general population, used only as the
/// denominator of the relative comparison.
#[inline]
pub fn population_lifetime_risk(sex: Sex) -> f64 {
    match sex {
        Sex::Male => 0.043,
        Sex::Female => 0.040,
    }
}

/// Relative-risk band, resolved lowest-first so boundary values land in the
/// higher band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    BelowAverage,
    Average,
    ModeratelyElevated,
    VeryHigh,
}

impl RiskCategory {
    pub fn from_relative_risk(relative_risk: f64) -> Self {
        if relative_risk < 1.0 {
            RiskCategory::BelowAverage
        } else if relative_risk < 2.0 {
            RiskCategory::Average
        } else if relative_risk < 4.0 {
            RiskCategory::ModeratelyElevated
        } else {
            RiskCategory::VeryHigh
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RiskCategory::BelowAverage => "Below average population risk",
            RiskCategory::Average => "Average population risk",
            RiskCategory::ModeratelyElevated => "Moderately elevated risk",
            RiskCategory::VeryHigh => "Very high risk",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Full-precision prediction for one patient.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RiskPrediction {
    /// Final hazard multiplier after personalization and clamping.
    pub alpha: f64,
    /// Probability of initiation within 5 years, given none so far.
    pub risk_5yr: f64,
    /// Probability of initiation within 10 years, given none so far.
    pub risk_10yr: f64,
    /// Unconditional cumulative risk at the lifetime reference age.
    pub lifetime_risk: f64,
    /// Lifetime risk relative to the population baseline for this sex.
    pub relative_risk: f64,
    pub category: RiskCategory,
}

impl RiskPrediction {
    /// The rounded wire form. Lifetime risk is deliberately absent: the
    /// reporting surface never exposed it, only the relative category rests
    /// on it.
    pub fn payload(&self) -> PredictionPayload {
        PredictionPayload {
            risk_5yr_percent: round_to(self.risk_5yr * 100.0, 2),
            risk_10yr_percent: round_to(self.risk_10yr * 100.0, 2),
            alpha: round_to(self.alpha, 3),
        }
    }
}

/// Presentation form of a prediction: percentages at 2 decimals, alpha at 3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionPayload {
    pub risk_5yr_percent: f64,
    pub risk_10yr_percent: f64,
    pub alpha: f64,
}

#[inline]
fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Immutable prediction engine.
pub struct RiskEngine {
    hazard: HazardModel,
    incidence: IncidenceTable,
    coefficients: CoefficientTable,
    scale: ClinicalScale,
    calibration: Option<CalibrationModel>,
}

impl RiskEngine {
    pub fn new(
        hazard: HazardModel,
        incidence: IncidenceTable,
        coefficients: CoefficientTable,
        scale: ClinicalScale,
    ) -> Self {
        Self {
            hazard,
            incidence,
            coefficients,
            scale,
            calibration: None,
        }
    }

    /// Attaches a precomputed calibration surface. Ages it covers are
    /// answered from it; everything else falls back to live bisection.
    pub fn with_calibration(mut self, calibration: CalibrationModel) -> Self {
        self.calibration = Some(calibration);
        self
    }

    #[inline]
    pub fn hazard(&self) -> &HazardModel {
        &self.hazard
    }

    #[inline]
    pub fn incidence(&self) -> &IncidenceTable {
        &self.incidence
    }

    fn log_alpha_base(&self, age: f64, sex: Sex) -> Result<f64, EngineError> {
        if let Some(model) = &self.calibration {
            if let Some(log_alpha) = model.log_alpha(age, sex) {
                return Ok(log_alpha);
            }
        }
        let calibrator = Calibrator::new(&self.hazard, &self.incidence);
        Ok(calibrator.calibrate_log_alpha(age, sex)?)
    }

    /// Scores one patient.
    ///
    /// The record's age drives both calibration (which can fail on table
    /// coverage) and the risk windows; BMI and the flags only move alpha.
    pub fn predict(&self, record: &PatientRecord) -> Result<RiskPrediction, EngineError> {
        if !record.age.is_finite() || record.age <= 0.0 {
            return Err(EngineError::InvalidAge(record.age));
        }
        if !record.bmi.is_finite() || record.bmi <= 0.0 {
            return Err(EngineError::InvalidBmi(record.bmi));
        }

        let log_alpha_base = self.log_alpha_base(record.age, record.sex)?;
        let composer = AlphaComposer::new(&self.coefficients, &self.scale);
        let alpha = composer.compose(&record.features(), log_alpha_base);

        let risk_5yr = self
            .hazard
            .conditional_risk(record.age, record.age + 5.0, alpha);
        let risk_10yr = self
            .hazard
            .conditional_risk(record.age, record.age + 10.0, alpha);
        let lifetime_risk = self.hazard.personalized_risk(LIFETIME_REFERENCE_AGE, alpha);
        let relative_risk = lifetime_risk / population_lifetime_risk(record.sex);

        Ok(RiskPrediction {
            alpha,
            risk_5yr,
            risk_10yr,
            lifetime_risk,
            relative_risk,
            category: RiskCategory::from_relative_risk(relative_risk),
        })
    }

    /// Scores a batch in parallel. Record order is preserved; the first
    /// failing record aborts the batch.
    pub fn predict_batch(
        &self,
        records: &[PatientRecord],
    ) -> Result<Vec<RiskPrediction>, EngineError> {
        records
            .par_iter()
            .map(|record| self.predict(record))
            .collect()
    }
}
