//! Multiplicative hazard personalization.
//!
//! The fitted model contributes only the *relative* importance of each
//! feature: every coefficient is normalized by the APC-mutation coefficient,
//! the strongest effect in the panel. Absolute effect sizes come from a
//! fixed, literature-derived clinical scale. Each feature's contribution to
//! the log hazard ratio is capped so no single input can dominate, and the
//! final multiplier is clamped to a plausible clinical range.

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;

use crate::patient::PatientFeatures;

/// BMI above this threshold contributes excess risk; at or below it, none.
pub const BMI_REFERENCE: f64 = 25.0;

/// Per-feature cap on the log hazard-ratio contribution.
pub const LOG_CONTRIBUTION_CAP: f64 = 1.0;

/// Cap on the protective log reduction applied for female patients.
pub const FEMALE_PROTECTION_CAP: f64 = 0.3;

/// Final multiplier bounds. Outside [0.01, 5.0] the fitted model is no
/// longer trustworthy, so alpha is clamped silently.
pub const ALPHA_FLOOR: f64 = 0.01;
pub const ALPHA_CEILING: f64 = 5.0;

/// The features the fitted coefficient panel recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Bmi,
    SexIndicator,
    KrasMutation,
    Tp53Mutation,
    ApcMutation,
    MmrDefect,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Bmi,
        Feature::SexIndicator,
        Feature::KrasMutation,
        Feature::Tp53Mutation,
        Feature::ApcMutation,
        Feature::MmrDefect,
    ];

    /// Canonical column name in the fitted coefficient file.
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Bmi => "BMI",
            Feature::SexIndicator => "Sex_bin",
            Feature::KrasMutation => "KRAS_mut",
            Feature::Tp53Mutation => "TP53_mut",
            Feature::ApcMutation => "APC_mut",
            Feature::MmrDefect => "MMR_defect",
        }
    }
}

#[derive(Error, Debug)]
#[error("unrecognized feature name '{0}'")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim() {
            "BMI" => Ok(Feature::Bmi),
            "Sex_bin" => Ok(Feature::SexIndicator),
            "KRAS_mut" => Ok(Feature::KrasMutation),
            "TP53_mut" => Ok(Feature::Tp53Mutation),
            "APC_mut" => Ok(Feature::ApcMutation),
            "MMR_defect" => Ok(Feature::MmrDefect),
            other => Err(UnknownFeature(other.to_string())),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoefficientError {
    #[error("the coefficient panel is missing its APC-mutation reference entry")]
    MissingReference,
    #[error("the APC-mutation reference coefficient must be non-zero")]
    ZeroReference,
}

/// Fitted coefficients, pre-normalized against the APC reference.
///
/// Construction fails without a usable reference entry; afterwards every
/// lookup is infallible-or-absent. A feature missing from the panel simply
/// contributes nothing to alpha, mirroring how the fitted model treats
/// columns it was never trained on.
#[derive(Debug, Clone)]
pub struct CoefficientTable {
    coefficients: HashMap<Feature, f64>,
    weights: HashMap<Feature, f64>,
}

impl CoefficientTable {
    pub fn new(coefficients: HashMap<Feature, f64>) -> Result<Self, CoefficientError> {
        let reference = *coefficients
            .get(&Feature::ApcMutation)
            .ok_or(CoefficientError::MissingReference)?;
        if reference == 0.0 {
            return Err(CoefficientError::ZeroReference);
        }
        let reference_magnitude = reference.abs();
        let weights = coefficients
            .iter()
            .map(|(&feature, &coef)| (feature, coef.abs() / reference_magnitude))
            .collect();
        Ok(Self {
            coefficients,
            weights,
        })
    }

    /// Raw fitted coefficient, if the panel carries this feature.
    #[inline]
    pub fn coefficient(&self, feature: Feature) -> Option<f64> {
        self.coefficients.get(&feature).copied()
    }

    /// Normalized weight |c| / |c_APC|, if the panel carries this feature.
    #[inline]
    pub fn weight(&self, feature: Feature) -> Option<f64> {
        self.weights.get(&feature).copied()
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

/// Literature-derived absolute effect strengths, one per feature.
///
/// These are fixed clinical priors, not fitted quantities, so they are
/// hardcoded rather than loaded.
#[derive(Debug, Clone, Copy)]
pub struct ClinicalScale {
    tp53: f64,
    apc: f64,
    mmr: f64,
    kras: f64,
    bmi: f64,
    sex: f64,
}

impl Default for ClinicalScale {
    fn default() -> Self {
        Self {
            tp53: 0.5, // RR ~ 1.5-2.0
            apc: 1.0,  // RR ~ 10-100
            mmr: 1.0,  // RR ~ 2-8
            kras: 0.3, // RR ~ 1.2-1.5
            bmi: 0.2,  // RR ~ 1.2-1.5 per band above reference
            sex: 0.1,  // RR ~ 1.4 male vs female
        }
    }
}

impl ClinicalScale {
    #[inline]
    pub fn factor(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Bmi => self.bmi,
            Feature::SexIndicator => self.sex,
            Feature::KrasMutation => self.kras,
            Feature::Tp53Mutation => self.tp53,
            Feature::ApcMutation => self.apc,
            Feature::MmrDefect => self.mmr,
        }
    }
}

/// Folds a patient's features into the final hazard multiplier.
#[derive(Debug, Clone, Copy)]
pub struct AlphaComposer<'a> {
    coefficients: &'a CoefficientTable,
    scale: &'a ClinicalScale,
}

impl<'a> AlphaComposer<'a> {
    pub fn new(coefficients: &'a CoefficientTable, scale: &'a ClinicalScale) -> Self {
        Self {
            coefficients,
            scale,
        }
    }

    /// Starting from the calibrated population log-alpha, accumulate each
    /// feature's capped contribution and exponentiate into the clamped
    /// multiplier.
    ///
    /// BMI contributes only above [`BMI_REFERENCE`], proportional to the
    /// excess. The sex indicator is purely protective: female patients get a
    /// capped reduction, male patients are the reference and contribute
    /// nothing. Mutation flags contribute proportionally to their value,
    /// which for validated records is 0 or 1.
    pub fn compose(&self, features: &PatientFeatures, log_alpha_base: f64) -> f64 {
        let mut log_alpha = log_alpha_base;

        for (feature, value) in features.values() {
            let Some(weight) = self.coefficients.weight(feature) else {
                continue;
            };
            let strength = self.scale.factor(feature) * weight;
            match feature {
                Feature::Bmi => {
                    if value > BMI_REFERENCE {
                        log_alpha +=
                            (strength * (value - BMI_REFERENCE)).min(LOG_CONTRIBUTION_CAP);
                    }
                }
                Feature::SexIndicator => {
                    if value == 0.0 {
                        log_alpha -= strength.min(FEMALE_PROTECTION_CAP);
                    }
                }
                _ => {
                    log_alpha += (strength * value).min(LOG_CONTRIBUTION_CAP);
                }
            }
        }

        log_alpha.exp().clamp(ALPHA_FLOOR, ALPHA_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::Sex;
    use approx::assert_relative_eq;

    fn panel() -> CoefficientTable {
        let mut coefficients = HashMap::new();
        coefficients.insert(Feature::ApcMutation, 1.2);
        coefficients.insert(Feature::Tp53Mutation, 0.8);
        coefficients.insert(Feature::KrasMutation, 0.45);
        coefficients.insert(Feature::MmrDefect, 0.9);
        coefficients.insert(Feature::Bmi, 0.3);
        coefficients.insert(Feature::SexIndicator, -0.25);
        CoefficientTable::new(coefficients).unwrap()
    }

    fn features(bmi: f64, sex: Sex) -> PatientFeatures {
        PatientFeatures {
            bmi,
            sex,
            kras: false,
            tp53: false,
            apc: false,
            mmr: false,
        }
    }

    #[test]
    fn reference_weight_is_unity() {
        let panel = panel();
        assert_relative_eq!(
            panel.weight(Feature::ApcMutation).unwrap(),
            1.0,
            epsilon = 1e-15
        );
    }

    #[test]
    fn weights_use_magnitudes() {
        let panel = panel();
        // Negative sex coefficient still yields a positive weight.
        assert_relative_eq!(
            panel.weight(Feature::SexIndicator).unwrap(),
            0.25 / 1.2,
            epsilon = 1e-15
        );
    }

    #[test]
    fn missing_reference_is_rejected() {
        let mut coefficients = HashMap::new();
        coefficients.insert(Feature::Bmi, 0.3);
        assert!(matches!(
            CoefficientTable::new(coefficients),
            Err(CoefficientError::MissingReference)
        ));
    }

    #[test]
    fn zero_reference_is_rejected() {
        let mut coefficients = HashMap::new();
        coefficients.insert(Feature::ApcMutation, 0.0);
        assert!(matches!(
            CoefficientTable::new(coefficients),
            Err(CoefficientError::ZeroReference)
        ));
    }

    #[test]
    fn male_with_reference_bmi_keeps_the_calibrated_base() {
        let panel = panel();
        let scale = ClinicalScale::default();
        let composer = AlphaComposer::new(&panel, &scale);
        let alpha = composer.compose(&features(25.0, Sex::Male), 0.4);
        assert_relative_eq!(alpha, 0.4_f64.exp(), epsilon = 1e-12);
    }

    #[test]
    fn bmi_at_or_below_reference_contributes_nothing() {
        let panel = panel();
        let scale = ClinicalScale::default();
        let composer = AlphaComposer::new(&panel, &scale);
        let at = composer.compose(&features(25.0, Sex::Male), 0.0);
        let below = composer.compose(&features(19.0, Sex::Male), 0.0);
        assert_eq!(at, below);
    }

    #[test]
    fn bmi_excess_contributes_proportionally_until_capped() {
        let panel = panel();
        let scale = ClinicalScale::default();
        let composer = AlphaComposer::new(&panel, &scale);
        let strength: f64 = 0.2 * (0.3 / 1.2);
        let moderate = composer.compose(&features(30.0, Sex::Male), 0.0);
        assert_relative_eq!(moderate, (strength * 5.0).exp(), epsilon = 1e-12);
        // Far above the reference the log contribution saturates at the cap.
        let extreme = composer.compose(&features(80.0, Sex::Male), 0.0);
        assert_relative_eq!(extreme, 1.0_f64.exp(), epsilon = 1e-12);
    }

    #[test]
    fn female_reduction_is_applied_and_capped() {
        let panel = panel();
        let scale = ClinicalScale::default();
        let composer = AlphaComposer::new(&panel, &scale);
        let female = composer.compose(&features(22.0, Sex::Female), 0.0);
        let reduction = (0.1_f64 * (0.25 / 1.2)).min(FEMALE_PROTECTION_CAP);
        assert_relative_eq!(female, (-reduction).exp(), epsilon = 1e-12);
        let male = composer.compose(&features(22.0, Sex::Male), 0.0);
        assert!(female < male);
    }

    #[test]
    fn each_flag_raises_alpha() {
        let panel = panel();
        let scale = ClinicalScale::default();
        let composer = AlphaComposer::new(&panel, &scale);
        let baseline = features(22.0, Sex::Male);
        let without = composer.compose(&baseline, 0.0);
        for flag in [
            Feature::KrasMutation,
            Feature::Tp53Mutation,
            Feature::ApcMutation,
            Feature::MmrDefect,
        ] {
            let mut flagged = baseline;
            match flag {
                Feature::KrasMutation => flagged.kras = true,
                Feature::Tp53Mutation => flagged.tp53 = true,
                Feature::ApcMutation => flagged.apc = true,
                Feature::MmrDefect => flagged.mmr = true,
                _ => unreachable!(),
            }
            let with = composer.compose(&flagged, 0.0);
            assert!(
                with > without,
                "{} flag must raise alpha ({with} <= {without})",
                flag.as_str()
            );
        }
    }

    #[test]
    fn apc_contribution_saturates_at_the_cap() {
        let panel = panel();
        let scale = ClinicalScale::default();
        let composer = AlphaComposer::new(&panel, &scale);
        let mut flagged = features(22.0, Sex::Male);
        flagged.apc = true;
        // scale 1.0 * weight 1.0 hits the per-feature cap exactly.
        let alpha = composer.compose(&flagged, 0.0);
        assert_relative_eq!(alpha, LOG_CONTRIBUTION_CAP.exp(), epsilon = 1e-12);
    }

    #[test]
    fn alpha_is_clamped_to_plausible_range() {
        let panel = panel();
        let scale = ClinicalScale::default();
        let composer = AlphaComposer::new(&panel, &scale);
        let mut loaded = features(70.0, Sex::Male);
        loaded.kras = true;
        loaded.tp53 = true;
        loaded.apc = true;
        loaded.mmr = true;
        assert_eq!(composer.compose(&loaded, 2.0), ALPHA_CEILING);
        assert_eq!(composer.compose(&features(20.0, Sex::Female), -5.0), ALPHA_FLOOR);
    }

    #[test]
    fn features_absent_from_the_panel_are_skipped() {
        let mut coefficients = HashMap::new();
        coefficients.insert(Feature::ApcMutation, 1.2);
        let sparse = CoefficientTable::new(coefficients).unwrap();
        let scale = ClinicalScale::default();
        let composer = AlphaComposer::new(&sparse, &scale);
        let mut flagged = features(40.0, Sex::Female);
        flagged.kras = true;
        flagged.mmr = true;
        // Only APC is known to the panel and its flag is off, so nothing moves.
        let alpha = composer.compose(&flagged, 0.25);
        assert_relative_eq!(alpha, 0.25_f64.exp(), epsilon = 1e-12);
    }

    #[test]
    fn canonical_names_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(feature.as_str().parse::<Feature>().unwrap(), feature);
        }
        assert!("Smoking".parse::<Feature>().is_err());
    }
}
