use std::fmt;

use crate::alpha::Feature;

/// Patient sex, parsed leniently at the boundary: anything that is not
/// "male" (case-insensitive) is treated as female, matching the binary
/// encoding the coefficient model was fitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("male") {
            Sex::Male
        } else {
            Sex::Female
        }
    }

    /// Binary encoding used by the fitted model: female 0, male 1.
    #[inline]
    pub fn indicator(self) -> f64 {
        match self {
            Sex::Female => 0.0,
            Sex::Male => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Sex::Female => "female",
            Sex::Male => "male",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One patient as received at the boundary. Flags are already validated to
/// be binary by the loaders and the CLI.
#[derive(Debug, Clone, Copy)]
pub struct PatientRecord {
    pub age: f64,
    pub bmi: f64,
    pub sex: Sex,
    pub kras: bool,
    pub apc: bool,
    pub tp53: bool,
    pub mmr: bool,
}

impl PatientRecord {
    /// The alpha-relevant feature set for this patient. Age is deliberately
    /// absent: it enters through calibration, not through the composer.
    pub fn features(&self) -> PatientFeatures {
        PatientFeatures {
            bmi: self.bmi,
            sex: self.sex,
            kras: self.kras,
            tp53: self.tp53,
            apc: self.apc,
            mmr: self.mmr,
        }
    }
}

/// Value object consumed by the alpha composer.
#[derive(Debug, Clone, Copy)]
pub struct PatientFeatures {
    pub bmi: f64,
    pub sex: Sex,
    pub kras: bool,
    pub tp53: bool,
    pub apc: bool,
    pub mmr: bool,
}

impl PatientFeatures {
    /// Feature/value pairs in the order the composer folds them.
    pub fn values(&self) -> [(Feature, f64); 6] {
        [
            (Feature::Bmi, self.bmi),
            (Feature::SexIndicator, self.sex.indicator()),
            (Feature::KrasMutation, flag_value(self.kras)),
            (Feature::Tp53Mutation, flag_value(self.tp53)),
            (Feature::ApcMutation, flag_value(self.apc)),
            (Feature::MmrDefect, flag_value(self.mmr)),
        ]
    }
}

#[inline]
fn flag_value(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}
