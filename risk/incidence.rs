//! Observed incidence reference table, banded by age and split by sex.

use thiserror::Error;

use crate::patient::Sex;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IncidenceError {
    #[error("age {age} is not covered by any band of the incidence table")]
    AgeNotCovered { age: f64 },
}

/// One age band with annual incidence rates per 100,000 person-years.
/// Bounds are inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeBand {
    pub start: u32,
    pub end: u32,
    pub male_rate: f64,
    pub female_rate: f64,
}

impl AgeBand {
    #[inline]
    pub fn contains(&self, age: f64) -> bool {
        f64::from(self.start) <= age && age <= f64::from(self.end)
    }

    #[inline]
    pub fn rate(&self, sex: Sex) -> f64 {
        match sex {
            Sex::Male => self.male_rate,
            Sex::Female => self.female_rate,
        }
    }
}

/// Registry-derived incidence table.
///
/// Bands are scanned in declared order and the first band containing the
/// queried age wins, so overlapping bands resolve deterministically. Ages
/// that fall in a gap between bands (including fractional ages between two
/// integer-bounded bands) are a coverage error, never a silent default.
#[derive(Debug, Clone)]
pub struct IncidenceTable {
    bands: Vec<AgeBand>,
}

impl IncidenceTable {
    pub fn new(bands: Vec<AgeBand>) -> Self {
        Self { bands }
    }

    #[inline]
    pub fn bands(&self) -> &[AgeBand] {
        &self.bands
    }

    /// Annual incidence per 100,000 for the band covering `age`.
    pub fn lookup(&self, age: f64, sex: Sex) -> Result<f64, IncidenceError> {
        self.bands
            .iter()
            .find(|band| band.contains(age))
            .map(|band| band.rate(sex))
            .ok_or(IncidenceError::AgeNotCovered { age })
    }
}
