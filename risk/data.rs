//! # Reference Table and Cohort Loading
//!
//! Exclusive entry point for user-provided files. Three inputs exist: the
//! fitted coefficient panel (CSV, positional: name column then value
//! column), the registry incidence table (CSV with `Age_Group`,
//! `Male_Rate`, `Female_Rate`), and patient cohorts (TSV with one row per
//! patient). Everything is validated here so the numeric core never sees a
//! malformed value.
//!
//! - Strict schemas: incidence and cohort column names are not
//!   configurable. The coefficient panel is positional because upstream
//!   exports write an unnamed index column.
//! - User-centric errors: failures are assumed to be input mistakes, and
//!   [`TableError`] spells out which column and row to fix.

use ndarray::Array1;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

use crate::alpha::{CoefficientError, CoefficientTable, Feature};
use crate::incidence::{AgeBand, IncidenceTable};
use crate::patient::{PatientRecord, Sex};

const AGE_GROUP_COLUMN: &str = "Age_Group";
const MALE_RATE_COLUMN: &str = "Male_Rate";
const FEMALE_RATE_COLUMN: &str = "Female_Rate";

const COHORT_REQUIRED_COLUMNS: [&str; 7] = ["age", "bmi", "sex", "kras", "apc", "tp53", "mmr"];

/// A comprehensive error type for all table loading and validation failures.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be read as {expected_type}. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. Complete data is required."
    )]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in the required column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("The file '{0}' contains a header but no data rows.")]
    EmptyTable(String),
    #[error(
        "The coefficient file needs a feature-name column followed by a value column, but only {found} column(s) were found."
    )]
    TooFewColumns { found: usize },
    #[error(
        "The age band label '{label}' is not of the form 'start-end' with integer bounds."
    )]
    MalformedBandLabel { label: String },
    #[error("The age band '{label}' is inverted: its start exceeds its end.")]
    InvertedBand { label: String },
    #[error("Rate {value} at row {row} of column '{column}' is negative; rates are per 100,000 person-years and cannot be below zero.")]
    NegativeRate {
        column: String,
        row: usize,
        value: f64,
    },
    #[error("Flag column '{column}' must contain only 0 or 1, but row {row} holds {value}.")]
    InvalidFlagValue {
        column: String,
        row: usize,
        value: f64,
    },
    #[error("The coefficient panel was rejected: {0}")]
    Coefficient(#[from] CoefficientError),
}

/// A validated patient cohort in columnar form.
#[derive(Debug)]
pub struct CohortData {
    /// From an optional `sample_id` column; sequential 1-based IDs otherwise.
    pub sample_ids: Vec<String>,
    pub age: Array1<f64>,
    pub bmi: Array1<f64>,
    pub sex: Vec<Sex>,
    pub kras: Vec<bool>,
    pub apc: Vec<bool>,
    pub tp53: Vec<bool>,
    pub mmr: Vec<bool>,
}

impl CohortData {
    pub fn len(&self) -> usize {
        self.age.len()
    }

    pub fn is_empty(&self) -> bool {
        self.age.is_empty()
    }

    pub fn record(&self, index: usize) -> PatientRecord {
        PatientRecord {
            age: self.age[index],
            bmi: self.bmi[index],
            sex: self.sex[index],
            kras: self.kras[index],
            apc: self.apc[index],
            tp53: self.tp53[index],
            mmr: self.mmr[index],
        }
    }

    pub fn records(&self) -> Vec<PatientRecord> {
        (0..self.len()).map(|index| self.record(index)).collect()
    }
}

/// Loads the fitted coefficient panel.
///
/// The file is read positionally: the first column names the feature, the
/// second carries its coefficient. Rows naming features the engine does not
/// recognize (intercepts, retired covariates) are skipped with a warning,
/// matching how the fitted model ignores columns it was never trained on.
pub fn load_coefficients(path: &str) -> Result<CoefficientTable, TableError> {
    log::info!("Loading coefficient panel from '{path}'");
    let df = internal::read_csv(path)?;
    if df.height() == 0 {
        return Err(TableError::EmptyTable(path.to_string()));
    }
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    if names.len() < 2 {
        return Err(TableError::TooFewColumns { found: names.len() });
    }

    let feature_names = internal::extract_text_column(&df, &names[0])?;
    let values = internal::extract_numeric_column(&df, &names[1])?;

    let mut coefficients = HashMap::with_capacity(feature_names.len());
    for (name, value) in feature_names.iter().zip(values) {
        match name.parse::<Feature>() {
            Ok(feature) => {
                coefficients.insert(feature, value);
            }
            Err(unknown) => {
                log::warn!("Ignoring coefficient row in '{path}': {unknown}");
            }
        }
    }
    Ok(CoefficientTable::new(coefficients)?)
}

/// Loads the registry incidence table.
///
/// Band labels must be `start-end` with inclusive integer bounds; an
/// open-ended label such as `85+` is rejected rather than guessed at. Band
/// order is preserved because lookups are first-match-wins.
pub fn load_incidence(path: &str) -> Result<IncidenceTable, TableError> {
    log::info!("Loading incidence table from '{path}'");
    let df = internal::read_csv(path)?;
    if df.height() == 0 {
        return Err(TableError::EmptyTable(path.to_string()));
    }
    internal::require_columns(&df, &[AGE_GROUP_COLUMN, MALE_RATE_COLUMN, FEMALE_RATE_COLUMN])?;

    let labels = internal::extract_text_column(&df, AGE_GROUP_COLUMN)?;
    let male_rates = internal::extract_numeric_column(&df, MALE_RATE_COLUMN)?;
    let female_rates = internal::extract_numeric_column(&df, FEMALE_RATE_COLUMN)?;
    internal::validate_non_negative(&male_rates, MALE_RATE_COLUMN)?;
    internal::validate_non_negative(&female_rates, FEMALE_RATE_COLUMN)?;

    let mut bands = Vec::with_capacity(labels.len());
    for ((label, male_rate), female_rate) in labels.iter().zip(male_rates).zip(female_rates) {
        let (start, end) = internal::parse_band_label(label)?;
        bands.push(AgeBand {
            start,
            end,
            male_rate,
            female_rate,
        });
    }
    log::info!("Incidence table holds {} band(s)", bands.len());
    Ok(IncidenceTable::new(bands))
}

/// Loads a patient cohort from a tab-separated file.
///
/// Required columns: `age`, `bmi`, `sex` (text labels), and the four flag
/// columns `kras`, `apc`, `tp53`, `mmr` holding 0 or 1. A `sample_id`
/// column is honored when present.
pub fn load_cohort(path: &str) -> Result<CohortData, TableError> {
    log::info!("Loading patient cohort from '{path}'");
    let df = internal::read_tsv(path)?;
    if df.height() == 0 {
        return Err(TableError::EmptyTable(path.to_string()));
    }
    internal::require_columns(&df, &COHORT_REQUIRED_COLUMNS)?;

    let age = internal::extract_numeric_column(&df, "age")?;
    let bmi = internal::extract_numeric_column(&df, "bmi")?;
    let sex = internal::extract_text_column(&df, "sex")?
        .iter()
        .map(|label| Sex::from_label(label))
        .collect();
    let kras = internal::extract_flag_column(&df, "kras")?;
    let apc = internal::extract_flag_column(&df, "apc")?;
    let tp53 = internal::extract_flag_column(&df, "tp53")?;
    let mmr = internal::extract_flag_column(&df, "mmr")?;
    let sample_ids = internal::build_sample_ids(&df, age.len())?;

    log::info!("Cohort holds {} patient(s)", age.len());
    Ok(CohortData {
        sample_ids,
        age: Array1::from_vec(age),
        bmi: Array1::from_vec(bmi),
        sex,
        kras,
        apc,
        tp53,
        mmr,
    })
}

/// Internal module for shared loading logic.
mod internal {
    use super::*;

    pub(super) fn read_csv(path: &str) -> Result<DataFrame, TableError> {
        let df = CsvReader::new(File::open(Path::new(path))?)
            .with_options(CsvReadOptions::default().with_has_header(true))
            .finish()?;
        Ok(df)
    }

    pub(super) fn read_tsv(path: &str) -> Result<DataFrame, TableError> {
        let df = CsvReader::new(File::open(Path::new(path))?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
            )
            .finish()?;
        Ok(df)
    }

    pub(super) fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), TableError> {
        let present: HashSet<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        for column in required {
            if !present.contains(*column) {
                return Err(TableError::ColumnNotFound((*column).to_string()));
            }
        }
        Ok(())
    }

    fn validate_is_finite(values: &[f64], column_name: &str) -> Result<(), TableError> {
        if values.iter().any(|&v| !v.is_finite()) {
            return Err(TableError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(())
    }

    pub(super) fn validate_non_negative(
        values: &[f64],
        column_name: &str,
    ) -> Result<(), TableError> {
        for (i, &value) in values.iter().enumerate() {
            if value < 0.0 {
                return Err(TableError::NegativeRate {
                    column: column_name.to_string(),
                    row: i + 1,
                    value,
                });
            }
        }
        Ok(())
    }

    pub(super) fn extract_numeric_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<f64>, TableError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(TableError::MissingValuesFound(column_name.to_string()));
        }

        let casted = match series.cast(&DataType::Float64) {
            Ok(casted) => casted,
            Err(_) => {
                return Err(TableError::ColumnWrongType {
                    column_name: column_name.to_string(),
                    expected_type: "f64 (numeric)",
                    found_type: format!("{:?}", series.dtype()),
                });
            }
        };

        if casted.null_count() > 0 {
            return Err(TableError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }

        let chunked = casted.f64()?.rechunk();
        let values: Vec<f64> = chunked.into_no_null_iter().collect();
        validate_is_finite(&values, column_name)?;
        Ok(values)
    }

    pub(super) fn extract_text_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<String>, TableError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(TableError::MissingValuesFound(column_name.to_string()));
        }
        let chunked = match series.str() {
            Ok(chunked) => chunked,
            Err(_) => {
                return Err(TableError::ColumnWrongType {
                    column_name: column_name.to_string(),
                    expected_type: "text",
                    found_type: format!("{:?}", series.dtype()),
                });
            }
        };
        let mut values = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            match chunked.get(i) {
                Some(text) => values.push(text.to_string()),
                None => return Err(TableError::MissingValuesFound(column_name.to_string())),
            }
        }
        Ok(values)
    }

    pub(super) fn extract_flag_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<bool>, TableError> {
        let values = extract_numeric_column(df, column_name)?;
        let mut flags = Vec::with_capacity(values.len());
        for (i, &value) in values.iter().enumerate() {
            if value == 0.0 {
                flags.push(false);
            } else if value == 1.0 {
                flags.push(true);
            } else {
                return Err(TableError::InvalidFlagValue {
                    column: column_name.to_string(),
                    row: i + 1,
                    value,
                });
            }
        }
        Ok(flags)
    }

    /// Parses an inclusive `start-end` band label, tolerating whitespace
    /// around the bounds.
    pub(super) fn parse_band_label(label: &str) -> Result<(u32, u32), TableError> {
        let Some((start_text, end_text)) = label.split_once('-') else {
            return Err(TableError::MalformedBandLabel {
                label: label.to_string(),
            });
        };
        let start: u32 = start_text.trim().parse().map_err(|_| {
            TableError::MalformedBandLabel {
                label: label.to_string(),
            }
        })?;
        let end: u32 = end_text.trim().parse().map_err(|_| {
            TableError::MalformedBandLabel {
                label: label.to_string(),
            }
        })?;
        if start > end {
            return Err(TableError::InvertedBand {
                label: label.to_string(),
            });
        }
        Ok((start, end))
    }

    pub(super) fn build_sample_ids(df: &DataFrame, n: usize) -> Result<Vec<String>, TableError> {
        if !df.get_column_names().iter().any(|c| c == &"sample_id") {
            return Ok((1..=n).map(|i| i.to_string()).collect());
        }

        let series = df.column("sample_id")?;
        if series.null_count() > 0 {
            return Ok((1..=n).map(|i| i.to_string()).collect());
        }

        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let value = series.get(i).unwrap_or(AnyValue::Null);
            // AnyValue's Display wraps string cells in quote characters.
            let text = match value {
                AnyValue::Null => String::new(),
                AnyValue::String(s) => s.to_string(),
                AnyValue::StringOwned(s) => s.to_string(),
                other => other.to_string(),
            };
            ids.push(if text.is_empty() {
                (i + 1).to_string()
            } else {
                text
            });
        }
        Ok(ids)
    }
}
