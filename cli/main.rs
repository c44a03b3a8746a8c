#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::ProgressBar;
use std::process;
use std::time::Duration;

use crypta::alpha::ClinicalScale;
use crypta::artifact::CalibrationModel;
use crypta::calibration::{CalibrationCheckRow, Calibrator, DEFAULT_CHECK_AGES};
use crypta::data::{CohortData, load_coefficients, load_cohort, load_incidence};
use crypta::engine::{RiskEngine, RiskPrediction};
use crypta::hazard::HazardModel;
use crypta::patient::{PatientRecord, Sex};

#[derive(Parser)]
#[command(
    name = "crypta",
    about = "Mechanistic colorectal cancer risk estimation toolkit",
    long_about = "Estimates short-horizon and lifetime colorectal cancer risk by calibrating \
                 a multistage initiation model against registry incidence and personalizing \
                 it with fitted mutation, BMI and sex coefficients."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Path to the fitted coefficient panel CSV (feature name column, value column)
    #[arg(long, value_name = "PATH")]
    pub coefficients: String,

    /// Path to the registry incidence CSV (Age_Group, Male_Rate, Female_Rate)
    #[arg(long, value_name = "PATH")]
    pub incidence: String,

    /// Optional precomputed calibration TOML produced by `calibrate`
    #[arg(long, value_name = "PATH")]
    pub calibration: Option<String>,

    /// Patient age in years
    #[arg(long)]
    pub age: f64,

    /// Patient body mass index
    #[arg(long)]
    pub bmi: f64,

    /// Patient sex: "male" or "female"
    #[arg(long)]
    pub sex: String,

    /// KRAS activating mutation detected
    #[arg(long)]
    pub kras: bool,

    /// APC inactivating mutation detected
    #[arg(long)]
    pub apc: bool,

    /// TP53 mutation detected
    #[arg(long)]
    pub tp53: bool,

    /// Mismatch-repair defect detected
    #[arg(long)]
    pub mmr: bool,

    /// Print the full-precision prediction instead of the rounded payload
    #[arg(long)]
    pub full: bool,
}

#[derive(Args)]
pub struct ScoreArgs {
    /// Path to the cohort TSV with age,bmi,sex,kras,apc,tp53,mmr columns
    #[arg(value_name = "COHORT_PATH")]
    pub cohort: String,

    /// Path to the fitted coefficient panel CSV
    #[arg(long, value_name = "PATH")]
    pub coefficients: String,

    /// Path to the registry incidence CSV
    #[arg(long, value_name = "PATH")]
    pub incidence: String,

    /// Optional precomputed calibration TOML produced by `calibrate`
    #[arg(long, value_name = "PATH")]
    pub calibration: Option<String>,
}

#[derive(Args)]
pub struct CalibrateArgs {
    /// Path to the registry incidence CSV to calibrate against
    #[arg(value_name = "INCIDENCE_PATH")]
    pub incidence: String,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the registry incidence CSV to check against
    #[arg(value_name = "INCIDENCE_PATH")]
    pub incidence: String,

    /// Probe ages, comma separated (defaults to 45,50,60,70)
    #[arg(long, value_name = "AGES", value_delimiter = ',')]
    pub ages: Vec<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate risk for a single patient
    #[command(about = "Estimate risk for one patient (prints JSON)")]
    Predict(PredictArgs),

    /// Score every patient in a cohort file
    #[command(about = "Score a patient cohort (outputs: predictions.tsv)")]
    Score(ScoreArgs),

    /// Precompute the calibration surface for every covered age
    #[command(about = "Precompute calibration (outputs: calibration.toml)")]
    Calibrate(CalibrateArgs),

    /// Compare calibrated model risk against the incidence table
    #[command(about = "Report model vs observed 5-year risk at probe ages")]
    Check(CheckArgs),

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Predict(args)) => run_predict(args),
        Some(Commands::Score(args)) => run_score(args),
        Some(Commands::Calibrate(args)) => run_calibrate(args),
        Some(Commands::Check(args)) => run_check(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    println!("crypta {version}");
}

/// Assembles an engine from the reference files shared by `predict` and
/// `score`.
fn build_engine(
    coefficients_path: &str,
    incidence_path: &str,
    calibration_path: Option<&str>,
) -> Result<RiskEngine, Box<dyn std::error::Error>> {
    let coefficients = load_coefficients(coefficients_path)?;
    let incidence = load_incidence(incidence_path)?;
    let mut engine = RiskEngine::new(
        HazardModel::default(),
        incidence,
        coefficients,
        ClinicalScale::default(),
    );
    if let Some(path) = calibration_path {
        println!("Loading calibration surface from: {path}");
        engine = engine.with_calibration(CalibrationModel::load(path)?);
    }
    Ok(engine)
}

fn run_predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(
        &args.coefficients,
        &args.incidence,
        args.calibration.as_deref(),
    )?;
    let record = PatientRecord {
        age: args.age,
        bmi: args.bmi,
        sex: Sex::from_label(&args.sex),
        kras: args.kras,
        apc: args.apc,
        tp53: args.tp53,
        mmr: args.mmr,
    };
    let prediction = engine.predict(&record)?;
    let output = if args.full {
        serde_json::to_string_pretty(&prediction)?
    } else {
        serde_json::to_string_pretty(&prediction.payload())?
    };
    println!("{output}");
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(
        &args.coefficients,
        &args.incidence,
        args.calibration.as_deref(),
    )?;
    let cohort = load_cohort(&args.cohort)?;
    println!("Loaded {} patient(s) from {}", cohort.len(), args.cohort);

    let records = cohort.records();
    let bar = ProgressBar::new_spinner();
    bar.set_message(format!("Scoring {} patient(s)", records.len()));
    bar.enable_steady_tick(Duration::from_millis(100));
    let scored = engine.predict_batch(&records);
    bar.finish_and_clear();
    let predictions = scored?;

    let output_path = "predictions.tsv";
    save_predictions(&cohort, &predictions, output_path)?;
    println!("Predictions saved to: {output_path}");
    Ok(())
}

fn save_predictions(
    cohort: &CohortData,
    predictions: &[RiskPrediction],
    output_path: &str,
) -> Result<(), std::io::Error> {
    use std::io::Write;

    let mut file = std::fs::File::create(output_path)?;
    writeln!(
        file,
        "sample_id\tage\tsex\talpha\trisk_5yr_percent\trisk_10yr_percent\tlifetime_risk_percent\trelative_risk\tcategory"
    )?;
    for (i, prediction) in predictions.iter().enumerate() {
        let payload = prediction.payload();
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}\t{}\t{:.2}\t{:.3}\t{}",
            cohort.sample_ids[i],
            cohort.age[i],
            cohort.sex[i],
            payload.alpha,
            payload.risk_5yr_percent,
            payload.risk_10yr_percent,
            prediction.lifetime_risk * 100.0,
            prediction.relative_risk,
            prediction.category
        )?;
    }
    Ok(())
}

fn run_calibrate(args: CalibrateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let incidence = load_incidence(&args.incidence)?;
    let hazard = HazardModel::default();
    let calibrator = Calibrator::new(&hazard, &incidence);

    let bar = ProgressBar::new_spinner();
    bar.set_message("Calibrating every covered age stratum");
    bar.enable_steady_tick(Duration::from_millis(100));
    let built = CalibrationModel::build(&calibrator);
    bar.finish_and_clear();
    let model = built?;

    println!(
        "Calibrated {} age stratum(s), both sexes each",
        model.strata.len()
    );
    let output_path = "calibration.toml";
    model.save(output_path)?;
    println!("Calibration saved to: {output_path}");
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<(), Box<dyn std::error::Error>> {
    let incidence = load_incidence(&args.incidence)?;
    let hazard = HazardModel::default();
    let calibrator = Calibrator::new(&hazard, &incidence);
    let ages = if args.ages.is_empty() {
        DEFAULT_CHECK_AGES.to_vec()
    } else {
        args.ages
    };
    let rows = calibrator.check(&ages)?;
    print_check_report(&rows);
    Ok(())
}

fn print_check_report(rows: &[CalibrationCheckRow]) {
    let mut current_sex: Option<Sex> = None;
    for row in rows {
        if current_sex != Some(row.sex) {
            println!("\n=== Calibration check: {} ===", row.sex);
            current_sex = Some(row.sex);
        }
        println!(
            "Age {:>3}: observed 5-yr = {:.3}% , model 5-yr = {:.3}% , log_alpha = {:+.3}",
            row.age,
            row.observed_5yr * 100.0,
            row.model_5yr * 100.0,
            row.log_alpha
        );
    }
}
