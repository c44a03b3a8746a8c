use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::collections::HashMap;

use crypta::alpha::{ClinicalScale, CoefficientTable, Feature};
use crypta::calibration::Calibrator;
use crypta::engine::RiskEngine;
use crypta::hazard::HazardModel;
use crypta::incidence::{AgeBand, IncidenceTable};
use crypta::patient::{PatientRecord, Sex};

fn incidence_table() -> IncidenceTable {
    IncidenceTable::new(vec![
        AgeBand { start: 50, end: 54, male_rate: 60.0, female_rate: 45.0 },
        AgeBand { start: 55, end: 59, male_rate: 75.0, female_rate: 58.0 },
        AgeBand { start: 60, end: 64, male_rate: 98.0, female_rate: 72.0 },
        AgeBand { start: 65, end: 69, male_rate: 125.0, female_rate: 92.0 },
        AgeBand { start: 70, end: 74, male_rate: 160.0, female_rate: 115.0 },
    ])
}

fn coefficient_table() -> CoefficientTable {
    let mut coefficients = HashMap::new();
    coefficients.insert(Feature::ApcMutation, 1.2);
    coefficients.insert(Feature::Tp53Mutation, 0.8);
    coefficients.insert(Feature::KrasMutation, 0.45);
    coefficients.insert(Feature::MmrDefect, 0.9);
    coefficients.insert(Feature::Bmi, 0.3);
    coefficients.insert(Feature::SexIndicator, -0.25);
    CoefficientTable::new(coefficients).expect("coefficient table")
}

fn synthetic_cohort(size: usize) -> Vec<PatientRecord> {
    (0..size)
        .map(|i| PatientRecord {
            age: 50.0 + (i % 25) as f64,
            bmi: 21.0 + (i % 12) as f64,
            sex: if i % 2 == 0 { Sex::Male } else { Sex::Female },
            kras: i % 3 == 0,
            apc: i % 7 == 0,
            tp53: i % 5 == 0,
            mmr: i % 11 == 0,
        })
        .collect()
}

fn benchmark_bisection(c: &mut Criterion) {
    let hazard = HazardModel::default();
    let incidence = incidence_table();
    let calibrator = Calibrator::new(&hazard, &incidence);

    let mut group = c.benchmark_group("calibrate_log_alpha");
    for age in [50.0_f64, 60.0, 70.0] {
        group.bench_with_input(BenchmarkId::from_parameter(age), &age, |b, &age| {
            b.iter(|| {
                let log_alpha = calibrator
                    .calibrate_log_alpha(black_box(age), Sex::Male)
                    .expect("covered age");
                black_box(log_alpha);
            });
        });
    }
    group.finish();
}

fn benchmark_prediction(c: &mut Criterion) {
    let engine = RiskEngine::new(
        HazardModel::default(),
        incidence_table(),
        coefficient_table(),
        ClinicalScale::default(),
    );

    let record = PatientRecord {
        age: 62.0,
        bmi: 28.0,
        sex: Sex::Male,
        kras: true,
        apc: false,
        tp53: true,
        mmr: false,
    };
    c.bench_function("predict_single", |b| {
        b.iter(|| {
            let prediction = engine.predict(black_box(&record)).expect("predict");
            black_box(prediction);
        });
    });

    let mut group = c.benchmark_group("predict_batch");
    for size in [100_usize, 1000] {
        let cohort = synthetic_cohort(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &cohort, |b, cohort| {
            b.iter(|| {
                let predictions = engine.predict_batch(black_box(cohort)).expect("batch");
                black_box(predictions);
            });
        });
    }
    group.finish();
}

criterion_group!(calibration, benchmark_bisection, benchmark_prediction);
criterion_main!(calibration);
