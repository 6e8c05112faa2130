use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use met_qc::models::{ObservationFrame, Station};
use met_qc::qc::{
    hubbard_consistency, persistence_noc, persistence_variability, range_check, step_check,
    HubbardParams, VariabilityMethod,
};
use met_qc::reconstruct::interpolate_gaps;
use met_qc::utils::coordinates::dms_to_decimal;

// Hourly synthetic network: a shared signal with per-station offsets and gaps
fn create_test_frame(station_count: usize, hours: usize) -> ObservationFrame {
    let start: NaiveDateTime = NaiveDate::from_ymd_opt(2019, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let index = (0..hours)
        .map(|h| start + Duration::hours(h as i64))
        .collect();
    let stations = (1..=station_count).map(|s| format!("ST{:03}", s)).collect();
    let columns = (0..station_count)
        .map(|s| {
            (0..hours)
                .map(|h| {
                    if (h + s) % 97 == 0 {
                        f64::NAN
                    } else {
                        10.0 + (h as f64 * 0.26).sin() * 6.0 + s as f64 * 0.1
                    }
                })
                .collect()
        })
        .collect();
    ObservationFrame::from_columns(index, stations, columns).unwrap()
}

fn create_test_stations(station_count: usize) -> Vec<Station> {
    (1..=station_count)
        .map(|s| {
            Station::new(
                format!("ST{:03}", s),
                45.0 + (s % 10) as f64 * 0.05,
                11.0 + (s / 10) as f64 * 0.05,
                Some(100.0 + s as f64),
            )
        })
        .collect()
}

fn benchmark_range_check(c: &mut Criterion) {
    let x = create_test_frame(50, 24 * 365);
    c.bench_function("range_check", |b| {
        b.iter(|| black_box(range_check(&x, -30.0, 45.0, 1).unwrap().flags.flagged_count()))
    });
}

fn benchmark_step_check(c: &mut Criterion) {
    let x = create_test_frame(50, 24 * 365);
    c.bench_function("step_check", |b| {
        b.iter(|| black_box(step_check(&x, 4.0, 8.0, 1, 2).unwrap().flags.flagged_count()))
    });
}

fn benchmark_persistence(c: &mut Criterion) {
    let x = create_test_frame(20, 24 * 90);
    c.bench_function("persistence_noc", |b| {
        b.iter(|| black_box(persistence_noc(&x, 6, 1).unwrap().flags.flagged_count()))
    });

    let mut group = c.benchmark_group("persistence_variability");
    for method in [
        VariabilityMethod::Std,
        VariabilityMethod::MaxMin,
        VariabilityMethod::Iqr,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(method),
            &method,
            |b, &method| {
                b.iter(|| {
                    let outcome =
                        persistence_variability(&x, Duration::hours(24), 50.0, method, 0.5, 1)
                            .unwrap();
                    black_box(outcome.flags.flagged_count())
                })
            },
        );
    }
    group.finish();
}

fn benchmark_hubbard_by_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("hubbard_by_stations");
    group.sample_size(10);

    for &size in &[10, 30, 60] {
        let x = create_test_frame(size, 24 * 14);
        let stations = create_test_stations(size);
        let params = HubbardParams::new(x.index()[48], x.index()[24 * 14 - 49]);

        group.bench_with_input(BenchmarkId::new("stations", size), &size, |b, _| {
            b.iter(|| {
                let outcome = hubbard_consistency(&stations, &x, &params, None).unwrap();
                black_box(outcome.flags.flagged_count())
            })
        });
    }
    group.finish();
}

fn benchmark_interpolation(c: &mut Criterion) {
    let x = create_test_frame(50, 24 * 365);
    c.bench_function("interpolate_gaps", |b| {
        b.iter(|| black_box(interpolate_gaps(&x, 3).unwrap().filled_count()))
    });
}

fn benchmark_coordinate_conversion(c: &mut Criterion) {
    let dms_coordinates = vec!["45:30:15", "46:12:30", "44:45:22", "11:18:45", "-9:55:30"];

    c.bench_function("coordinate_conversion", |b| {
        b.iter(|| {
            let mut results = Vec::new();
            for dms in &dms_coordinates {
                if let Ok(decimal) = dms_to_decimal(dms) {
                    results.push(decimal);
                }
            }
            black_box(results.len())
        })
    });
}

criterion_group!(
    benches,
    benchmark_range_check,
    benchmark_step_check,
    benchmark_persistence,
    benchmark_hubbard_by_size,
    benchmark_interpolation,
    benchmark_coordinate_conversion
);
criterion_main!(benches);
