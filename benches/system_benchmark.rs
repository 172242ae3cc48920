use criterion::{criterion_group, criterion_main, Criterion};
use segway_tuner::sim::{PlantConfig, SegwayPlant};
use segway_tuner::{CancelToken, EndReason, EpisodeResult, PidController, PidGains, Twiddle, TwiddleSettings};
use std::convert::Infallible;

fn benchmark_pid_step(c: &mut Criterion) {
    let mut pid = PidController::new(PidGains::new(13.7, 0.199, 1286.0), 0.0, 0.0);
    let mut now = 0.0;
    c.bench_function("pid_step", |b| {
        b.iter(|| {
            now += 50.0;
            pid.step(0.02, now)
        })
    });
}

fn benchmark_plant_tick(c: &mut Criterion) {
    let mut plant = SegwayPlant::new(PlantConfig { initial_tilt: 0.0, ..Default::default() });
    c.bench_function("plant_tick", |b| b.iter(|| plant.advance_tick()));
}

fn benchmark_twiddle_quadratic(c: &mut Criterion) {
    c.bench_function("twiddle_quadratic", |b| {
        b.iter(|| {
            let mut twiddle = Twiddle::new(vec![13.7, 0.199, 1286.0], None, TwiddleSettings::default())
                .expect("valid start");
            twiddle.tune(
                |p: &[f64]| {
                    let cost = p.iter().map(|x| (x - 1.0).powi(2)).sum();
                    Ok::<_, Infallible>(EpisodeResult::new(cost, 0, EndReason::TimeUp))
                },
                &CancelToken::new(),
            )
        })
    });
}

criterion_group!(benches, benchmark_pid_step, benchmark_plant_tick, benchmark_twiddle_quadratic);
criterion_main!(benches);
