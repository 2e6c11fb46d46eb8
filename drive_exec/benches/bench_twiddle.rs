//! # Drive Control Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use comms_if::sim::Telemetry;
use drive_lib::{
    drive_ctrl::{DriveCtrl, Params, TuneTarget, TuningParams},
    pid::{GainVector, PidController},
};
use util::module::State;

fn drive_ctrl_benchmark(c: &mut Criterion) {
    // ---- Single controller step ----

    let mut pid = PidController::new(GainVector::new(0.5, 0.0, 5.70568));

    c.bench_function("PidController::update", |b| {
        b.iter(|| {
            pid.update(black_box(0.25));
            pid.output()
        })
    });

    // ---- Full tuning episode ----

    // Episode of 1000 steps, with the cross track error following a slow
    // oscillation so that the run isn't aborted
    let mut params = Params::default();
    params.tuning = TuningParams {
        enable_tuning: true,
        target: TuneTarget::Steer,
        warmup_steps: 100,
        max_steps: 1000,
        abort_threshold: 1e9,
        ..TuningParams::default()
    };

    let telem: Vec<Telemetry> = (0..=1000)
        .map(|i| Telemetry {
            cte: (i as f64 * 0.01).sin(),
            speed: 10.0,
            steering_angle: 0.0,
        })
        .collect();

    let mut drive_ctrl = DriveCtrl::new(params).unwrap();

    c.bench_function("DriveCtrl::proc::episode", |b| {
        b.iter(|| {
            for t in telem.iter() {
                black_box(drive_ctrl.proc(t).unwrap());
            }
        })
    });
}

criterion_group!(benches, drive_ctrl_benchmark);
criterion_main!(benches);
