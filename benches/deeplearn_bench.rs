//! Criterion benchmarks for the training controller.
//!
//! Run with: `cargo bench --bench deeplearn_bench`
//!
//! ## Benchmarks
//!
//! 1. **Pretraining step**: one autoencoder update through the controller
//! 2. **Fine-tuning step**: one full-network update, by network width
//! 3. **Checkpoint round trip**: save + load to memory
//! 4. **History recording**: cost of the decimating recorder

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use deeplearn::{HistoryRecorder, TrainingController};
use std::io::Cursor;

fn ramp(inputs: usize) -> Vec<f32> {
    (0..inputs)
        .map(|i| 0.25 + i as f32 * 0.5 / inputs as f32)
        .collect()
}

/// Controller that has finished pretraining and never completes fine-tuning.
fn fine_tuning_learner(inputs: usize, hidden: usize) -> TrainingController {
    let mut learner = TrainingController::new(inputs, hidden, 2, 2, &[1.0, 1.0, 0.0], 1)
        .expect("Failed to create benchmark learner");
    let values = ramp(inputs);
    while learner.phase().is_pretraining() {
        learner.set_inputs(&values);
        learner.update();
    }
    learner
}

fn bench_pretraining_step(c: &mut Criterion) {
    c.bench_function("pretrain_step_10_4x2_2", |b| {
        // an unreachable threshold keeps the controller on layer 0
        let mut learner = TrainingController::new(10, 4, 2, 2, &[0.0, 0.0, 0.0], 123)
            .expect("Failed to create benchmark learner");
        let values = ramp(10);
        b.iter(|| {
            learner.set_inputs(black_box(&values));
            learner.update();
        });
    });
}

fn bench_fine_tuning_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("fine_tune_step");
    for &(inputs, hidden) in &[(10, 4), (64, 32), (256, 128)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{inputs}x{hidden}")),
            &(inputs, hidden),
            |b, &(inputs, hidden)| {
                let mut learner = fine_tuning_learner(inputs, hidden);
                let values = ramp(inputs);
                b.iter(|| {
                    learner.set_inputs(black_box(&values));
                    learner.set_output(0, 0.9);
                    learner.set_output(1, 0.1);
                    learner.update();
                });
            },
        );
    }
    group.finish();
}

fn bench_checkpoint_round_trip(c: &mut Criterion) {
    let learner = fine_tuning_learner(64, 32);
    c.bench_function("checkpoint_round_trip_64x32", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            learner.save(&mut buf).expect("save");
            let loaded: TrainingController =
                TrainingController::load(&mut Cursor::new(buf)).expect("load");
            black_box(loaded);
        });
    });
}

fn bench_history_record(c: &mut Criterion) {
    c.bench_function("history_record_1k", |b| {
        let mut history = HistoryRecorder::new();
        b.iter(|| {
            for i in 0..1_000 {
                history.record(black_box(i as f32 * 1e-3));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_pretraining_step,
    bench_fine_tuning_step,
    bench_checkpoint_round_trip,
    bench_history_record
);
criterion_main!(benches);
