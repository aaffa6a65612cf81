//! Integration tests for layer-wise pretraining and fine-tuning.
//!
//! These drive the controller with the reference backprop network:
//! - Every hidden layer is promoted within a bounded number of steps
//! - Promotion never happens before the warm-up guard allows it
//! - Phase, autoencoder and completion invariants hold at every step
//! - The error history stays bounded over long runs

use approx::assert_abs_diff_eq;
use deeplearn::{Config, DeepLearnError, Phase, TrainingController};

const INPUTS: usize = 10;
const HIDDEN_UNITS: usize = 4;
const HIDDEN_LAYERS: usize = 2;
const OUTPUTS: usize = 2;

fn new_learner() -> TrainingController {
    TrainingController::new(
        INPUTS,
        HIDDEN_UNITS,
        HIDDEN_LAYERS,
        OUTPUTS,
        &[0.1, 0.1, 0.1],
        123,
    )
    .expect("Failed to create learner")
}

fn set_ramp(learner: &mut TrainingController) {
    for i in 0..INPUTS {
        learner.set_input(i, 0.25 + i as f32 * 0.5 / INPUTS as f32);
    }
}

fn set_fine_tuning_sample(learner: &mut TrainingController) {
    for i in 0..INPUTS {
        learner.set_input(i, i as f32 / INPUTS as f32);
    }
    for i in 0..OUTPUTS {
        learner.set_output(i, 1.0 - i as f32 / INPUTS as f32);
    }
}

/// Pretrain until fine-tuning starts, returning steps spent on each layer.
fn pretrain(learner: &mut TrainingController) -> [usize; HIDDEN_LAYERS + 1] {
    let mut steps = [0usize; HIDDEN_LAYERS + 1];
    for _ in 0..10_000 {
        set_ramp(learner);
        learner.update();
        steps[learner.current_hidden_layer()] += 1;
        if learner.current_hidden_layer() == HIDDEN_LAYERS {
            break;
        }
    }
    steps
}

#[test]
fn test_init() {
    let learner = new_learner();
    assert_eq!(learner.phase(), Phase::Pretraining { layer: 0 });
    assert!(learner.autoencoder().is_some());
    assert_eq!(learner.hidden_layer_count(), HIDDEN_LAYERS);
    assert_eq!(learner.error_thresholds(), &[0.1, 0.1, 0.1]);
    assert_eq!(learner.warmup_steps(), 100);
}

#[test]
fn test_short_thresholds_rejected() {
    let result = TrainingController::new(INPUTS, HIDDEN_UNITS, HIDDEN_LAYERS, OUTPUTS, &[0.1, 0.1], 123);
    assert!(matches!(result, Err(DeepLearnError::InvalidConfig(_))));
}

#[test]
fn test_pretraining_promotes_every_layer() {
    let mut learner = new_learner();
    let steps = pretrain(&mut learner);

    assert_eq!(
        learner.current_hidden_layer(),
        HIDDEN_LAYERS,
        "Didn't finish pretraining, error {:?}",
        learner.current_error()
    );
    assert_eq!(learner.phase(), Phase::FineTuning);
    assert!(learner.autoencoder().is_none());

    // the warm-up guard rules out a degenerate early promotion
    assert!(steps[0] > 4);
    assert!(steps[1] > 4);
    assert!(steps[0] >= 100);
    assert!(steps[1] >= 100);
}

#[test]
fn test_phase_invariants_hold_every_step() {
    let mut learner = new_learner();
    let mut previous_layer = 0;
    let mut was_complete = false;

    for step in 0..20_000 {
        if learner.phase().is_pretraining() {
            set_ramp(&mut learner);
        } else {
            set_fine_tuning_sample(&mut learner);
        }
        learner.update();

        let layer = learner.current_hidden_layer();
        assert!(layer >= previous_layer, "layer went backwards at step {step}");
        assert_eq!(learner.autoencoder().is_some(), layer < HIDDEN_LAYERS);
        if was_complete {
            assert!(learner.is_training_complete());
        }
        if learner.is_training_complete() {
            assert_eq!(layer, HIDDEN_LAYERS);
            let error = learner.current_error().expect("complete implies known error");
            assert!(error < learner.error_thresholds()[HIDDEN_LAYERS]);
        }
        previous_layer = layer;
        was_complete = learner.is_training_complete();
    }
}

#[test]
fn test_fine_tuning_reduces_error() {
    let mut learner = new_learner();
    pretrain(&mut learner);

    set_fine_tuning_sample(&mut learner);
    learner.update();
    let first = learner.current_error().expect("error after first fine-tuning step");

    for _ in 0..2_000 {
        set_fine_tuning_sample(&mut learner);
        learner.update();
    }
    let last = learner.current_error().expect("error after fine-tuning");
    assert!(last != 0.0);
    assert!(last < first, "error did not fall: {first} -> {last}");

    // outputs differ for different targets
    learner.feed_forward();
    assert!((learner.output(0) - learner.output(1)).abs() > 0.0);
}

#[test]
fn test_step_count_tracks_updates() {
    let mut learner = new_learner();
    for _ in 0..250 {
        set_ramp(&mut learner);
        learner.update();
    }
    assert_eq!(learner.step_count(), 250);
}

#[test]
fn test_history_stays_bounded() {
    let config = Config {
        history_capacity: 32,
        ..Config::default()
    };
    let mut learner = TrainingController::with_config(
        INPUTS,
        HIDDEN_UNITS,
        HIDDEN_LAYERS,
        OUTPUTS,
        &[0.1, 0.1, 0.0],
        123,
        &config,
    )
    .unwrap();

    for _ in 0..5_000 {
        if learner.phase().is_pretraining() {
            set_ramp(&mut learner);
        } else {
            set_fine_tuning_sample(&mut learner);
        }
        learner.update();
        let history = learner.history();
        assert!(history.len() < history.capacity());
        assert!(history.sample_stride().is_power_of_two());
    }

    let history = learner.history();
    assert!(history.sample_stride() >= 128);
    let series: Vec<(u64, f32)> = history.series().collect();
    for (i, (x, _)) in series.iter().enumerate() {
        assert_eq!(*x, i as u64 * u64::from(history.sample_stride()));
    }
}

#[test]
fn test_hyperparameters_apply_to_both_networks() {
    let mut learner = new_learner();
    learner.set_learning_rate(0.05);
    learner.set_dropout_percent(5.0);

    assert_abs_diff_eq!(learner.network().learning_rate(), 0.05);
    let autoencoder = learner.autoencoder().expect("autoencoder during pretraining");
    assert_abs_diff_eq!(autoencoder.learning_rate(), 0.05);
    assert_abs_diff_eq!(autoencoder.dropout_percent(), 5.0);
}

#[test]
fn test_custom_warmup_promotes_sooner() {
    let config = Config {
        warmup_steps: 10,
        ..Config::default()
    };
    let mut learner = TrainingController::with_config(
        INPUTS,
        HIDDEN_UNITS,
        HIDDEN_LAYERS,
        OUTPUTS,
        &[0.5, 0.5, 0.1],
        123,
        &config,
    )
    .unwrap();

    let mut steps = 0;
    while learner.current_hidden_layer() == 0 && steps < 1_000 {
        set_ramp(&mut learner);
        learner.update();
        steps += 1;
    }
    assert_eq!(learner.current_hidden_layer(), 1);
    assert!(steps > 10 && steps < 100, "promoted after {steps} steps");
}
