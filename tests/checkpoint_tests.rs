//! Save/load round trips of trained controllers.

use deeplearn::{
    load_checkpoint, save_checkpoint, Backprop, Comparison, DeepLearnError, TrainingController,
};
use std::io::Cursor;
use tempfile::TempDir;

fn train(learner: &mut TrainingController, steps: usize) {
    let inputs = learner.network().input_count();
    let outputs = learner.network().output_count();
    for _ in 0..steps {
        if learner.phase().is_pretraining() {
            for i in 0..inputs {
                learner.set_input(i, 0.25 + i as f32 * 0.5 / inputs as f32);
            }
        } else {
            for i in 0..inputs {
                learner.set_input(i, i as f32 / inputs as f32);
            }
            for i in 0..outputs {
                learner.set_output(i, 1.0 - i as f32 / inputs as f32);
            }
        }
        learner.update();
    }
}

fn round_trip(learner: &TrainingController) -> TrainingController {
    let mut buf = Vec::new();
    learner.save(&mut buf).expect("save");
    TrainingController::load(&mut Cursor::new(buf)).expect("load")
}

#[test]
fn test_untrained_round_trip() {
    let learner = TrainingController::new(10, 4, 3, 3, &[0.01; 4], 123).unwrap();
    let loaded = round_trip(&learner);
    let result = learner.compare(&loaded);
    assert_eq!(result, Comparison::Equal, "code {}", result.code());
}

#[test]
fn test_round_trip_mid_pretraining() {
    let mut learner = TrainingController::new(10, 4, 2, 2, &[0.1; 3], 123).unwrap();
    train(&mut learner, 50);
    assert!(learner.phase().is_pretraining());
    assert!(learner.current_error().is_some());

    let loaded = round_trip(&learner);
    assert_eq!(learner.compare(&loaded), Comparison::Equal);
    assert_eq!(loaded.phase(), learner.phase());
    assert!(loaded.autoencoder().is_some());
}

#[test]
fn test_round_trip_after_fine_tuning() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("temp_deep.dat");

    let mut learner = TrainingController::new(10, 4, 2, 2, &[0.1; 3], 123).unwrap();
    train(&mut learner, 3_000);
    assert_eq!(learner.current_hidden_layer(), 2);
    assert!(learner.autoencoder().is_none());

    let written = save_checkpoint(&learner, &path).unwrap();
    assert_eq!(written as u64, std::fs::metadata(&path).unwrap().len());

    let loaded: TrainingController<Backprop> = load_checkpoint(&path).unwrap();
    let result = learner.compare(&loaded);
    assert_eq!(result.code(), 1, "mismatch {result:?}");
    assert_eq!(loaded.is_training_complete(), learner.is_training_complete());
    assert_eq!(loaded.history().samples(), learner.history().samples());
}

#[test]
fn test_resumed_training_matches_uninterrupted() {
    let mut learner = TrainingController::new(10, 4, 2, 2, &[0.1; 3], 123).unwrap();
    train(&mut learner, 80);

    let mut resumed = round_trip(&learner);
    train(&mut learner, 300);
    train(&mut resumed, 300);

    assert_eq!(learner.compare(&resumed), Comparison::Equal);
    assert_eq!(learner.current_hidden_layer(), resumed.current_hidden_layer());
}

#[test]
fn test_threshold_mismatch_detected() {
    let a = TrainingController::new(6, 3, 1, 2, &[0.1, 0.1], 5).unwrap();
    let b = TrainingController::new(6, 3, 1, 2, &[0.1, 0.2], 5).unwrap();
    assert_eq!(a.compare(&b), Comparison::ErrorThresholds);
    assert_eq!(a.compare(&b).code(), -10);
}

#[test]
fn test_different_seed_detected_as_network_mismatch() {
    let a = TrainingController::new(6, 3, 1, 2, &[0.1, 0.1], 5).unwrap();
    let b = TrainingController::new(6, 3, 1, 2, &[0.1, 0.1], 6).unwrap();
    assert_eq!(a.compare(&b), Comparison::Network);
}

#[test]
fn test_truncated_checkpoint_is_corrupt() {
    let mut learner = TrainingController::new(6, 3, 1, 2, &[0.1, 0.1], 5).unwrap();
    train(&mut learner, 20);
    let mut buf = Vec::new();
    learner.save(&mut buf).unwrap();

    // dropping the last history sample underruns the stream
    buf.pop();
    let result = TrainingController::<Backprop>::load(&mut Cursor::new(buf));
    assert!(matches!(result, Err(DeepLearnError::CorruptState(_))));
}
