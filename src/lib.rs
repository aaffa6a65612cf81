//! # deeplearn
//!
//! Greedy layer-wise pretraining of feed-forward networks with resumable checkpoints.
//!
//! ## Overview
//!
//! Each hidden layer is first trained on its own as an autoencoder that learns to
//! reconstruct the activations feeding it. When the autoencoder's running error
//! settles under that layer's threshold, its encoder weights seed the layer in the
//! full network and the next layer begins. Once every hidden layer is seeded, the
//! whole network is fine-tuned against supervised targets.
//!
//! The controller owns the schedule, a constant-memory error history, and a binary
//! save/load format that reproduces every field bit for bit.
//!
//! ## Structure
//!
//! - [`core`]: Network capability trait and the reference backprop engine
//! - [`training`]: Phase state machine, hyperparameters, comparison
//! - [`history`]: Decimating error history and series export
//! - [`checkpoint`]: Binary persistence of the whole controller
//! - [`utils`]: Activations and float helpers

pub mod checkpoint;
pub mod core;
pub mod error;
pub mod history;
pub mod training;
pub mod utils;

pub use crate::core::{Backprop, Network, DEFAULT_LEARNING_RATE};
pub use checkpoint::{load_checkpoint, load_checkpoint_with_config, save_checkpoint};
pub use error::{DeepLearnError, DeepLearnResult};
pub use history::{HistoryRecorder, HistorySeries, DEFAULT_HISTORY_CAPACITY};
pub use training::{Comparison, Phase, TrainingController};

use serde::{Deserialize, Serialize};

/// Default number of autoencoder steps required before a layer may be promoted.
pub const DEFAULT_WARMUP_STEPS: u32 = 100;

/// Controller configuration.
///
/// Hyperparameters are applied to the target network and to every autoencoder
/// the controller creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub learning_rate: f32,
    /// Percentage of hidden units dropped during training, `[0, 100]`
    pub dropout_percent: f32,
    /// Autoencoder steps that must be exceeded before promotion
    pub warmup_steps: u32,
    /// Samples kept by the error history before compaction
    pub history_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            dropout_percent: 0.0,
            warmup_steps: DEFAULT_WARMUP_STEPS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl Config {
    /// Reject values the controller cannot run with.
    ///
    /// # Errors
    /// - `InvalidConfig` for a zero history capacity, a non-finite or negative
    ///   learning rate, or a dropout percentage outside `[0, 100]`
    pub fn validate(&self) -> DeepLearnResult<()> {
        if self.history_capacity == 0 {
            return Err(DeepLearnError::InvalidConfig(
                "History capacity must be at least 1".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(DeepLearnError::InvalidConfig(format!(
                "Learning rate must be a non-negative number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=100.0).contains(&self.dropout_percent) {
            return Err(DeepLearnError::InvalidConfig(format!(
                "Dropout must be within [0, 100], got {}",
                self.dropout_percent
            )));
        }
        Ok(())
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> DeepLearnResult<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| DeepLearnError::InvalidConfig(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}
