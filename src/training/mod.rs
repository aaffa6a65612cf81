//! Greedy layer-wise training controller.
//!
//! ## Phases
//!
//! ```text
//! Pretraining{0} ──(promote)──▶ Pretraining{1} ── ... ──▶ FineTuning ──(error < threshold)──▶ complete
//! ```
//!
//! While pretraining layer `l`, a transient autoencoder learns to reconstruct
//! the activations arriving at `l`. Once its running error is under
//! `error_thresholds[l]` and it has taken more than `warmup_steps` steps, its
//! encoder is copied into the target network and the next layer begins.
//! After the last hidden layer the whole network is trained end to end until
//! its error falls under the final threshold.

use crate::core::{Backprop, Network};
use crate::error::{DeepLearnError, DeepLearnResult};
use crate::history::HistoryRecorder;
use crate::utils::{bits_eq, optional_bits_eq};
use crate::Config;
use tracing::{info, warn};

/// Where the controller is in the training schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Training the autoencoder for hidden layer `layer`.
    Pretraining { layer: usize },
    /// Supervised training of the whole network.
    FineTuning,
}

impl Phase {
    /// Phase a fresh controller starts in.
    pub fn initial(hidden_layers: usize) -> Self {
        Self::at_layer(0, hidden_layers)
    }

    /// Phase for a hidden-layer cursor in `[0, hidden_layers]`.
    pub fn at_layer(layer: usize, hidden_layers: usize) -> Self {
        if layer < hidden_layers {
            Phase::Pretraining { layer }
        } else {
            Phase::FineTuning
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Pretraining { .. } => "pretraining",
            Phase::FineTuning => "fine-tuning",
        }
    }

    pub fn is_pretraining(&self) -> bool {
        matches!(self, Phase::Pretraining { .. })
    }
}

/// Outcome of [`TrainingController::compare`].
///
/// Fields are checked in declaration order and the first mismatch is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    HiddenLayer,
    CurrentError,
    Network,
    AutoencoderPresence,
    HistoryWriteIndex,
    HistoryStrideCounter,
    HistorySampleStride,
    HistorySamples,
    StepCount,
    ErrorThresholds,
}

impl Comparison {
    /// Numeric status: `1` when equal, `-1..=-10` naming the first mismatch.
    pub fn code(self) -> i32 {
        match self {
            Comparison::Equal => 1,
            Comparison::HiddenLayer => -1,
            Comparison::CurrentError => -2,
            Comparison::Network => -3,
            Comparison::AutoencoderPresence => -4,
            Comparison::HistoryWriteIndex => -5,
            Comparison::HistoryStrideCounter => -6,
            Comparison::HistorySampleStride => -7,
            Comparison::HistorySamples => -8,
            Comparison::StepCount => -9,
            Comparison::ErrorThresholds => -10,
        }
    }

    pub fn is_equal(self) -> bool {
        self == Comparison::Equal
    }
}

/// Drives pretraining and fine-tuning of one target network.
#[derive(Debug)]
pub struct TrainingController<N: Network = Backprop> {
    /// The model being trained
    pub(crate) network: N,
    /// Present only while a hidden layer is being pretrained
    pub(crate) autoencoder: Option<N>,
    pub(crate) phase: Phase,
    /// One threshold per hidden layer plus one for the output layer
    pub(crate) error_thresholds: Vec<f32>,
    /// `None` until the running error is meaningful again
    pub(crate) current_error: Option<f32>,
    pub(crate) training_complete: bool,
    pub(crate) step_count: u32,
    pub(crate) history: HistoryRecorder,
    pub(crate) warmup_steps: u32,
}

impl TrainingController<Backprop> {
    /// Create a controller around a new [`Backprop`] network with default [`Config`].
    ///
    /// # Errors
    /// - `InvalidConfig` if `error_thresholds.len() != hidden_layers + 1`
    ///   or a layer would be empty
    pub fn new(
        inputs: usize,
        hidden_units: usize,
        hidden_layers: usize,
        outputs: usize,
        error_thresholds: &[f32],
        seed: u64,
    ) -> DeepLearnResult<Self> {
        Self::with_config(
            inputs,
            hidden_units,
            hidden_layers,
            outputs,
            error_thresholds,
            seed,
            &Config::default(),
        )
    }

    /// Create a controller around a new [`Backprop`] network.
    ///
    /// Thresholds and config are checked before any network is allocated.
    pub fn with_config(
        inputs: usize,
        hidden_units: usize,
        hidden_layers: usize,
        outputs: usize,
        error_thresholds: &[f32],
        seed: u64,
        config: &Config,
    ) -> DeepLearnResult<Self> {
        check_thresholds(error_thresholds, hidden_layers)?;
        config.validate()?;

        let network = Backprop::new(inputs, hidden_units, hidden_layers, outputs, seed)?;
        Self::with_network(network, error_thresholds, config)
    }
}

fn check_thresholds(error_thresholds: &[f32], hidden_layers: usize) -> DeepLearnResult<()> {
    if error_thresholds.len() != hidden_layers + 1 {
        return Err(DeepLearnError::InvalidConfig(format!(
            "Expected {} error thresholds (one per hidden layer plus output), got {}",
            hidden_layers + 1,
            error_thresholds.len()
        )));
    }
    Ok(())
}

impl<N: Network> TrainingController<N> {
    /// Take ownership of an existing network and start pretraining its first hidden layer.
    pub fn with_network(
        mut network: N,
        error_thresholds: &[f32],
        config: &Config,
    ) -> DeepLearnResult<Self> {
        let hidden_layers = network.hidden_layer_count();
        check_thresholds(error_thresholds, hidden_layers)?;
        config.validate()?;

        network.set_learning_rate(config.learning_rate);
        network.set_dropout_percent(config.dropout_percent);

        let phase = Phase::initial(hidden_layers);
        let autoencoder = match phase {
            Phase::Pretraining { layer } => Some(network.create_autoencoder(layer)),
            Phase::FineTuning => None,
        };

        Ok(Self {
            network,
            autoencoder,
            phase,
            error_thresholds: error_thresholds.to_vec(),
            current_error: None,
            training_complete: false,
            step_count: 0,
            history: HistoryRecorder::with_capacity(config.history_capacity),
            warmup_steps: config.warmup_steps,
        })
    }

    /// Advance training by one step.
    ///
    /// Does nothing once training is complete.
    pub fn update(&mut self) {
        if self.training_complete {
            return;
        }

        match self.phase {
            Phase::Pretraining { layer } => self.pretrain_step(layer),
            Phase::FineTuning => self.fine_tune_step(),
        }

        self.history.record(self.current_error.unwrap_or(0.0));
        self.step_count = self.step_count.saturating_add(1);
    }

    fn pretrain_step(&mut self, layer: usize) {
        let network = &mut self.network;
        let autoencoder = self.autoencoder.get_or_insert_with(|| {
            warn!(layer, "Pretraining without an autoencoder; rebuilding it");
            network.create_autoencoder(layer)
        });

        network.pretrain(autoencoder, layer);
        self.current_error = autoencoder.running_average_error();

        // the running average needs enough samples before a dip can be trusted
        let below_threshold =
            matches!(self.current_error, Some(e) if e < self.error_thresholds[layer]);
        if below_threshold && autoencoder.steps_taken() > self.warmup_steps {
            self.promote(layer);
        }
    }

    /// Copy the trained encoder into `layer` and move to the next phase.
    fn promote(&mut self, layer: usize) {
        let error = self.current_error;
        if let Some(autoencoder) = self.autoencoder.take() {
            self.network.promote_from_autoencoder(&autoencoder, layer);
        }

        let hidden_layers = self.network.hidden_layer_count();
        self.phase = Phase::at_layer(layer + 1, hidden_layers);
        if let Phase::Pretraining { layer: next } = self.phase {
            self.autoencoder = Some(self.network.create_autoencoder(next));
        }
        self.current_error = None;

        info!(
            layer,
            error = ?error,
            step = self.step_count,
            next = self.phase.name(),
            "Promoted pretrained layer"
        );
    }

    fn fine_tune_step(&mut self) {
        self.network.step();
        self.current_error = self.network.running_average_error();

        let threshold = self.error_thresholds[self.error_thresholds.len() - 1];
        if matches!(self.current_error, Some(e) if e < threshold) {
            self.training_complete = true;
            info!(
                error = ?self.current_error,
                step = self.step_count,
                "Training complete"
            );
        }
    }

    /// Run the target network forward on its current inputs.
    pub fn feed_forward(&mut self) {
        self.network.feed_forward();
    }

    pub fn set_input(&mut self, index: usize, value: f32) {
        self.network.set_input(index, value);
    }

    /// Set inputs `0..values.len()`.
    pub fn set_inputs(&mut self, values: &[f32]) {
        for (i, &v) in values.iter().enumerate() {
            self.network.set_input(i, v);
        }
    }

    /// Set the fine-tuning target of an output unit.
    pub fn set_output(&mut self, index: usize, value: f32) {
        self.network.set_output(index, value);
    }

    pub fn output(&self, index: usize) -> f32 {
        self.network.output(index)
    }

    /// Apply a learning rate to the target network and any active autoencoder.
    pub fn set_learning_rate(&mut self, rate: f32) {
        self.network.set_learning_rate(rate);
        if let Some(autoencoder) = self.autoencoder.as_mut() {
            autoencoder.set_learning_rate(rate);
        }
    }

    /// Apply a dropout percentage to the target network and any active autoencoder.
    pub fn set_dropout_percent(&mut self, percent: f32) {
        self.network.set_dropout_percent(percent);
        if let Some(autoencoder) = self.autoencoder.as_mut() {
            autoencoder.set_dropout_percent(percent);
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn hidden_layer_count(&self) -> usize {
        self.network.hidden_layer_count()
    }

    /// Hidden layer being pretrained, or `hidden_layer_count()` once fine-tuning.
    pub fn current_hidden_layer(&self) -> usize {
        match self.phase {
            Phase::Pretraining { layer } => layer,
            Phase::FineTuning => self.hidden_layer_count(),
        }
    }

    pub fn current_error(&self) -> Option<f32> {
        self.current_error
    }

    pub fn is_training_complete(&self) -> bool {
        self.training_complete
    }

    /// Number of `update` calls that did work (saturating).
    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn error_thresholds(&self) -> &[f32] {
        &self.error_thresholds
    }

    pub fn warmup_steps(&self) -> u32 {
        self.warmup_steps
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn autoencoder(&self) -> Option<&N> {
        self.autoencoder.as_ref()
    }

    /// Field-by-field equality, short-circuiting on the first mismatch.
    ///
    /// Autoencoders are compared by presence only.
    pub fn compare(&self, other: &Self) -> Comparison {
        if self.current_hidden_layer() != other.current_hidden_layer() {
            return Comparison::HiddenLayer;
        }
        if !optional_bits_eq(self.current_error, other.current_error) {
            return Comparison::CurrentError;
        }
        if !self.network.equals(&other.network) {
            return Comparison::Network;
        }
        if self.autoencoder.is_some() != other.autoencoder.is_some() {
            return Comparison::AutoencoderPresence;
        }
        if self.history.len() != other.history.len() {
            return Comparison::HistoryWriteIndex;
        }
        if self.history.stride_counter() != other.history.stride_counter() {
            return Comparison::HistoryStrideCounter;
        }
        if self.history.sample_stride() != other.history.sample_stride() {
            return Comparison::HistorySampleStride;
        }
        let samples_match = self
            .history
            .samples()
            .iter()
            .zip(other.history.samples())
            .all(|(a, b)| bits_eq(*a, *b));
        if !samples_match {
            return Comparison::HistorySamples;
        }
        if self.step_count != other.step_count {
            return Comparison::StepCount;
        }
        let thresholds_match = self.error_thresholds.len() == other.error_thresholds.len()
            && self
                .error_thresholds
                .iter()
                .zip(&other.error_thresholds)
                .all(|(a, b)| bits_eq(*a, *b));
        if !thresholds_match {
            return Comparison::ErrorThresholds;
        }
        Comparison::Equal
    }
}
