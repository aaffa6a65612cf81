//! Network capability consumed by the training controller.
//!
//! The controller never touches weights directly. Everything numeric goes
//! through [`Network`]: one training step, forward passes, unit I/O,
//! autoencoder construction and promotion, and binary persistence.
//!
//! [`Backprop`] is the reference engine: a fully connected sigmoid network
//! trained by online gradient descent.

mod backprop;

pub use backprop::{Backprop, DEFAULT_LEARNING_RATE};

use std::io::{self, Read, Write};

/// Operations a network engine must provide to be driven through
/// greedy layer-wise pretraining.
///
/// The same type plays two roles: the full target network and the transient
/// single-hidden-layer autoencoder built for one hidden layer at a time.
pub trait Network: Sized {
    /// Number of hidden layers (autoencoders report 1).
    fn hidden_layer_count(&self) -> usize;

    /// Smoothed training error, or `None` before the first step.
    fn running_average_error(&self) -> Option<f32>;

    /// Training steps taken by this network.
    fn steps_taken(&self) -> u32;

    /// Propagate the current inputs through to the outputs.
    fn feed_forward(&mut self);

    /// One supervised update against the current inputs and targets.
    fn step(&mut self);

    fn set_input(&mut self, index: usize, value: f32);

    /// Set the training target of an output unit.
    fn set_output(&mut self, index: usize, value: f32);

    fn output(&self, index: usize) -> f32;

    /// Build an autoencoder whose encoder starts from hidden layer `layer`.
    fn create_autoencoder(&self, layer: usize) -> Self;

    /// One unsupervised step of `autoencoder`, fed with the activations
    /// arriving at hidden layer `layer` for the current inputs.
    fn pretrain(&mut self, autoencoder: &mut Self, layer: usize);

    /// Copy the trained encoder of `autoencoder` into hidden layer `layer`.
    fn promote_from_autoencoder(&mut self, autoencoder: &Self, layer: usize);

    fn set_learning_rate(&mut self, rate: f32);

    /// Percentage of hidden units dropped during training, in `[0, 100]`.
    fn set_dropout_percent(&mut self, percent: f32);

    /// Serialize to `writer`, returning the number of bytes written.
    fn save<W: Write>(&self, writer: &mut W) -> io::Result<usize>;

    /// Deserialize a network previously written by [`Network::save`].
    fn load<R: Read>(reader: &mut R) -> io::Result<Self>;

    /// Structural and bit-for-bit parameter equality.
    fn equals(&self, other: &Self) -> bool;
}
