//! Reference feed-forward network trained by backpropagation.
//!
//! ## Layout
//!
//! ```text
//! dims = [inputs, hidden, ..., hidden, outputs]
//! w[l]: shape (dims[l+1], dims[l])   b[l]: shape (dims[l+1])
//! a[l] = sigmoid(w[l] · a[l-1] + b[l]),  a[-1] = inputs
//! ```
//!
//! Every layer uses the logistic sigmoid, so unit values live in `(0, 1)`.
//! The per-step error is the mean absolute output error; the running average
//! is an exponential moving average of it.

use super::Network;
use crate::error::{DeepLearnError, DeepLearnResult};
use crate::utils::{bits_eq, d_sigmoid_from_output, decode_error, encode_error, sigmoid};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Read, Write};

/// Default weight learning rate.
pub const DEFAULT_LEARNING_RATE: f32 = 0.2;

/// Weight given to the newest error in the running average.
const ERROR_AVERAGE_RATE: f32 = 0.01;

/// A fully connected sigmoid network.
pub struct Backprop {
    /// Layer widths: [inputs, hidden x hidden_layers, outputs]
    dims: Vec<usize>,
    /// Width of each hidden layer (kept even when there are none)
    hidden_units: usize,
    /// w[l] maps layer l onto layer l+1
    w: Vec<Array2<f32>>,
    b: Vec<Array1<f32>>,
    inputs: Array1<f32>,
    targets: Array1<f32>,
    /// a[l]: activations of layer l+1 from the last forward pass
    a: Vec<Array1<f32>>,
    learning_rate: f32,
    dropout_percent: f32,
    last_error: Option<f32>,
    error_average: Option<f32>,
    steps: u32,
    seed: u64,
    rng: StdRng,
}

impl std::fmt::Debug for Backprop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backprop")
            .field("dims", &self.dims)
            .field("w", &format!("<{} weight matrices>", self.w.len()))
            .field("learning_rate", &self.learning_rate)
            .field("dropout_percent", &self.dropout_percent)
            .field("error_average", &self.error_average)
            .field("steps", &self.steps)
            .finish()
    }
}

impl Backprop {
    /// Create a network with `hidden_layers` hidden layers of `hidden_units` each.
    ///
    /// Weights use Xavier/Glorot uniform initialization drawn from a generator
    /// seeded with `seed`, so construction is deterministic. Biases start at zero.
    ///
    /// # Errors
    /// - `InvalidConfig` if any required layer would have zero units
    pub fn new(
        inputs: usize,
        hidden_units: usize,
        hidden_layers: usize,
        outputs: usize,
        seed: u64,
    ) -> DeepLearnResult<Self> {
        if inputs == 0 || outputs == 0 {
            return Err(DeepLearnError::InvalidConfig(
                "Network needs at least one input and one output unit".to_string(),
            ));
        }
        if hidden_layers > 0 && hidden_units == 0 {
            return Err(DeepLearnError::InvalidConfig(
                "Hidden layers must have at least one unit".to_string(),
            ));
        }

        let mut dims = Vec::with_capacity(hidden_layers + 2);
        dims.push(inputs);
        dims.extend(std::iter::repeat(hidden_units).take(hidden_layers));
        dims.push(outputs);

        Ok(Self::build(dims, hidden_units, seed))
    }

    /// Allocate and randomly initialize a network for already-validated dims.
    fn build(dims: Vec<usize>, hidden_units: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut w = Vec::with_capacity(dims.len() - 1);
        let mut b = Vec::with_capacity(dims.len() - 1);

        for l in 0..dims.len() - 1 {
            let fan_in = dims[l];
            let fan_out = dims[l + 1];
            let limit = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
            let dist = Uniform::new(-limit, limit);
            w.push(Array2::random_using((fan_out, fan_in), dist, &mut rng));
            b.push(Array1::zeros(fan_out));
        }

        let a = dims[1..].iter().map(|&d| Array1::zeros(d)).collect();
        let inputs = Array1::zeros(dims[0]);
        let targets = Array1::zeros(dims[dims.len() - 1]);

        Self {
            dims,
            hidden_units,
            w,
            b,
            inputs,
            targets,
            a,
            learning_rate: DEFAULT_LEARNING_RATE,
            dropout_percent: 0.0,
            last_error: None,
            error_average: None,
            steps: 0,
            seed,
            rng,
        }
    }

    /// Layer widths, inputs first.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn input_count(&self) -> usize {
        self.dims[0]
    }

    pub fn output_count(&self) -> usize {
        self.dims[self.dims.len() - 1]
    }

    pub fn hidden_units(&self) -> usize {
        self.hidden_units
    }

    /// Weight matrix feeding layer `layer + 1`.
    pub fn weights(&self, layer: usize) -> &Array2<f32> {
        &self.w[layer]
    }

    pub fn biases(&self, layer: usize) -> &Array1<f32> {
        &self.b[layer]
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn dropout_percent(&self) -> f32 {
        self.dropout_percent
    }

    /// Mean absolute output error of the most recent step.
    pub fn last_error(&self) -> Option<f32> {
        self.last_error
    }

    /// Activations arriving at weight layer `layer`, computed without dropout.
    fn propagate_to(&self, layer: usize) -> Array1<f32> {
        let mut current = self.inputs.clone();
        for l in 0..layer {
            let mut next = self.w[l].dot(&current) + &self.b[l];
            next.mapv_inplace(sigmoid);
            current = next;
        }
        current
    }

    /// Forward pass; when `training` hidden units are dropped at random.
    fn forward(&mut self, training: bool) {
        let last = self.w.len() - 1;
        let mut current = self.inputs.clone();

        for l in 0..=last {
            let mut next = self.w[l].dot(&current) + &self.b[l];
            next.mapv_inplace(sigmoid);

            if training && l < last && self.dropout_percent > 0.0 {
                let percent = self.dropout_percent;
                let rng = &mut self.rng;
                next.mapv_inplace(|v| {
                    if rng.gen::<f32>() * 100.0 < percent {
                        0.0
                    } else {
                        v
                    }
                });
            }

            self.a[l] = next.clone();
            current = next;
        }
    }

    /// Forward, backpropagate, and apply one gradient-descent update.
    ///
    /// Dropped units carry zero activation, so their sigmoid derivative and
    /// outgoing weight gradients vanish for this step.
    fn train_step(&mut self) {
        self.forward(true);

        let last = self.w.len() - 1;
        let diff = &self.targets - &self.a[last];
        let error = diff.mapv(f32::abs).mean().unwrap_or(0.0);
        let mut delta = &diff * &self.a[last].mapv(d_sigmoid_from_output);

        for l in (0..=last).rev() {
            let layer_input = if l == 0 { &self.inputs } else { &self.a[l - 1] };

            // Outer product: delta ⊗ input, shape (dims[l+1], dims[l])
            let delta_col = delta.view().insert_axis(Axis(1));
            let input_row = layer_input.view().insert_axis(Axis(0));
            let delta_w = &delta_col * &input_row;

            let next_delta = if l > 0 {
                let back = self.w[l].t().dot(&delta);
                Some(back * &self.a[l - 1].mapv(d_sigmoid_from_output))
            } else {
                None
            };

            self.w[l] += &(self.learning_rate * &delta_w);
            self.b[l].scaled_add(self.learning_rate, &delta);

            if let Some(d) = next_delta {
                delta = d;
            }
        }

        self.last_error = Some(error);
        self.error_average = Some(match self.error_average {
            None => error,
            Some(avg) => avg + (error - avg) * ERROR_AVERAGE_RATE,
        });
        self.steps = self.steps.saturating_add(1);
    }
}

fn write_matrix<W: Write>(writer: &mut W, m: &Array2<f32>) -> io::Result<usize> {
    for &v in m.iter() {
        writer.write_f32::<LittleEndian>(v)?;
    }
    Ok(m.len() * 4)
}

fn write_vector<W: Write>(writer: &mut W, v: &Array1<f32>) -> io::Result<usize> {
    for &x in v.iter() {
        writer.write_f32::<LittleEndian>(x)?;
    }
    Ok(v.len() * 4)
}

fn read_values<R: Read>(reader: &mut R, count: usize) -> io::Result<Vec<f32>> {
    // grow as values arrive so a corrupt count cannot force a huge allocation
    let mut values = Vec::new();
    for _ in 0..count {
        values.push(reader.read_f32::<LittleEndian>()?);
    }
    Ok(values)
}

fn read_count<R: Read>(reader: &mut R, what: &str) -> io::Result<usize> {
    let raw = reader.read_i32::<LittleEndian>()?;
    usize::try_from(raw).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Negative {what} count: {raw}"),
        )
    })
}

fn arrays_bits_eq<'a>(
    a: impl Iterator<Item = &'a f32>,
    b: impl Iterator<Item = &'a f32>,
) -> bool {
    a.zip(b).all(|(x, y)| bits_eq(*x, *y))
}

impl Network for Backprop {
    fn hidden_layer_count(&self) -> usize {
        self.dims.len() - 2
    }

    fn running_average_error(&self) -> Option<f32> {
        self.error_average
    }

    fn steps_taken(&self) -> u32 {
        self.steps
    }

    fn feed_forward(&mut self) {
        self.forward(false);
    }

    fn step(&mut self) {
        self.train_step();
    }

    fn set_input(&mut self, index: usize, value: f32) {
        self.inputs[index] = value;
    }

    fn set_output(&mut self, index: usize, value: f32) {
        self.targets[index] = value;
    }

    fn output(&self, index: usize) -> f32 {
        self.a[self.a.len() - 1][index]
    }

    /// The autoencoder maps `dims[layer]` units through `dims[layer + 1]`
    /// hidden units back to `dims[layer]`. Its encoder is a copy of `w[layer]`;
    /// the decoder is freshly initialized.
    ///
    /// `layer` must name a hidden layer.
    fn create_autoencoder(&self, layer: usize) -> Self {
        let visible = self.dims[layer];
        let hidden = self.dims[layer + 1];
        let seed = self.seed.wrapping_add(layer as u64 + 1);

        let mut autoencoder = Self::build(vec![visible, hidden, visible], hidden, seed);
        autoencoder.w[0].assign(&self.w[layer]);
        autoencoder.b[0].assign(&self.b[layer]);
        autoencoder.learning_rate = self.learning_rate;
        autoencoder.dropout_percent = self.dropout_percent;
        autoencoder
    }

    fn pretrain(&mut self, autoencoder: &mut Self, layer: usize) {
        let visible = self.propagate_to(layer);
        autoencoder.inputs.assign(&visible);
        autoencoder.targets.assign(&visible);
        autoencoder.train_step();
    }

    fn promote_from_autoencoder(&mut self, autoencoder: &Self, layer: usize) {
        self.w[layer].assign(&autoencoder.w[0]);
        self.b[layer].assign(&autoencoder.b[0]);
    }

    fn set_learning_rate(&mut self, rate: f32) {
        self.learning_rate = rate;
    }

    fn set_dropout_percent(&mut self, percent: f32) {
        self.dropout_percent = percent;
    }

    /// Layout (little-endian): inputs, hidden units, hidden layers, outputs
    /// as `i32`; learning rate, dropout, running error as `f32`; steps `u32`;
    /// seed `u64`; then each weight matrix row-major followed by its biases.
    fn save<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let to_i32 = |v: usize| {
            i32::try_from(v).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("Unit count {v} too large"))
            })
        };

        writer.write_i32::<LittleEndian>(to_i32(self.input_count())?)?;
        writer.write_i32::<LittleEndian>(to_i32(self.hidden_units)?)?;
        writer.write_i32::<LittleEndian>(to_i32(self.hidden_layer_count())?)?;
        writer.write_i32::<LittleEndian>(to_i32(self.output_count())?)?;
        writer.write_f32::<LittleEndian>(self.learning_rate)?;
        writer.write_f32::<LittleEndian>(self.dropout_percent)?;
        writer.write_f32::<LittleEndian>(encode_error(self.error_average))?;
        writer.write_u32::<LittleEndian>(self.steps)?;
        writer.write_u64::<LittleEndian>(self.seed)?;
        let mut written = 4 * 8 + 8;

        for (w, b) in self.w.iter().zip(self.b.iter()) {
            written += write_matrix(writer, w)?;
            written += write_vector(writer, b)?;
        }

        Ok(written)
    }

    /// The dropout RNG is not stored; it is reseeded from `seed + steps`.
    /// A run resumed with dropout above zero therefore draws different masks
    /// than an uninterrupted one, and `equals` does not see the difference.
    fn load<R: Read>(reader: &mut R) -> io::Result<Self> {
        let inputs = read_count(reader, "input")?;
        let hidden_units = read_count(reader, "hidden unit")?;
        let hidden_layers = read_count(reader, "hidden layer")?;
        let outputs = read_count(reader, "output")?;
        if inputs == 0 || outputs == 0 || (hidden_layers > 0 && hidden_units == 0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Network shape has an empty layer",
            ));
        }

        let learning_rate = reader.read_f32::<LittleEndian>()?;
        let dropout_percent = reader.read_f32::<LittleEndian>()?;
        let error_average = decode_error(reader.read_f32::<LittleEndian>()?);
        let steps = reader.read_u32::<LittleEndian>()?;
        let seed = reader.read_u64::<LittleEndian>()?;

        let mut dims = Vec::new();
        dims.push(inputs);
        dims.extend(std::iter::repeat(hidden_units).take(hidden_layers));
        dims.push(outputs);

        let mut w = Vec::new();
        let mut b = Vec::new();
        for l in 0..dims.len() - 1 {
            let (rows, cols) = (dims[l + 1], dims[l]);
            let count = rows.checked_mul(cols).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "Weight matrix size overflows")
            })?;
            let values = read_values(reader, count)?;
            let matrix = Array2::from_shape_vec((rows, cols), values)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            w.push(matrix);
            b.push(Array1::from(read_values(reader, rows)?));
        }

        let a = dims[1..].iter().map(|&d| Array1::zeros(d)).collect();
        Ok(Self {
            inputs: Array1::zeros(inputs),
            targets: Array1::zeros(outputs),
            dims,
            hidden_units,
            w,
            b,
            a,
            learning_rate,
            dropout_percent,
            last_error: None,
            error_average,
            steps,
            seed,
            rng: StdRng::seed_from_u64(seed.wrapping_add(u64::from(steps))),
        })
    }

    fn equals(&self, other: &Self) -> bool {
        self.dims == other.dims
            && self.hidden_units == other.hidden_units
            && self.steps == other.steps
            && self.seed == other.seed
            && bits_eq(self.learning_rate, other.learning_rate)
            && bits_eq(self.dropout_percent, other.dropout_percent)
            && crate::utils::optional_bits_eq(self.error_average, other.error_average)
            && self
                .w
                .iter()
                .zip(other.w.iter())
                .all(|(x, y)| arrays_bits_eq(x.iter(), y.iter()))
            && self
                .b
                .iter()
                .zip(other.b.iter())
                .all(|(x, y)| arrays_bits_eq(x.iter(), y.iter()))
    }
}
