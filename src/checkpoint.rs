//! Binary save/load of a training controller.
//!
//! ## Layout
//!
//! Fixed-width little-endian fields, no padding, in this order:
//!
//! ```text
//! training_complete     i32
//! step_count            u32
//! current_hidden_layer  i32
//! current_error         f32   (9999.0 when unknown)
//! <target network>
//! has_autoencoder       i32
//! [<autoencoder>]             (only when has_autoencoder == 1)
//! error_thresholds      f32 x (hidden_layers + 1)
//! history_write_index   i32
//! history_stride_ctr    i32
//! history_sample_stride i32
//! history_samples       f32 x history_write_index
//! ```
//!
//! The format is not versioned. Loading checks only that every field can be
//! read and represented; whether the fields agree with each other is left to
//! [`TrainingController::compare`].
//!
//! History capacity and warm-up length are not stored. A controller built with
//! a non-default [`Config`] must be loaded with the same config through
//! [`TrainingController::load_with_config`] or [`load_checkpoint_with_config`].

use crate::core::Network;
use crate::error::{DeepLearnError, DeepLearnResult};
use crate::history::HistoryRecorder;
use crate::training::{Phase, TrainingController};
use crate::utils::{decode_error, encode_error};
use crate::Config;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

fn to_i32(value: usize, what: &str) -> io::Result<i32> {
    i32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{what} {value} does not fit the checkpoint format"),
        )
    })
}

fn read_i32<R: Read>(reader: &mut R, what: &str) -> DeepLearnResult<i32> {
    reader
        .read_i32::<LittleEndian>()
        .map_err(|e| DeepLearnError::from_read(e, what))
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> DeepLearnResult<u32> {
    reader
        .read_u32::<LittleEndian>()
        .map_err(|e| DeepLearnError::from_read(e, what))
}

fn read_f32<R: Read>(reader: &mut R, what: &str) -> DeepLearnResult<f32> {
    reader
        .read_f32::<LittleEndian>()
        .map_err(|e| DeepLearnError::from_read(e, what))
}

/// Read an `i32` that must be non-negative.
fn read_index<R: Read>(reader: &mut R, what: &str) -> DeepLearnResult<usize> {
    let raw = read_i32(reader, what)?;
    usize::try_from(raw)
        .map_err(|_| DeepLearnError::CorruptState(format!("{what} is negative: {raw}")))
}

impl<N: Network> TrainingController<N> {
    /// Write the controller to `writer`, returning the number of bytes written.
    pub fn save<W: Write>(&self, writer: &mut W) -> DeepLearnResult<usize> {
        writer.write_i32::<LittleEndian>(i32::from(self.training_complete))?;
        writer.write_u32::<LittleEndian>(self.step_count)?;
        writer.write_i32::<LittleEndian>(to_i32(self.current_hidden_layer(), "Hidden layer")?)?;
        writer.write_f32::<LittleEndian>(encode_error(self.current_error))?;
        let mut written = 16;

        written += self.network.save(writer)?;
        match &self.autoencoder {
            Some(autoencoder) => {
                writer.write_i32::<LittleEndian>(1)?;
                written += 4 + autoencoder.save(writer)?;
            }
            None => {
                writer.write_i32::<LittleEndian>(0)?;
                written += 4;
            }
        }

        for &threshold in &self.error_thresholds {
            writer.write_f32::<LittleEndian>(threshold)?;
        }
        written += self.error_thresholds.len() * 4;

        let history = &self.history;
        writer.write_i32::<LittleEndian>(to_i32(history.len(), "History index")?)?;
        writer.write_i32::<LittleEndian>(to_i32(history.stride_counter() as usize, "History counter")?)?;
        writer.write_i32::<LittleEndian>(to_i32(history.sample_stride() as usize, "History stride")?)?;
        for &sample in history.samples() {
            writer.write_f32::<LittleEndian>(sample)?;
        }
        written += 12 + history.len() * 4;

        debug!(bytes = written, step = self.step_count, "Saved controller");
        Ok(written)
    }

    /// Read a controller written by [`TrainingController::save`], using the default [`Config`].
    ///
    /// # Errors
    /// - `CorruptState` if the stream ends early or a field cannot be represented
    /// - `Io` for other stream failures
    pub fn load<R: Read>(reader: &mut R) -> DeepLearnResult<Self> {
        Self::load_with_config(reader, &Config::default())
    }

    /// Read a controller, taking warm-up length and history capacity from `config`.
    ///
    /// Learning rate and dropout come from the persisted networks. Neither
    /// config field is part of the stream, so `compare` cannot detect a
    /// mismatch; pass the config the controller was built with.
    ///
    /// # Errors
    /// - `CorruptState` also when the stored history does not fit
    ///   `config.history_capacity`
    pub fn load_with_config<R: Read>(reader: &mut R, config: &Config) -> DeepLearnResult<Self> {
        config.validate()?;

        let training_complete = read_i32(reader, "training flag")? != 0;
        let step_count = read_u32(reader, "step count")?;
        let current_hidden_layer = read_index(reader, "current hidden layer")?;
        let current_error = decode_error(read_f32(reader, "current error")?);

        let network = N::load(reader).map_err(|e| DeepLearnError::from_read(e, "target network"))?;
        let hidden_layers = network.hidden_layer_count();
        if current_hidden_layer > hidden_layers {
            return Err(DeepLearnError::CorruptState(format!(
                "Hidden layer {current_hidden_layer} beyond network with {hidden_layers} hidden layers"
            )));
        }

        let autoencoder = if read_i32(reader, "autoencoder flag")? == 1 {
            Some(N::load(reader).map_err(|e| DeepLearnError::from_read(e, "autoencoder"))?)
        } else {
            None
        };

        let mut error_thresholds = Vec::with_capacity(hidden_layers + 1);
        for _ in 0..=hidden_layers {
            error_thresholds.push(read_f32(reader, "error threshold")?);
        }

        let write_index = read_index(reader, "history index")?;
        let stride_counter = read_index(reader, "history counter")? as u32;
        let sample_stride = read_index(reader, "history stride")? as u32;
        if write_index >= config.history_capacity {
            return Err(DeepLearnError::CorruptState(format!(
                "History index {write_index} exceeds capacity {}",
                config.history_capacity
            )));
        }
        let mut samples = Vec::with_capacity(write_index);
        for _ in 0..write_index {
            samples.push(read_f32(reader, "history sample")?);
        }
        let history = HistoryRecorder::from_parts(
            config.history_capacity,
            write_index,
            stride_counter,
            sample_stride,
            &samples,
        )
        .ok_or_else(|| {
            DeepLearnError::CorruptState(format!("History stride {sample_stride} is not usable"))
        })?;

        debug!(
            step = step_count,
            layer = current_hidden_layer,
            "Loaded controller"
        );

        Ok(Self {
            network,
            autoencoder,
            phase: Phase::at_layer(current_hidden_layer, hidden_layers),
            error_thresholds,
            current_error,
            training_complete,
            step_count,
            history,
            warmup_steps: config.warmup_steps,
        })
    }
}

/// Save a controller to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created or written.
pub fn save_checkpoint<N: Network>(
    controller: &TrainingController<N>,
    path: &Path,
) -> DeepLearnResult<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    let written = controller.save(&mut writer)?;
    writer.flush()?;
    Ok(written)
}

/// Load a controller saved with [`save_checkpoint`], using the default [`Config`].
///
/// # Errors
///
/// Returns `Io` if the file cannot be opened and `CorruptState` if it is truncated.
pub fn load_checkpoint<N: Network>(path: &Path) -> DeepLearnResult<TrainingController<N>> {
    load_checkpoint_with_config(path, &Config::default())
}

/// Load a controller saved with [`save_checkpoint`], taking warm-up length and
/// history capacity from `config`.
pub fn load_checkpoint_with_config<N: Network>(
    path: &Path,
    config: &Config,
) -> DeepLearnResult<TrainingController<N>> {
    let mut reader = BufReader::new(File::open(path)?);
    TrainingController::load_with_config(&mut reader, config)
}
