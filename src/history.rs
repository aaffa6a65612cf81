//! Constant-memory training error history.
//!
//! The recorder keeps at most `capacity` samples. Each time the buffer fills
//! it is decimated in place to half its length and the number of steps a
//! sample stands for doubles, so arbitrarily long runs fit in fixed storage
//! with resolution that coarsens as training goes on.
//!
//! ```text
//! stride 1:  e1 e2 e3 e4          (full, capacity 4)
//! stride 2:  e2 e4 __ __          (after compaction)
//! ```

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Number of samples held before the first compaction.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

/// Fixed-capacity error trace with adaptive time-step compaction.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    /// Backing storage, always `capacity` long; only `[0, write_index)` is meaningful
    samples: Vec<f32>,
    /// Next free slot
    write_index: usize,
    /// Controller steps represented by one stored sample
    sample_stride: u32,
    /// Steps seen since the last stored sample
    stride_counter: u32,
}

/// Exportable `(step, error)` series for external plotting tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySeries {
    /// Steps represented by each point
    pub sample_stride: u32,
    /// X coordinates: `i * sample_stride`
    pub steps: Vec<u64>,
    /// Recorded error values
    pub errors: Vec<f32>,
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryRecorder {
    /// Create an empty recorder with [`DEFAULT_HISTORY_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create an empty recorder holding at most `capacity` samples (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)],
            write_index: 0,
            sample_stride: 1,
            stride_counter: 0,
        }
    }

    /// Rebuild a recorder from persisted fields.
    ///
    /// Returns `None` when the fields cannot describe a recorder of this capacity.
    pub(crate) fn from_parts(
        capacity: usize,
        write_index: usize,
        stride_counter: u32,
        sample_stride: u32,
        stored: &[f32],
    ) -> Option<Self> {
        // a full buffer is compacted immediately, so write_index < capacity always holds
        if write_index >= capacity || sample_stride == 0 || stored.len() != write_index {
            return None;
        }
        let mut recorder = Self::with_capacity(capacity);
        recorder.samples[..write_index].copy_from_slice(stored);
        recorder.write_index = write_index;
        recorder.stride_counter = stride_counter;
        recorder.sample_stride = sample_stride;
        Some(recorder)
    }

    /// Offer one step's error value; it is stored only on stride boundaries.
    pub fn record(&mut self, value: f32) {
        self.stride_counter += 1;
        if self.stride_counter < self.sample_stride {
            return;
        }

        self.samples[self.write_index] = value;
        self.write_index += 1;
        self.stride_counter = 0;

        if self.write_index >= self.samples.len() {
            self.compact();
        }
    }

    /// Halve the stored samples in place and double the stride.
    ///
    /// Each pair collapses onto its later member, whose step count lines up
    /// with the doubled stride.
    fn compact(&mut self) {
        for i in 0..self.write_index {
            self.samples[i / 2] = self.samples[i];
        }
        self.write_index /= 2;
        self.sample_stride = self.sample_stride.saturating_mul(2);
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Number of stored samples (the next write position).
    pub fn len(&self) -> usize {
        self.write_index
    }

    pub fn is_empty(&self) -> bool {
        self.write_index == 0
    }

    pub fn sample_stride(&self) -> u32 {
        self.sample_stride
    }

    pub fn stride_counter(&self) -> u32 {
        self.stride_counter
    }

    /// Stored samples in recording order.
    pub fn samples(&self) -> &[f32] {
        &self.samples[..self.write_index]
    }

    /// `(step, error)` pairs where step is `i * sample_stride`.
    pub fn series(&self) -> impl Iterator<Item = (u64, f32)> + '_ {
        let stride = u64::from(self.sample_stride);
        self.samples()
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i as u64 * stride, v))
    }

    /// Snapshot the series for serialization.
    pub fn to_series(&self) -> HistorySeries {
        let (steps, errors) = self.series().unzip();
        HistorySeries {
            sample_stride: self.sample_stride,
            steps,
            errors,
        }
    }

    /// Largest stored error, floored at `0.01` so an all-zero trace still has a range.
    pub fn max_error(&self) -> f32 {
        self.samples().iter().copied().fold(0.01f32, f32::max)
    }

    /// Write the series as whitespace-separated `step error` lines.
    ///
    /// This is the data-file format consumed by gnuplot-style tools.
    pub fn write_plot_data<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (step, value) in self.series() {
            writeln!(writer, "{step}    {value:.10}")?;
        }
        Ok(())
    }
}
