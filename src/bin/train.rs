//! Layer-wise training demo binary.
//!
//! Pretrains every hidden layer on a fixed input ramp, fine-tunes the full
//! network against fixed targets, then checkpoints the controller and checks
//! that reloading it reproduces every field.
//! Writes JSONL progress metrics and, optionally, the error history.

use anyhow::{bail, Context};
use clap::Parser;
use deeplearn::{load_checkpoint_with_config, save_checkpoint, Backprop, Config, TrainingController};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "deeplearn-train",
    about = "Pretrain a deep network layer by layer, then fine-tune it"
)]
struct Args {
    /// Number of input units
    #[arg(long, default_value_t = 10)]
    inputs: usize,

    /// Units in each hidden layer
    #[arg(long, default_value_t = 4)]
    hidden_units: usize,

    /// Number of hidden layers
    #[arg(long, default_value_t = 2)]
    hidden_layers: usize,

    /// Number of output units
    #[arg(long, default_value_t = 2)]
    outputs: usize,

    /// Error thresholds, one per hidden layer plus one for the output (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "0.1,0.1,0.1")]
    thresholds: Vec<f32>,

    /// Random seed for weight initialization
    #[arg(long, default_value_t = 123)]
    seed: u64,

    /// JSON config file (learning_rate, dropout_percent, warmup_steps, history_capacity).
    /// On resume, warmup_steps and history_capacity must match the original run.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the learning rate (on resume, the checkpoint's rate is kept otherwise)
    #[arg(long)]
    learning_rate: Option<f32>,

    /// Override the dropout percentage (on resume, the checkpoint's value is kept otherwise)
    #[arg(long)]
    dropout: Option<f32>,

    /// Maximum steps spent pretraining
    #[arg(long, default_value_t = 10_000)]
    pretrain_steps: usize,

    /// Maximum steps spent fine-tuning
    #[arg(long, default_value_t = 10_000)]
    fine_tune_steps: usize,

    /// Checkpoint file written after training
    #[arg(long, default_value = "data/checkpoints/deeplearn.bin")]
    checkpoint: PathBuf,

    /// Resume from a checkpoint file instead of starting fresh
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Output metrics file (JSONL)
    #[arg(long, default_value = "data/output/metrics.jsonl")]
    metrics_file: PathBuf,

    /// Write the metrics line every N steps
    #[arg(long, default_value_t = 100)]
    metrics_every: usize,

    /// Write the error history series as JSON
    #[arg(long)]
    history_json: Option<PathBuf>,

    /// Write the error history as `step error` plot data
    #[arg(long)]
    plot_data: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            Config::from_json(&json)?
        }
        None => Config::default(),
    };
    if let Some(rate) = args.learning_rate {
        config.learning_rate = rate;
    }
    if let Some(dropout) = args.dropout {
        config.dropout_percent = dropout;
    }
    config.validate()?;
    Ok(config)
}

/// Reload a checkpoint, applying only the hyperparameters passed on the command line.
fn resume(
    path: &Path,
    args: &Args,
    config: &Config,
) -> anyhow::Result<TrainingController<Backprop>> {
    info!(path = %path.display(), "Resuming from checkpoint");
    let mut controller = load_checkpoint_with_config(path, config)
        .with_context(|| format!("Failed to resume from {}", path.display()))?;
    if let Some(rate) = args.learning_rate {
        controller.set_learning_rate(rate);
    }
    if let Some(dropout) = args.dropout {
        controller.set_dropout_percent(dropout);
    }
    Ok(controller)
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn write_metric(
    metrics: &mut impl Write,
    controller: &TrainingController<Backprop>,
) -> anyhow::Result<()> {
    let event = serde_json::json!({
        "type": "step",
        "step": controller.step_count(),
        "phase": controller.phase().name(),
        "layer": controller.current_hidden_layer(),
        "error": controller.current_error(),
        "complete": controller.is_training_complete(),
    });
    writeln!(metrics, "{event}")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = load_config(&args)?;

    let mut controller = match &args.resume {
        Some(path) => resume(path, &args, &config)?,
        None => TrainingController::with_config(
            args.inputs,
            args.hidden_units,
            args.hidden_layers,
            args.outputs,
            &args.thresholds,
            args.seed,
            &config,
        )?,
    };

    let inputs = controller.network().input_count();
    let outputs = controller.network().output_count();
    info!(
        dims = ?controller.network().dims(),
        thresholds = ?controller.error_thresholds(),
        "Network ready"
    );

    ensure_parent(&args.metrics_file)?;
    let mut metrics = BufWriter::new(
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&args.metrics_file)
            .with_context(|| format!("Failed to open {}", args.metrics_file.display()))?,
    );
    let every = args.metrics_every.max(1);

    // Pretraining on a fixed ramp
    let ramp: Vec<f32> = (0..inputs)
        .map(|i| 0.25 + i as f32 * 0.5 / inputs as f32)
        .collect();
    for step in 0..args.pretrain_steps {
        if !controller.phase().is_pretraining() {
            break;
        }
        controller.set_inputs(&ramp);
        controller.update();
        if step % every == 0 {
            write_metric(&mut metrics, &controller)?;
        }
    }
    if controller.phase().is_pretraining() {
        bail!(
            "Pretraining did not finish within {} steps (stuck at layer {})",
            args.pretrain_steps,
            controller.current_hidden_layer()
        );
    }
    info!(step = controller.step_count(), "Pretraining finished");

    // Fine-tuning against fixed targets
    let fine_inputs: Vec<f32> = (0..inputs).map(|i| i as f32 / inputs as f32).collect();
    for step in 0..args.fine_tune_steps {
        if controller.is_training_complete() {
            break;
        }
        controller.set_inputs(&fine_inputs);
        for i in 0..outputs {
            controller.set_output(i, 1.0 - i as f32 / inputs as f32);
        }
        controller.update();
        if step % every == 0 {
            write_metric(&mut metrics, &controller)?;
        }
    }
    write_metric(&mut metrics, &controller)?;
    metrics.flush()?;

    controller.feed_forward();
    let predictions: Vec<f32> = (0..outputs).map(|i| controller.output(i)).collect();
    info!(
        complete = controller.is_training_complete(),
        error = ?controller.current_error(),
        outputs = ?predictions,
        "Fine-tuning finished"
    );

    // Checkpoint and verify
    let bytes = save_checkpoint(&controller, &args.checkpoint)?;
    let reloaded: TrainingController<Backprop> =
        load_checkpoint_with_config(&args.checkpoint, &config)?;
    let comparison = controller.compare(&reloaded);
    if !comparison.is_equal() {
        bail!(
            "Reloaded checkpoint differs: {:?} (code {})",
            comparison,
            comparison.code()
        );
    }
    info!(path = %args.checkpoint.display(), bytes, "Checkpoint verified");

    if let Some(path) = &args.history_json {
        ensure_parent(path)?;
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &controller.history().to_series())?;
        info!(path = %path.display(), "Wrote history series");
    }
    if let Some(path) = &args.plot_data {
        ensure_parent(path)?;
        let mut file = BufWriter::new(File::create(path)?);
        controller.history().write_plot_data(&mut file)?;
        file.flush()?;
        info!(path = %path.display(), "Wrote plot data");
    }

    Ok(())
}
