//! Dataset inspection CLI — enumerates a dataset, runs the feature pipeline
//! over the first few batches, and reports what the model would see.
//!
//! # Output
//!
//! Prints a one-line JSON summary to stdout on success:
//!
//! ```json
//! {"samples":12845,"selected":12202,"batches":763,"inspected":2,"mel_bins":64,"max_frames":214,"max_tokens":96}
//! ```
//!
//! Exit code 0 on success, non-zero on error.

use std::str::FromStr;

use candle_core::Device;
use clap::Parser;

use melnet_rs::data::{enumerate, split, BatchLoader, LoaderConfig, Split};
use melnet_rs::{DatasetKind, MelNetConfig};

#[derive(Parser, Debug)]
#[command(
    name = "melnet-data",
    about = "Inspect a dataset through the MelNet feature pipeline",
    long_about = "Enumerates samples, applies the deterministic train/validation \n\
                  split, extracts the first few batches through the worker pool, \n\
                  and prints a JSON summary line."
)]
struct Args {
    /// Dataset root directory.
    #[arg(long, short = 'r')]
    root: String,

    /// Dataset kind: "kss" or "blizzard".
    #[arg(long, short = 'd')]
    dataset: String,

    /// Optional JSON config file; defaults are used when omitted.
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Which partition to inspect.
    #[arg(long, default_value = "train")]
    partition: String,

    /// How many batches to actually extract.
    #[arg(long, default_value_t = 2)]
    inspect: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MelNetConfig::load(path)?,
        None => MelNetConfig::default(),
    };
    config.data.kind = DatasetKind::from_str(&args.dataset)?;
    config.data.root = args.root.clone();
    config.validate()?;

    let which = match args.partition.as_str() {
        "train" => Split::Train,
        "validation" | "val" => Split::Validation,
        other => anyhow::bail!("unknown partition '{other}', use train or validation"),
    };

    let samples = enumerate(
        args.root.as_ref(),
        config.data.kind,
        config.audio.max_duration,
    )?;
    let total = samples.len();
    tracing::info!(total, "enumerated samples");

    let selected = split(samples, which, config.data.split_seed);
    let selected_count = selected.len();

    let loader = BatchLoader::new(
        selected,
        &config.audio,
        &config.model,
        config.data.kind,
        LoaderConfig {
            batch_size: config.data.batch_size,
            num_workers: config.data.num_workers,
            drop_last: true,
        },
        &Device::Cpu,
    )?;
    let batches = loader.len();

    let mut inspected = 0usize;
    let mut mel_bins = 0usize;
    let mut max_frames = 0usize;
    let mut max_tokens = 0usize;
    for batch in loader.take(args.inspect) {
        let batch = batch?;
        let dims = batch.target.dims();
        mel_bins = dims[1];
        max_frames = max_frames.max(dims[2]);
        if let Some(tokens) = &batch.tokens {
            max_tokens = max_tokens.max(tokens.dims()[1]);
        }
        inspected += 1;
        tracing::info!(
            batch = inspected,
            ?dims,
            lengths = ?batch.audio_lengths,
            "extracted batch"
        );
    }

    println!(
        "{}",
        serde_json::json!({
            "samples": total,
            "selected": selected_count,
            "batches": batches,
            "inspected": inspected,
            "mel_bins": mel_bins,
            "max_frames": max_frames,
            "max_tokens": max_tokens,
        })
    );
    Ok(())
}
