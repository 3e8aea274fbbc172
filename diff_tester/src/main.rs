use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use spot_diff::parallel_pipeline::WorkerPool;
use spot_diff::pipeline::DetectionConfig;
use spot_diff::{CompositeLayout, OutputMode};
use std::path::PathBuf;

/// Finds the differences in "spot the difference" screenshots and prints one JSON
/// result per input.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Composite screenshots, first scene stacked above the second.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON file holding a detection config. Flags below override its fields.
    #[arg(long, env = "SPOT_DIFF_CONFIG")]
    config: Option<PathBuf>,

    /// Smallest pixel count a difference must have.
    #[arg(long)]
    min_area: Option<i32>,

    /// Per-pixel change (0-255) that counts as different.
    #[arg(long)]
    diff_threshold: Option<i32>,

    /// Drop differences spanning at least this fraction (0-1] of the image width
    /// or height, which usually means the two scenes are misaligned.
    #[arg(long)]
    max_region_fraction: Option<f32>,

    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Directory for saved images (implies --mode saved).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// File name prefix for saved images [default: the config file's, or "result"].
    #[arg(long)]
    prefix: Option<String>,

    #[arg(long, value_enum)]
    layout: Option<Layout>,

    /// Number of detection workers (defaults to the CPU count).
    #[arg(long)]
    workers: Option<usize>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Embedded,
    Saved,
    MetadataOnly,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Stacked,
    SideBySide,
}

const DEFAULT_PREFIX: &str = "result";

fn build_config(args: &Args) -> anyhow::Result<DetectionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => DetectionConfig::default(),
    };

    if let Some(min_area) = args.min_area {
        config.min_area = min_area;
    }
    if let Some(diff_threshold) = args.diff_threshold {
        config.diff_threshold = diff_threshold;
    }
    if let Some(fraction) = args.max_region_fraction {
        config.max_region_fraction = Some(fraction);
    }
    if let Some(layout) = args.layout {
        config.layout = match layout {
            Layout::Stacked => CompositeLayout::Stacked,
            Layout::SideBySide => CompositeLayout::SideBySide,
        };
    }

    let mode = args
        .mode
        .or(args.output_dir.as_ref().map(|_| Mode::Saved))
        .or(args.prefix.as_ref().map(|_| Mode::Saved));
    match mode {
        Some(Mode::Embedded) => config.output = OutputMode::Embedded,
        Some(Mode::MetadataOnly) => config.output = OutputMode::MetadataOnly,
        Some(Mode::Saved) => {
            // Anything not given on the command line comes from the config file.
            let (file_dir, file_prefix) = match &config.output {
                OutputMode::Saved {
                    output_dir,
                    filename_prefix,
                } => (Some(output_dir.clone()), Some(filename_prefix.clone())),
                _ => (None, None),
            };
            let Some(output_dir) = args.output_dir.clone().or(file_dir) else {
                bail!("--mode saved needs --output-dir");
            };
            let prefix = args
                .prefix
                .clone()
                .or(file_prefix)
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
            config.output = OutputMode::saved(output_dir, prefix);
        }
        None => {}
    }

    config.validate().context("invalid detection config")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Argument Parsing & Setup ---
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = build_config(&args)?;

    // --- 2. Input Loading ---
    let mut requests = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        requests.push((bytes, config.clone()));
    }

    // --- 3. Detection ---
    let pool = match args.workers {
        Some(workers) => WorkerPool::with_workers(workers),
        None => WorkerPool::new(),
    };
    log::info!(
        "checking {} screenshots on {} workers",
        requests.len(),
        pool.worker_count()
    );
    let results = pool.process_batch(requests).await;
    pool.shutdown().await;

    // --- 4. Reporting ---
    let mut failures = 0;
    for (path, result) in args.inputs.iter().zip(results) {
        match result {
            Ok(result) => {
                let json = if args.pretty {
                    serde_json::to_string_pretty(&result)?
                } else {
                    serde_json::to_string(&result)?
                };
                println!("{json}");
                log::info!("{}: {} differences", path.display(), result.difference_count);
            }
            Err(e) => {
                failures += 1;
                log::error!("{}: {e} ({:?})", path.display(), e.kind());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} screenshots failed", args.inputs.len());
    }
    Ok(())
}
