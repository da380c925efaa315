mod canvas;

use anyhow::{Context, Result};
use canvas::ImageCanvas;
use clap::{Parser, ValueHint};
use futures::stream::{FuturesUnordered, StreamExt};
use image_signature::config::ExtractionConfiguration;
use image_signature::core_modules::color::to_hex;
use image_signature::core_modules::render::{DEFAULT_MAGNIFY, centroid_color, visualize_points, visualize_signature};
use image_signature::core_modules::thumbnail::{FileImageSource, ImageSource};
use image_signature::record::ExtractionRecord;
use image_signature::scheduler::{ExtractionScheduler, default_pool_size};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "signature_tool",
    version,
    about = "Extracts feature signatures from images and prints them as SVF"
)]
struct Cli {
    /// Images to extract
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Number of extraction workers (defaults to one per CPU)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// TOML extraction configuration
    #[arg(short = 'c', long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Write SVF lines here instead of stdout
    #[arg(short = 'o', long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Draw sample points and every signature as PNGs into this directory
    #[arg(long, value_hint = ValueHint::DirPath)]
    render_dir: Option<PathBuf>,

    /// Centroid disc size multiplier for rendered signatures
    #[arg(long, default_value_t = DEFAULT_MAGNIFY)]
    magnify: f64,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    /// Log scheduling and clustering details
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// Where a finished record gets rendered, if rendering was requested.
struct RenderTarget {
    directory: PathBuf,
    magnify: f64,
}

impl RenderTarget {
    fn render(&self, record: &ExtractionRecord, size: (u32, u32), config: &ExtractionConfiguration) -> Result<()> {
        let Some(signature) = record.signature() else {
            return Ok(());
        };
        let mut canvas = ImageCanvas::new(size.0, size.1);
        visualize_signature(&mut canvas, signature, &config.weights, self.magnify);
        let path = self.directory.join(format!("{}.signature.png", file_stem(&record.display_label())));
        canvas
            .save_png(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!("rendered {}", path.display());
        Ok(())
    }

    fn render_points(&self, config: &ExtractionConfiguration) -> Result<()> {
        let mut canvas = ImageCanvas::new(config.thumbnail.width, config.thumbnail.height);
        visualize_points(&mut canvas, &config.points);
        let path = self.directory.join("sample_points.png");
        canvas
            .save_png(&path)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

fn file_stem(label: &str) -> String {
    Path::new(label)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| label.to_string())
}

fn load_config(path: Option<&Path>) -> Result<ExtractionConfiguration> {
    match path {
        Some(path) => ExtractionConfiguration::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(ExtractionConfiguration::default()),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = Arc::new(load_config(cli.config.as_deref())?);
    if cli.dump_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let render = match &cli.render_dir {
        Some(directory) => {
            std::fs::create_dir_all(directory)
                .with_context(|| format!("failed to create {}", directory.display()))?;
            let target = RenderTarget {
                directory: directory.clone(),
                magnify: cli.magnify,
            };
            target.render_points(&config)?;
            Some(target)
        }
        None => None,
    };

    let workers = cli.workers.unwrap_or_else(default_pool_size);
    let scheduler = ExtractionScheduler::new();
    scheduler.initialize(workers, None)?;
    info!("extracting {} images on {workers} workers", cli.inputs.len());

    let started = Instant::now();
    let mut pending = FuturesUnordered::new();
    let mut unreadable = 0usize;
    for path in &cli.inputs {
        let source = FileImageSource::new(path, config.thumbnail);
        let thumbnail = match tokio::task::spawn_blocking(move || source.load()).await? {
            Ok(thumbnail) => thumbnail,
            Err(error) => {
                warn!("skipping {}: {error}", path.display());
                unreadable += 1;
                continue;
            }
        };
        let size = (thumbnail.width(), thumbnail.height());
        let label = path.to_string_lossy().into_owned();
        let ticket = scheduler.submit_with_ticket(Some(label), thumbnail, Arc::clone(&config))?;
        pending.push(async move { (ticket.await, size) });
    }

    let mut output = open_output(cli.output.as_deref())?;
    let mut extracted = 0usize;
    let mut failed = 0usize;
    while let Some((record, size)) = pending.next().await {
        let record = record?;
        match record.signature_as_svf() {
            Ok(line) => {
                writeln!(output, "{line}")?;
                extracted += 1;
                let (centroids, dominant) = match record.signature() {
                    Some(signature) if !signature.is_empty() => (
                        signature.len(),
                        to_hex(centroid_color(&signature[0], &config.weights)),
                    ),
                    _ => (0, String::from("-")),
                };
                info!(
                    "{}: {centroids} centroids, dominant {dominant}, extracted in {} ms after waiting {} ms",
                    record.display_label(),
                    record.elapsed_ms(),
                    record.waiting_time().as_millis()
                );
            }
            Err(error) => {
                warn!("{}: {error}", record.display_label());
                failed += 1;
            }
        }
        if let Some(target) = &render {
            target.render(&record, size, &config)?;
        }
    }
    output.flush()?;
    scheduler.shutdown().await;

    info!(
        "{extracted} signatures in {:.2?} ({failed} failed, {unreadable} unreadable)",
        started.elapsed()
    );
    Ok(())
}
