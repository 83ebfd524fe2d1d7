//! Slideshow CLI Tool
//!
//! Command-line interface for turning a directory of images into an SSV
//! slideshow and inspecting the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slideshow_core::config::{DEFAULT_DURATION_SECS, DEFAULT_FRAME_RATE, DEFAULT_TRANSITION_SECS};
use slideshow_core::{SlideshowConfig, SsvContainer, TimingConfig};
use slideshow_encoder::{render_images, DirectoryImages, EncoderConfig, ImageSource, ProgressTracker};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "slideshow")]
#[command(about = "Slideshow - turns a directory of still images into a cross-dissolving video")]
#[command(version)]
struct Cli {
    /// Log pipeline details (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a slideshow from the .jpg/.jpeg/.png files in a directory
    Create {
        /// Directory containing the input images
        input: PathBuf,

        /// Output SSV file path (default: <timestamp>-output.ssv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seconds each image is held on screen
        #[arg(long, default_value_t = DEFAULT_DURATION_SECS)]
        duration: f64,

        /// Seconds of each fade or dissolve
        #[arg(long, default_value_t = DEFAULT_TRANSITION_SECS)]
        transition: f64,

        /// Output frame rate
        #[arg(long, default_value_t = DEFAULT_FRAME_RATE)]
        fps: u32,

        /// Segments encoded in parallel (default: number of CPUs)
        #[arg(long)]
        batch_size: Option<usize>,

        /// AVIF encoding quality (0-100)
        #[arg(long, default_value = "80")]
        quality: u8,

        /// AVIF encoder speed (1-10)
        #[arg(long, default_value = "8")]
        speed: u8,
    },

    /// Show information about an SSV file
    Info {
        /// Input SSV file path
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Create {
            input,
            output,
            duration,
            transition,
            fps,
            batch_size,
            quality,
            speed,
        } => {
            let timing = TimingConfig::from_seconds(duration, transition, fps)
                .context("Invalid timing")?;
            let mut config = SlideshowConfig::new(timing);
            if let Some(batch_size) = batch_size {
                config = config.with_batch_size(batch_size);
            }
            let output = output.unwrap_or_else(default_output_name);
            create_slideshow(input, output, config, EncoderConfig { quality, speed })?
        }

        Commands::Info { input } => show_info(input)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn default_output_name() -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%dT%H%M%S");
    PathBuf::from(format!("{timestamp}-output.ssv"))
}

fn create_slideshow(
    input: PathBuf,
    output: PathBuf,
    config: SlideshowConfig,
    encoder_config: EncoderConfig,
) -> Result<()> {
    let start = Instant::now();

    let images = DirectoryImages::open(&input)
        .with_context(|| format!("Failed to read input directory {}", input.display()))?;
    println!("Input directory: {}", input.display());
    println!(
        "Found {} images ({}x{})",
        images.len(),
        images.dimensions().0,
        images.dimensions().1
    );
    println!(
        "Hold: {} frames, transition: {} frames @ {} fps",
        config.timing.hold_frames,
        config.timing.transition_frames,
        config.timing.frame_rate.fps()
    );
    println!("Output: {}", output.display());

    let progress = ProgressTracker::new("Encoding");
    let summary = render_images(&images, &output, &config, &encoder_config, &progress)
        .context("Failed to create slideshow")?;

    let size = std::fs::metadata(&output)
        .with_context(|| format!("Failed to stat {}", output.display()))?
        .len();
    println!(
        "Success! Created {} ({}, {} frames in {} segments)",
        output.display(),
        human_size(size),
        summary.frames,
        summary.segments
    );
    println!(
        "Total processing time: {:.2} seconds",
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

fn show_info(input: PathBuf) -> Result<()> {
    let container = SsvContainer::open(&input)
        .with_context(|| format!("Failed to read SSV file {}", input.display()))?;
    print_info(&container);
    Ok(())
}

fn print_info(container: &SsvContainer) {
    println!("\n=== SSV File Information ===");
    println!("Version: {}", container.header.version);
    println!(
        "Resolution: {}x{}",
        container.header.width, container.header.height
    );
    println!(
        "Frame rate: {}/{} ({:.2} fps)",
        container.header.fps_num,
        container.header.fps_den,
        container.fps()
    );
    println!(
        "Frames: {} ({} key frames)",
        container.frames.len(),
        container.key_frame_count()
    );
    println!("Duration: {:.2} seconds", container.duration_secs());

    let total_size = container.payload_size();
    println!(
        "Total payload size: {} bytes ({})",
        total_size,
        human_size(total_size as u64)
    );
}

/// Formats a byte count as `350B`, `1.2K`, `3.4M` or `2.5G`
fn human_size(bytes: u64) -> String {
    const K: u64 = 1024;
    const M: u64 = K * 1024;
    const G: u64 = M * 1024;

    if bytes >= G {
        format!("{:.1}G", bytes as f64 / G as f64)
    } else if bytes >= M {
        format!("{:.1}M", bytes as f64 / M as f64)
    } else if bytes >= K {
        format!("{:.1}K", bytes as f64 / K as f64)
    } else {
        format!("{bytes}B")
    }
}
