//! Slideshow Encoder Library
//!
//! This library turns an ordered image sequence into an encoded slideshow.
//! The timeline is split into segments that are synthesized and encoded in
//! parallel batches, then reassembled strictly in presentation order by a
//! single sequential stage that feeds the container writer.

pub mod avif_encoder;
pub mod codec;
pub mod coordinator;
pub mod image_cache;
pub mod progress_tracker;
pub mod reassembly;
pub mod synthesizer;
pub mod worker;

pub use avif_encoder::AvifFrameEncoder;
pub use codec::{EncodedPayload, EncoderSession, FrameEncoder};
pub use coordinator::{Coordinator, CoordinatorState, RunSummary};
pub use image_cache::{DirectoryImages, ImageCache, ImageSource};
pub use progress_tracker::{NoProgress, ProgressEvent, ProgressReporter, ProgressTracker};
pub use synthesizer::FrameSynthesizer;
pub use worker::WorkerPool;

use slideshow_core::{FileContainerWriter, SlideshowConfig};
use std::path::Path;

/// Result type for slideshow-encoder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for slideshow-encoder operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Slideshow core error: {0}")]
    Core(#[from] slideshow_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("AVIF encode error: {0}")]
    AvifEncode(String),

    #[error("No .jpg, .jpeg or .png images found in {0}")]
    NoInputFound(String),

    #[error("Failed to load image {index}: {message}")]
    ImageLoad { index: usize, message: String },

    #[error("Failed to encode segment {segment}: {message}")]
    Encode { segment: usize, message: String },

    #[error("Container writer failed: {0}")]
    Mux(#[source] slideshow_core::Error),

    #[error("Segment {0} was never produced")]
    MissingSegment(usize),

    #[error("Thread panicked: {0}")]
    ThreadPanic(String),
}

impl Error {
    /// Returns true for configuration errors detected before any work starts
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(
            self,
            Error::Core(slideshow_core::Error::InvalidConfiguration(_))
        )
    }
}

/// Encoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    /// AVIF encoding quality (0-100)
    pub quality: u8,
    /// AVIF encoder speed (1 = slowest, 10 = fastest)
    pub speed: u8,
}

impl EncoderConfig {
    /// Rejects out-of-range quality or speed
    pub fn validate(&self) -> Result<()> {
        if self.quality > 100 {
            return Err(invalid_configuration(format!(
                "quality must be between 0 and 100, got {}",
                self.quality
            )));
        }
        if !(1..=10).contains(&self.speed) {
            return Err(invalid_configuration(format!(
                "speed must be between 1 and 10, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            speed: 8,
        }
    }
}

pub(crate) fn invalid_configuration(message: String) -> Error {
    Error::Core(slideshow_core::Error::InvalidConfiguration(message))
}

/// Renders every image in `input_dir` into an SSV slideshow at `output`.
///
/// Input and configuration errors are reported before the output file is
/// created; the output only appears once the container is finished.
pub fn render_directory(
    input_dir: &Path,
    output: &Path,
    config: &SlideshowConfig,
    encoder_config: &EncoderConfig,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let source = DirectoryImages::open(input_dir)?;
    render_images(&source, output, config, encoder_config, progress)
}

/// Renders the images of an already opened `source` into an SSV slideshow
/// at `output`.
pub fn render_images<S: ImageSource + ?Sized>(
    source: &S,
    output: &Path,
    config: &SlideshowConfig,
    encoder_config: &EncoderConfig,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let encoder = AvifFrameEncoder::new(encoder_config)?;
    config.validate()?;
    if source.is_empty() {
        return Err(Error::NoInputFound(source.location()));
    }

    let mut writer = FileContainerWriter::create(output)?;
    Coordinator::new(config.clone(), source, &encoder)
        .with_progress(progress)
        .run(&mut writer)
}
