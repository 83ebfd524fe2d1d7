//! Timing and parallelism configuration

use crate::{Error, Result};
use tracing::{info, warn};

/// Default seconds each image is shown
pub const DEFAULT_DURATION_SECS: f64 = 3.0;
/// Default transition length in seconds
pub const DEFAULT_TRANSITION_SECS: f64 = 0.75;
/// Default frames per second
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Output frame rate as a rational number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameRate {
    /// Frame rate numerator
    pub num: u32,
    /// Frame rate denominator
    pub den: u32,
}

impl FrameRate {
    /// Creates a new frame rate
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Calculates the frame rate as a float
    pub fn fps(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

/// Frame counts for each kind of segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingConfig {
    /// Frames each HOLD segment lasts
    pub hold_frames: u32,
    /// Frames each FADE_IN, DISSOLVE and FADE_OUT segment lasts
    pub transition_frames: u32,
    /// Timescale of the output track
    pub frame_rate: FrameRate,
}

impl TimingConfig {
    /// Converts durations in seconds into whole frame counts.
    ///
    /// Frame counts are truncated, so a transition shorter than one frame
    /// becomes a hard cut.
    pub fn from_seconds(duration_secs: f64, transition_secs: f64, fps: u32) -> Result<Self> {
        if duration_secs.is_nan() || duration_secs <= 0.0 {
            return Err(Error::InvalidConfiguration(
                "duration must be > 0".to_string(),
            ));
        }
        if transition_secs.is_nan() || transition_secs < 0.0 {
            return Err(Error::InvalidConfiguration(
                "transition must be >= 0".to_string(),
            ));
        }
        if fps == 0 {
            return Err(Error::InvalidConfiguration(
                "frame rate must be positive".to_string(),
            ));
        }
        if duration_secs < transition_secs {
            info!("transition is longer than duration; images will only appear during transitions");
        }

        let hold_frames = (duration_secs * fps as f64) as u32;
        let transition_frames = (transition_secs * fps as f64) as u32;

        if hold_frames == 0 && transition_frames == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "duration {:.2}s and transition {:.2}s at {} fps both produce 0 frames; \
                 increase duration, transition, or frame rate",
                duration_secs, transition_secs, fps
            )));
        }
        if hold_frames == 0 {
            warn!(
                duration_secs,
                fps, "duration produces 0 hold frames; images will only appear during transitions"
            );
        }
        if transition_frames == 0 && transition_secs > 0.0 {
            warn!(
                transition_secs,
                fps, "transition produces 0 frames; transitions will be hard cuts"
            );
        }

        Ok(Self {
            hold_frames,
            transition_frames,
            frame_rate: FrameRate::new(fps, 1),
        })
    }

    /// Rejects timing that would produce an empty video
    pub fn validate(&self) -> Result<()> {
        if self.frame_rate.num == 0 || self.frame_rate.den == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "invalid frame rate {}/{}",
                self.frame_rate.num, self.frame_rate.den
            )));
        }
        if self.hold_frames == 0 && self.transition_frames == 0 {
            return Err(Error::InvalidConfiguration(
                "hold and transition frames are both 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            hold_frames: (DEFAULT_DURATION_SECS * DEFAULT_FRAME_RATE as f64) as u32,
            transition_frames: (DEFAULT_TRANSITION_SECS * DEFAULT_FRAME_RATE as f64) as u32,
            frame_rate: FrameRate::new(DEFAULT_FRAME_RATE, 1),
        }
    }
}

/// Slideshow pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlideshowConfig {
    /// Segment timing
    pub timing: TimingConfig,
    /// Segments encoded in parallel per batch
    pub batch_size: usize,
}

impl SlideshowConfig {
    /// Creates a configuration with the given timing and the default batch size
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            timing,
            batch_size: num_cpus::get(),
        }
    }

    /// Overrides the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Validates timing and parallelism before any work starts
    pub fn validate(&self) -> Result<()> {
        self.timing.validate()?;

        let max = num_cpus::get();
        if self.batch_size == 0 || self.batch_size > max {
            return Err(Error::InvalidConfiguration(format!(
                "batch size must be between 1 and {}, got {}",
                max, self.batch_size
            )));
        }
        Ok(())
    }
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self::new(TimingConfig::default())
    }
}
