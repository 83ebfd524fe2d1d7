//! Slideshow Core Library
//!
//! This library provides the data model shared by the slideshow pipeline:
//! the segment plan that decomposes an image sequence into independently
//! encodable runs of frames, the frame records produced by encoding, the
//! timing configuration and the SSV container format the frames end up in.

pub mod config;
pub mod container;
pub mod frame;
pub mod segment;

pub use config::{FrameRate, SlideshowConfig, TimingConfig};
pub use container::{
    ContainerWriter, FileContainerWriter, SsvContainer, SsvHeader, SsvWriter, TrackInfo,
};
pub use frame::{EncodedFrame, EncodedSegment, GlobalFrame};
pub use segment::{plan_segments, total_frames, SegmentKind, SegmentSpec};

/// Result type for slideshow-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for slideshow-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes, expected 'SSV\\0'")]
    InvalidMagic,

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("Container is truncated or was never finished")]
    Truncated,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Frames out of order: expected frame {expected}, got {got}")]
    FrameOrder { expected: u64, got: u64 },

    #[error("Container writer used before begin() or after finish()")]
    NotWriting,
}
