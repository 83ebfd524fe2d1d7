//! Frame encoder collaborator contract

use crate::Result;
use image::RgbaImage;

/// One encoded frame as returned by an encoder session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Opaque encoded bytes
    pub data: Vec<u8>,
    /// Whether the payload decodes on its own
    pub key_frame: bool,
}

/// Encoding state for exactly one segment.
///
/// A session is created by the worker that encodes the segment and dropped
/// when the segment is done; it never crosses threads. The first payload of
/// every session must be a key frame.
pub trait EncoderSession {
    /// Encodes the next frame of the segment.
    fn encode(&mut self, frame: &RgbaImage) -> Result<EncodedPayload>;
}

/// Factory for per-segment encoder sessions, shared by all workers.
pub trait FrameEncoder: Sync {
    /// Session type produced by this encoder
    type Session: EncoderSession;

    /// Opens a fresh session for frames of the given size.
    fn new_session(&self, width: u32, height: u32) -> Result<Self::Session>;

    /// Short name used in logs
    fn name(&self) -> &str;
}
