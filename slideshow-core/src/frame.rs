//! Encoded frame records

/// A frame produced by a worker for one segment.
///
/// Local numbering restarts at 0 for every segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Position of the frame inside its segment
    pub local_frame_number: u32,
    /// Opaque encoded payload
    pub payload: Vec<u8>,
    /// Whether the payload decodes without reference to earlier frames
    pub key_frame: bool,
}

impl EncodedFrame {
    /// Creates a new encoded frame
    pub fn new(local_frame_number: u32, payload: Vec<u8>, key_frame: bool) -> Self {
        Self {
            local_frame_number,
            payload,
            key_frame,
        }
    }
}

/// All frames of one segment, in local order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSegment {
    /// Index of the segment in the plan
    pub index: usize,
    /// Frames in local order; empty for zero-length segments
    pub frames: Vec<EncodedFrame>,
}

impl EncodedSegment {
    /// Creates a new encoded segment
    pub fn new(index: usize, frames: Vec<EncodedFrame>) -> Self {
        Self { index, frames }
    }

    /// An already-resolved segment that contributes no frames
    pub fn empty(index: usize) -> Self {
        Self {
            index,
            frames: Vec::new(),
        }
    }

    /// Returns the number of frames in the segment
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns true when the segment contributes no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns the total payload size in bytes
    pub fn payload_size(&self) -> usize {
        self.frames.iter().map(|f| f.payload.len()).sum()
    }
}

/// A frame in final presentation order, numbered across the whole timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalFrame {
    /// Monotonic frame number starting at 0
    pub frame_number: u64,
    /// Opaque encoded payload
    pub payload: Vec<u8>,
    /// Whether the payload is a key frame
    pub key_frame: bool,
}

impl GlobalFrame {
    /// Renumbers a segment-local frame into the global sequence
    pub fn from_encoded(frame_number: u64, frame: EncodedFrame) -> Self {
        Self {
            frame_number,
            payload: frame.payload,
            key_frame: frame.key_frame,
        }
    }
}
