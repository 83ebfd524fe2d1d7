//! Test doubles shared by the pipeline tests

#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use slideshow_core::{ContainerWriter, GlobalFrame, TrackInfo};
use slideshow_encoder::{EncodedPayload, EncoderSession, Error, FrameEncoder, ImageSource, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

pub const WIDTH: u32 = 16;
pub const HEIGHT: u32 = 16;

/// Distinct opaque color for image `index`
pub fn color(index: usize) -> Rgba<u8> {
    let i = index as u8;
    Rgba([i.wrapping_mul(40).wrapping_add(10), 255 - i.wrapping_mul(30), i.wrapping_mul(7), 255])
}

/// Solid-color images held in memory
pub struct MemorySource {
    count: usize,
    fail_at: Option<usize>,
    loads: Mutex<Vec<usize>>,
}

impl MemorySource {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            fail_at: None,
            loads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(count: usize, index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::new(count)
        }
    }

    /// Image indices in the order they were loaded
    pub fn loads(&self) -> Vec<usize> {
        self.loads.lock().unwrap().clone()
    }
}

impl ImageSource for MemorySource {
    fn len(&self) -> usize {
        self.count
    }

    fn dimensions(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }

    fn load(&self, index: usize) -> Result<RgbaImage> {
        if self.fail_at == Some(index) {
            return Err(Error::ImageLoad {
                index,
                message: "corrupt image".to_string(),
            });
        }
        self.loads.lock().unwrap().push(index);
        Ok(RgbaImage::from_pixel(WIDTH, HEIGHT, color(index)))
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Encodes a frame as the RGB value of its top-left pixel.
///
/// Optionally sleeps before each frame to perturb worker completion order,
/// and fails once a given number of sessions was opened.
pub struct PixelEncoder {
    delays_ms: Vec<u64>,
    fail_after_sessions: Option<usize>,
    sessions: AtomicUsize,
}

impl PixelEncoder {
    pub fn new() -> Self {
        Self {
            delays_ms: Vec::new(),
            fail_after_sessions: None,
            sessions: AtomicUsize::new(0),
        }
    }

    pub fn with_delays(delays_ms: Vec<u64>) -> Self {
        Self {
            delays_ms,
            ..Self::new()
        }
    }

    pub fn failing_after(sessions: usize) -> Self {
        Self {
            fail_after_sessions: Some(sessions),
            ..Self::new()
        }
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

pub struct PixelSession {
    first: bool,
    delay: Duration,
    fail: bool,
}

impl EncoderSession for PixelSession {
    fn encode(&mut self, frame: &RgbaImage) -> Result<EncodedPayload> {
        if self.fail {
            return Err(Error::AvifEncode("encoder rejected the frame".to_string()));
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let pixel = frame.get_pixel(0, 0);
        Ok(EncodedPayload {
            data: vec![pixel[0], pixel[1], pixel[2]],
            key_frame: std::mem::replace(&mut self.first, false),
        })
    }
}

impl FrameEncoder for PixelEncoder {
    type Session = PixelSession;

    fn new_session(&self, _width: u32, _height: u32) -> Result<PixelSession> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        let delay = if self.delays_ms.is_empty() {
            0
        } else {
            self.delays_ms[n % self.delays_ms.len()]
        };
        Ok(PixelSession {
            first: true,
            delay: Duration::from_millis(delay),
            fail: self.fail_after_sessions.is_some_and(|limit| n >= limit),
        })
    }

    fn name(&self) -> &str {
        "pixel"
    }
}

/// Keeps every appended frame in memory
#[derive(Default)]
pub struct RecordingWriter {
    pub track: Option<TrackInfo>,
    pub frames: Vec<GlobalFrame>,
    pub finished: bool,
    pub fail_at: Option<u64>,
}

impl RecordingWriter {
    pub fn failing_at(frame_number: u64) -> Self {
        Self {
            fail_at: Some(frame_number),
            ..Self::default()
        }
    }

    pub fn frame_numbers(&self) -> Vec<u64> {
        self.frames.iter().map(|f| f.frame_number).collect()
    }
}

impl ContainerWriter for RecordingWriter {
    fn begin(&mut self, track: TrackInfo) -> slideshow_core::Result<()> {
        self.track = Some(track);
        Ok(())
    }

    fn append_frame(&mut self, frame: &GlobalFrame) -> slideshow_core::Result<()> {
        assert!(self.track.is_some(), "frame appended before begin");
        assert!(!self.finished, "frame appended after finish");
        if self.fail_at == Some(frame.frame_number) {
            return Err(slideshow_core::Error::Io(std::io::Error::other("disk full")));
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> slideshow_core::Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Largest batch size accepted on this machine, capped at `wanted`
pub fn batch_size(wanted: usize) -> usize {
    wanted.min(num_cpus::get()).max(1)
}
