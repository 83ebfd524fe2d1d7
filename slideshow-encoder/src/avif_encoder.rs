//! AVIF frame encoding
//!
//! Every frame that differs from its predecessor is stored as a standalone
//! AVIF image and flagged as a key frame. A frame identical to the previous
//! frame of the same session is stored as an empty "repeat" payload, so a HOLD
//! segment costs a single AVIF image no matter how long it lasts.

use crate::codec::{EncodedPayload, EncoderSession, FrameEncoder};
use crate::{EncoderConfig, Error, Result};
use image::RgbaImage;
use ravif::{Encoder, Img, RGBA8};

/// Frame encoder producing AVIF key frames and repeat markers
#[derive(Debug, Clone)]
pub struct AvifFrameEncoder {
    quality: u8,
    speed: u8,
}

impl AvifFrameEncoder {
    /// Creates an encoder after validating the configuration
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            quality: config.quality,
            speed: config.speed,
        })
    }
}

impl FrameEncoder for AvifFrameEncoder {
    type Session = AvifSession;

    fn new_session(&self, width: u32, height: u32) -> Result<AvifSession> {
        if width == 0 || height == 0 {
            return Err(Error::AvifEncode(format!(
                "cannot encode {width}x{height} frames"
            )));
        }
        Ok(AvifSession {
            quality: self.quality,
            speed: self.speed,
            width,
            height,
            previous: None,
        })
    }

    fn name(&self) -> &str {
        "avif"
    }
}

/// Encoder state for one segment
pub struct AvifSession {
    quality: u8,
    speed: u8,
    width: u32,
    height: u32,
    previous: Option<RgbaImage>,
}

impl EncoderSession for AvifSession {
    fn encode(&mut self, frame: &RgbaImage) -> Result<EncodedPayload> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(Error::AvifEncode(format!(
                "frame is {}x{}, session expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        if self.previous.as_ref() == Some(frame) {
            return Ok(EncodedPayload {
                data: Vec::new(),
                key_frame: false,
            });
        }

        let data = encode_avif(frame, self.quality, self.speed)?;
        self.previous = Some(frame.clone());
        Ok(EncodedPayload {
            data,
            key_frame: true,
        })
    }
}

/// Encodes an RGBA image to AVIF format
pub fn encode_avif(image: &RgbaImage, quality: u8, speed: u8) -> Result<Vec<u8>> {
    let width = image.width() as usize;
    let height = image.height() as usize;

    let pixels: Vec<RGBA8> = image
        .pixels()
        .map(|p| RGBA8::new(p[0], p[1], p[2], p[3]))
        .collect();
    let img = Img::new(pixels.as_slice(), width, height);

    // Workers already run one segment per core
    let encoder = Encoder::new()
        .with_quality(quality as f32)
        .with_speed(speed)
        .with_alpha_quality(quality as f32)
        .with_num_threads(Some(1));

    let encoded = encoder
        .encode_rgba(img)
        .map_err(|e| Error::AvifEncode(format!("{:?}", e)))?;

    Ok(encoded.avif_file)
}
