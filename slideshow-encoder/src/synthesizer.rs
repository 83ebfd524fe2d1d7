//! Frame synthesis for hold, fade and dissolve segments

use crate::{Error, Result};
use image::{Rgba, RgbaImage};
use slideshow_core::{SegmentKind, SegmentSpec};
use std::borrow::Cow;

/// Produces the pixels of every frame of one segment.
///
/// Images are borrowed from the cache; only blended frames and the black
/// plate used by fades are allocated.
pub struct FrameSynthesizer<'a> {
    from: Cow<'a, RgbaImage>,
    to: Option<Cow<'a, RgbaImage>>,
    frame_count: u32,
}

impl<'a> FrameSynthesizer<'a> {
    /// Resolves the images `spec` refers to through `lookup`
    pub fn new<F>(spec: &SegmentSpec, lookup: F) -> Result<Self>
    where
        F: Fn(usize) -> Option<&'a RgbaImage>,
    {
        let resolve = |index: Option<usize>| -> Result<&'a RgbaImage> {
            let index = index.ok_or_else(|| Error::Encode {
                segment: spec.index,
                message: format!("{:?} segment is missing an image reference", spec.kind),
            })?;
            lookup(index).ok_or_else(|| Error::ImageLoad {
                index,
                message: "image is not resident in the cache".to_string(),
            })
        };

        let image_a = resolve(spec.image_a)?;
        let (from, to) = match spec.kind {
            SegmentKind::Hold => (Cow::Borrowed(image_a), None),
            SegmentKind::Dissolve => {
                let image_b = resolve(spec.image_b)?;
                if image_a.dimensions() != image_b.dimensions() {
                    return Err(Error::Encode {
                        segment: spec.index,
                        message: format!(
                            "cannot dissolve {}x{} into {}x{}",
                            image_a.width(),
                            image_a.height(),
                            image_b.width(),
                            image_b.height()
                        ),
                    });
                }
                (Cow::Borrowed(image_a), Some(Cow::Borrowed(image_b)))
            }
            SegmentKind::FadeIn => (Cow::Owned(black_like(image_a)), Some(Cow::Borrowed(image_a))),
            SegmentKind::FadeOut => (Cow::Borrowed(image_a), Some(Cow::Owned(black_like(image_a)))),
        };

        Ok(Self {
            from,
            to,
            frame_count: spec.frame_count,
        })
    }

    /// Size of every frame produced
    pub fn dimensions(&self) -> (u32, u32) {
        self.from.dimensions()
    }

    /// Number of frames in the segment
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Pixels of local frame `frame`.
    ///
    /// Transitions use `alpha = (frame + 1) / frame_count`: the first frame is
    /// already slightly blended and the last frame is exactly the target.
    pub fn frame(&self, frame: u32) -> Cow<'_, RgbaImage> {
        let Some(to) = self.to.as_deref() else {
            return Cow::Borrowed(self.from.as_ref());
        };

        let alpha = (frame + 1) as f32 / self.frame_count.max(1) as f32;
        if alpha >= 1.0 {
            Cow::Borrowed(to)
        } else {
            Cow::Owned(blend(&self.from, to, alpha))
        }
    }
}

/// Composites `over` onto `base` with source-over blending at `alpha`.
///
/// Both images must have the same dimensions. `alpha = 0` yields `base`,
/// `alpha = 1` yields `over`.
pub fn blend(base: &RgbaImage, over: &RgbaImage, alpha: f32) -> RgbaImage {
    let alpha = alpha.clamp(0.0, 1.0);
    let inv_alpha = 1.0 - alpha;

    let mut out = base.clone();
    for (dst, src) in out.pixels_mut().zip(over.pixels()) {
        *dst = Rgba([
            mix(dst[0], src[0], alpha, inv_alpha),
            mix(dst[1], src[1], alpha, inv_alpha),
            mix(dst[2], src[2], alpha, inv_alpha),
            mix(dst[3], src[3], alpha, inv_alpha),
        ]);
    }
    out
}

fn mix(base: u8, over: u8, alpha: f32, inv_alpha: f32) -> u8 {
    (over as f32 * alpha + base as f32 * inv_alpha).round() as u8
}

fn black_like(image: &RgbaImage) -> RgbaImage {
    RgbaImage::from_pixel(image.width(), image.height(), Rgba([0, 0, 0, 255]))
}
