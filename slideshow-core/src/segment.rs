//! Segment plan for a slideshow timeline
//!
//! A slideshow of `n` images is always laid out as
//! `FADE_IN, HOLD(0), DISSOLVE(0,1), HOLD(1), ..., HOLD(n-1), FADE_OUT`,
//! i.e. `2n + 1` segments. Each segment is encoded on its own, starting with a
//! fresh key frame, so segments can be produced in any order and in parallel.

use crate::TimingConfig;

/// The synthesis rule shared by every frame of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SegmentKind {
    /// Black dissolving into the first image
    FadeIn,
    /// A single image shown unchanged
    Hold,
    /// One image dissolving into the next
    Dissolve,
    /// The last image dissolving into black
    FadeOut,
}

/// Describes one independently encodable run of frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentSpec {
    /// Position of the segment in the timeline
    pub index: usize,
    /// How frames of this segment are synthesized
    pub kind: SegmentKind,
    /// Primary image (the only image for HOLD and fades)
    pub image_a: Option<usize>,
    /// Secondary image, only set for DISSOLVE
    pub image_b: Option<usize>,
    /// Number of frames in the segment; may be zero
    pub frame_count: u32,
}

impl SegmentSpec {
    /// Iterates over the image indices this segment reads
    pub fn images(&self) -> impl Iterator<Item = usize> {
        self.image_a.into_iter().chain(self.image_b)
    }
}

/// Builds the segment plan for `image_count` images.
///
/// Returns an empty plan when `image_count` is zero; callers reject empty
/// input before planning.
pub fn plan_segments(image_count: usize, timing: &TimingConfig) -> Vec<SegmentSpec> {
    if image_count == 0 {
        return Vec::new();
    }

    let mut plan = Vec::with_capacity(2 * image_count + 1);
    let mut push = |kind, image_a, image_b, frame_count| {
        plan.push(SegmentSpec {
            index: plan.len(),
            kind,
            image_a,
            image_b,
            frame_count,
        });
    };

    push(SegmentKind::FadeIn, Some(0), None, timing.transition_frames);
    for i in 0..image_count {
        push(SegmentKind::Hold, Some(i), None, timing.hold_frames);
        if i + 1 < image_count {
            push(
                SegmentKind::Dissolve,
                Some(i),
                Some(i + 1),
                timing.transition_frames,
            );
        }
    }
    push(
        SegmentKind::FadeOut,
        Some(image_count - 1),
        None,
        timing.transition_frames,
    );

    plan
}

/// Total number of frames the plan produces
pub fn total_frames(plan: &[SegmentSpec]) -> u64 {
    plan.iter().map(|s| s.frame_count as u64).sum()
}
