//! Parallel segment encoding

use crate::codec::{EncoderSession, FrameEncoder};
use crate::image_cache::ImageCache;
use crate::synthesizer::FrameSynthesizer;
use crate::{Error, Result};
use crossbeam::channel::Sender;
use slideshow_core::{EncodedFrame, EncodedSegment, SegmentSpec};
use std::thread;
use tracing::{debug, warn};

/// Synthesizes and encodes every frame of one segment.
///
/// Each call opens its own encoder session, so the segment starts with a key
/// frame and does not depend on any other segment. Zero-length segments are
/// returned empty without opening a session.
pub fn encode_segment<E: FrameEncoder>(
    spec: &SegmentSpec,
    cache: &ImageCache,
    encoder: &E,
) -> Result<EncodedSegment> {
    if spec.frame_count == 0 {
        return Ok(EncodedSegment::empty(spec.index));
    }

    let synth = FrameSynthesizer::new(spec, |index| cache.get(index))?;
    let (width, height) = synth.dimensions();
    let mut session = encoder
        .new_session(width, height)
        .map_err(|e| encode_error(spec, e))?;

    let mut frames = Vec::with_capacity(spec.frame_count as usize);
    for local in 0..spec.frame_count {
        let pixels = synth.frame(local);
        let payload = session.encode(&pixels).map_err(|e| encode_error(spec, e))?;
        frames.push(EncodedFrame::new(local, payload.data, payload.key_frame));
    }

    let segment = EncodedSegment::new(spec.index, frames);
    debug!(
        segment = spec.index,
        kind = ?spec.kind,
        frames = segment.len(),
        bytes = segment.payload_size(),
        "encoded segment"
    );
    Ok(segment)
}

fn encode_error(spec: &SegmentSpec, err: Error) -> Error {
    match err {
        Error::Encode { .. } => err,
        other => Error::Encode {
            segment: spec.index,
            message: other.to_string(),
        },
    }
}

/// Totals for one successfully encoded batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Segments encoded and published
    pub segments: usize,
    /// Frames across those segments
    pub frames: u64,
}

/// Encodes batches of segments, one thread per segment
pub struct WorkerPool<'e, E: FrameEncoder> {
    encoder: &'e E,
    size: usize,
}

impl<'e, E: FrameEncoder> WorkerPool<'e, E> {
    /// Creates a pool running up to `size` segments at once
    pub fn new(encoder: &'e E, size: usize) -> Self {
        Self {
            encoder,
            size: size.max(1),
        }
    }

    /// Maximum number of segments per batch
    pub fn size(&self) -> usize {
        self.size
    }

    /// Splits a plan into the batches this pool dispatches
    pub fn batches<'p>(&self, plan: &'p [SegmentSpec]) -> std::slice::Chunks<'p, SegmentSpec> {
        plan.chunks(self.size)
    }

    /// Encodes every segment of `batch` concurrently.
    ///
    /// Each worker publishes its segment as soon as it is done. The call
    /// returns once every worker has returned; if any failed, the first error
    /// in segment order is returned and the segments that succeeded stay
    /// published.
    pub fn encode_batch(
        &self,
        batch: &[SegmentSpec],
        cache: &ImageCache,
        publish: &Sender<EncodedSegment>,
    ) -> Result<BatchOutcome> {
        debug_assert!(batch.len() <= self.size);
        let encoder = self.encoder;

        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|spec| {
                    let publish = publish.clone();
                    let handle = scope.spawn(move || -> Result<u64> {
                        let segment = encode_segment(spec, cache, encoder)?;
                        let frames = segment.len() as u64;
                        // A closed channel means reassembly already stopped;
                        // the coordinator learns that through the halt flag.
                        if publish.send(segment).is_err() {
                            debug!(segment = spec.index, "reassembly gone, segment dropped");
                        }
                        Ok(frames)
                    });
                    (spec.index, handle)
                })
                .collect();

            let mut first_error = None;
            let mut frames = 0;
            for (index, handle) in handles {
                match handle.join() {
                    Ok(Ok(count)) => frames += count,
                    Ok(Err(e)) => {
                        warn!(segment = index, error = %e, "segment failed");
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                    Err(_) => {
                        warn!(segment = index, "worker panicked");
                        if first_error.is_none() {
                            first_error = Some(Error::ThreadPanic(format!(
                                "worker encoding segment {index}"
                            )));
                        }
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(BatchOutcome {
                    segments: batch.len(),
                    frames,
                }),
            }
        })
    }
}
