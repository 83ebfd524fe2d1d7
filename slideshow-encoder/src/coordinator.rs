//! Batch coordination between the worker pool, image cache and reassembly
//!
//! ```text
//! CONFIGURING -> PLANNING -> BATCH_DISPATCH <-> BATCH_WAIT -> EVICTING
//!                                 ^                              |
//!                                 +------------------------------+
//!                                                 |
//!                                          DRAINING_FINAL -> DONE
//! ```
//!
//! Any failure ends in `ABORTED`: no further batch is dispatched, the
//! reassembly stage is told that production stopped, and the first error is
//! returned once it has drained what already completed.

use crate::codec::FrameEncoder;
use crate::image_cache::{ImageCache, ImageSource};
use crate::progress_tracker::{NoProgress, ProgressEvent, ProgressReporter};
use crate::reassembly::Reassembly;
use crate::worker::WorkerPool;
use crate::{Error, Result};
use crossbeam::channel::{self, Sender};
use slideshow_core::{
    plan_segments, total_frames, ContainerWriter, EncodedSegment, SegmentSpec, SlideshowConfig,
    TrackInfo,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, info, warn};

static NO_PROGRESS: NoProgress = NoProgress;

/// Lifecycle of a coordinator run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Validating configuration and input
    Configuring,
    /// Building the segment plan
    Planning,
    /// Loading images for the next batch and handing it to the workers
    BatchDispatch,
    /// Waiting for every worker of the batch to return
    BatchWait,
    /// Dropping images no later segment references
    Evicting,
    /// Waiting for reassembly to write the last segments
    DrainingFinal,
    /// Every frame was written and the container finished
    Done,
    /// The run stopped on an error
    Aborted,
}

/// What a successful run produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Segments in the plan
    pub segments: usize,
    /// Frames written to the container
    pub frames: u64,
    /// Batches dispatched to the worker pool
    pub batches: usize,
    /// Images decoded over the run
    pub image_loads: usize,
}

struct Production {
    batches: usize,
    image_loads: usize,
}

/// Drives a slideshow from image source to finished container
pub struct Coordinator<'a, S: ImageSource + ?Sized, E: FrameEncoder> {
    config: SlideshowConfig,
    source: &'a S,
    encoder: &'a E,
    progress: &'a dyn ProgressReporter,
    state: CoordinatorState,
}

impl<'a, S: ImageSource + ?Sized, E: FrameEncoder> Coordinator<'a, S, E> {
    /// Creates a coordinator for `source`, encoding with `encoder`
    pub fn new(config: SlideshowConfig, source: &'a S, encoder: &'a E) -> Self {
        Self {
            config,
            source,
            encoder,
            progress: &NO_PROGRESS,
            state: CoordinatorState::Configuring,
        }
    }

    /// Sends progress events to `progress`
    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Current or final state
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Encodes the whole slideshow into `writer`.
    ///
    /// `writer.finish()` is only called when every frame was written.
    pub fn run<W: ContainerWriter + ?Sized>(&mut self, writer: &mut W) -> Result<RunSummary> {
        let result = self.execute(writer);
        match &result {
            Ok(summary) => {
                self.transition(CoordinatorState::Done);
                info!(
                    segments = summary.segments,
                    frames = summary.frames,
                    batches = summary.batches,
                    "slideshow encoded"
                );
            }
            Err(e) => {
                self.transition(CoordinatorState::Aborted);
                warn!(error = %e, "slideshow aborted");
            }
        }
        result
    }

    fn execute<W: ContainerWriter + ?Sized>(&mut self, writer: &mut W) -> Result<RunSummary> {
        self.transition(CoordinatorState::Configuring);
        self.config.validate()?;
        if self.source.is_empty() {
            return Err(Error::NoInputFound(self.source.location()));
        }

        self.transition(CoordinatorState::Planning);
        let plan = plan_segments(self.source.len(), &self.config.timing);
        let frames = total_frames(&plan);
        let (width, height) = self.source.dimensions();
        info!(
            images = self.source.len(),
            segments = plan.len(),
            frames,
            width,
            height,
            batch_size = self.config.batch_size,
            encoder = self.encoder.name(),
            "planned slideshow"
        );
        self.progress.report(&ProgressEvent::Planned {
            segments: plan.len(),
            frames,
        });

        writer
            .begin(TrackInfo {
                width,
                height,
                frame_rate: self.config.timing.frame_rate,
            })
            .map_err(Error::Mux)?;

        let halted = AtomicBool::new(false);
        let (publish, completed) = channel::unbounded::<EncodedSegment>();

        let (produced, drained) = thread::scope(|scope| {
            let halted = &halted;
            let total_segments = plan.len();
            let reassembly = scope
                .spawn(move || Reassembly::new(writer, total_segments).run(completed, halted));

            let produced = self.produce(&plan, &publish, halted);
            if produced.is_ok() {
                self.transition(CoordinatorState::DrainingFinal);
            }
            // Dropping the last sender tells reassembly no more segments are coming.
            drop(publish);

            let drained = reassembly
                .join()
                .unwrap_or_else(|_| Err(Error::ThreadPanic("reassembly".to_string())));
            (produced, drained)
        });

        match (produced, drained) {
            (Err(e), drained) => {
                if let Err(secondary) = drained {
                    debug!(error = %secondary, "reassembly stopped after abort");
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
            (Ok(production), Ok(written)) => {
                self.progress
                    .report(&ProgressEvent::Finished { frames: written });
                Ok(RunSummary {
                    segments: plan.len(),
                    frames: written,
                    batches: production.batches,
                    image_loads: production.image_loads,
                })
            }
        }
    }

    fn produce(
        &mut self,
        plan: &[SegmentSpec],
        publish: &Sender<EncodedSegment>,
        halted: &AtomicBool,
    ) -> Result<Production> {
        let pool = WorkerPool::new(self.encoder, self.config.batch_size);
        let mut cache = ImageCache::new();
        let mut batches = 0;
        let mut batch_end = 0;
        let mut frames_done = 0;

        for (batch_no, batch) in pool.batches(plan).enumerate() {
            if halted.load(Ordering::Acquire) {
                warn!(batch = batch_no, "container writer stopped; halting dispatch");
                break;
            }
            let batch_start = batch_end;
            batch_end += batch.len();

            self.transition(CoordinatorState::BatchDispatch);
            cache.ensure_loaded(self.source, &referenced_images(batch))?;
            self.progress.report(&ProgressEvent::BatchStarted {
                batch: batch_no,
                first_segment: batch_start,
                last_segment: batch_end - 1,
            });

            self.transition(CoordinatorState::BatchWait);
            let outcome = pool.encode_batch(batch, &cache, publish)?;
            batches += 1;
            frames_done += outcome.frames;

            self.transition(CoordinatorState::Evicting);
            cache.evict_except(&referenced_images(&plan[batch_end..]));
            debug!(
                batch = batch_no,
                resident = cache.len(),
                "batch complete"
            );
            self.progress.report(&ProgressEvent::BatchFinished {
                batch: batch_no,
                segments_done: batch_end,
                frames_done,
                resident_images: cache.resident_indices(),
            });
        }

        Ok(Production {
            batches,
            image_loads: cache.total_loads(),
        })
    }

    fn transition(&mut self, next: CoordinatorState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "coordinator state");
            self.state = next;
        }
    }
}

/// Images read by the segments that still produce frames
pub fn referenced_images(specs: &[SegmentSpec]) -> BTreeSet<usize> {
    specs
        .iter()
        .filter(|spec| spec.frame_count > 0)
        .flat_map(|spec| spec.images())
        .collect()
}
