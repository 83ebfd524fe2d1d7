//! Progress reporting with ETA estimation

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Milestones reported by the coordinator while a slideshow is encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The segment plan is ready
    Planned { segments: usize, frames: u64 },
    /// A batch was handed to the worker pool
    BatchStarted {
        batch: usize,
        first_segment: usize,
        last_segment: usize,
    },
    /// Every worker of a batch returned successfully and images no later
    /// segment needs were evicted
    BatchFinished {
        batch: usize,
        segments_done: usize,
        frames_done: u64,
        /// Images still cached for later segments
        resident_images: BTreeSet<usize>,
    },
    /// All frames reached the container and it was finalized
    Finished { frames: u64 },
}

/// Receives progress events from the coordinator thread
pub trait ProgressReporter {
    /// Handles one event; called in the order events happen
    fn report(&self, event: &ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

impl<F: Fn(&ProgressEvent)> ProgressReporter for F {
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Logs encoded frame counts with elapsed time and ETA
pub struct ProgressTracker {
    total: AtomicU64,
    processed: AtomicU64,
    start_time: Instant,
    label: String,
}

impl ProgressTracker {
    /// Creates a new progress tracker
    pub fn new(label: &str) -> Self {
        Self {
            total: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            start_time: Instant::now(),
            label: label.to_string(),
        }
    }

    /// Frames encoded so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    fn print_progress(&self, current: u64) {
        let total = self.total.load(Ordering::Relaxed);
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();

        let percent = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        if current > 0 && current < total {
            let rate = current as f64 / elapsed_secs.max(f64::EPSILON);
            let remaining = (total - current) as f64 / rate;
            info!(
                "{} {}/{} ({:.1}%) - elapsed: {} - ETA: {}",
                self.label,
                current,
                total,
                percent,
                format_duration(elapsed_secs),
                format_duration(remaining),
            );
        } else if current == total {
            info!(
                "{} {}/{} (100.0%) - completed in {}",
                self.label,
                current,
                total,
                format_duration(elapsed_secs),
            );
        }
    }
}

impl ProgressReporter for ProgressTracker {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Planned { segments, frames } => {
                self.total.store(*frames, Ordering::Relaxed);
                info!("{} planned {} segments, {} frames", self.label, segments, frames);
            }
            ProgressEvent::BatchFinished { frames_done, .. } => {
                self.processed.store(*frames_done, Ordering::Relaxed);
                self.print_progress(*frames_done);
            }
            ProgressEvent::BatchStarted { .. } | ProgressEvent::Finished { .. } => {}
        }
    }
}

/// Formats seconds into a human-readable duration string
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining = secs - (mins as f64 * 60.0);
        format!("{}m {:.0}s", mins, remaining)
    } else {
        let hours = (secs / 3600.0).floor() as u64;
        let remaining = secs - (hours as f64 * 3600.0);
        let mins = (remaining / 60.0).floor() as u64;
        let remaining_secs = remaining - (mins as f64 * 60.0);
        format!("{}h {}m {:.0}s", hours, mins, remaining_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(12.34), "12.3s");
        assert_eq!(format_duration(125.0), "2m 5s");
        assert_eq!(format_duration(3725.0), "1h 2m 5s");
    }

    #[test]
    fn test_tracker_follows_batches() {
        let tracker = ProgressTracker::new("Encoding");
        tracker.report(&ProgressEvent::Planned {
            segments: 3,
            frames: 10,
        });
        tracker.report(&ProgressEvent::BatchFinished {
            batch: 0,
            segments_done: 2,
            frames_done: 4,
            resident_images: BTreeSet::from([1]),
        });
        assert_eq!(tracker.processed(), 4);
    }

    #[test]
    fn test_closure_reporter() {
        let seen = RefCell::new(Vec::new());
        let reporter = |event: &ProgressEvent| seen.borrow_mut().push(event.clone());
        reporter.report(&ProgressEvent::Finished { frames: 3 });
        assert_eq!(seen.into_inner(), vec![ProgressEvent::Finished { frames: 3 }]);
    }
}
