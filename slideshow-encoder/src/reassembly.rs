//! Ordered reassembly of completed segments
//!
//! Workers finish segments in any order. The reassembly stage is the single
//! consumer that restores timeline order: it buffers out-of-order segments,
//! drains them strictly by ascending index and renumbers their frames into
//! one gap-free global sequence for the container writer.

use crate::{Error, Result};
use crossbeam::channel::Receiver;
use slideshow_core::{ContainerWriter, EncodedSegment, GlobalFrame};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Sequential drain from the completed-segment channel into a container
pub struct Reassembly<'w, W: ContainerWriter + ?Sized> {
    writer: &'w mut W,
    total_segments: usize,
    next_expected: usize,
    frames_written: u64,
    pending: BTreeMap<usize, EncodedSegment>,
}

impl<'w, W: ContainerWriter + ?Sized> Reassembly<'w, W> {
    /// Creates a stage expecting segments `0..total_segments`.
    ///
    /// The writer must already have begun its track.
    pub fn new(writer: &'w mut W, total_segments: usize) -> Self {
        Self {
            writer,
            total_segments,
            next_expected: 0,
            frames_written: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Next segment index to be written
    pub fn next_expected(&self) -> usize {
        self.next_expected
    }

    /// Frames handed to the writer so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Drains `completed` until every segment was written, then finishes the
    /// writer and returns the number of frames written.
    ///
    /// When every sender is dropped before all segments arrived the run ends
    /// with [`Error::MissingSegment`] and the writer is not finished. Any
    /// failure raises `halted` so the producer stops dispatching work.
    pub fn run(mut self, completed: Receiver<EncodedSegment>, halted: &AtomicBool) -> Result<u64> {
        let result = self.drain(&completed);
        if result.is_err() {
            halted.store(true, Ordering::Release);
        }
        result
    }

    fn drain(&mut self, completed: &Receiver<EncodedSegment>) -> Result<u64> {
        while self.next_expected < self.total_segments {
            while let Some(segment) = self.pending.remove(&self.next_expected) {
                self.emit(segment)?;
            }
            if self.next_expected == self.total_segments {
                break;
            }

            match completed.recv() {
                Ok(segment) => self.accept(segment),
                Err(_) => {
                    debug!(
                        next = self.next_expected,
                        buffered = self.pending.len(),
                        "production stopped before every segment arrived"
                    );
                    return Err(Error::MissingSegment(self.next_expected));
                }
            }
        }

        self.writer.finish().map_err(Error::Mux)?;
        debug!(frames = self.frames_written, "reassembly finished");
        Ok(self.frames_written)
    }

    fn accept(&mut self, segment: EncodedSegment) {
        let index = segment.index;
        if index < self.next_expected || index >= self.total_segments {
            warn!(segment = index, "ignoring segment outside the expected range");
            return;
        }
        if self.pending.insert(index, segment).is_some() {
            warn!(segment = index, "segment published twice; keeping the latest");
        }
    }

    fn emit(&mut self, segment: EncodedSegment) -> Result<()> {
        for frame in segment.frames {
            let global = GlobalFrame::from_encoded(self.frames_written, frame);
            self.writer.append_frame(&global).map_err(Error::Mux)?;
            self.frames_written += 1;
        }
        self.next_expected += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use proptest::prelude::*;
    use slideshow_core::{EncodedFrame, TrackInfo};

    #[derive(Default)]
    struct RecordingWriter {
        frames: Vec<GlobalFrame>,
        finished: bool,
        fail_at: Option<u64>,
    }

    impl ContainerWriter for RecordingWriter {
        fn begin(&mut self, _track: TrackInfo) -> slideshow_core::Result<()> {
            Ok(())
        }

        fn append_frame(&mut self, frame: &GlobalFrame) -> slideshow_core::Result<()> {
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

    fn segment(index: usize, frames: u32) -> EncodedSegment {
        EncodedSegment::new(
            index,
            (0..frames)
                .map(|f| EncodedFrame::new(f, vec![index as u8, f as u8], f == 0))
                .collect(),
        )
    }

    #[test]
    fn test_drains_out_of_order_segments_in_order() {
        let mut writer = RecordingWriter::default();
        let (tx, rx) = channel::unbounded();
        for index in [2, 0, 3, 1] {
            tx.send(segment(index, 2)).unwrap();
        }
        drop(tx);

        let halted = AtomicBool::new(false);
        let frames = Reassembly::new(&mut writer, 4).run(rx, &halted).unwrap();

        assert_eq!(frames, 8);
        assert!(writer.finished);
        assert!(!halted.load(Ordering::Acquire));
        let numbers: Vec<_> = writer.frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, (0..8).collect::<Vec<_>>());
        let owners: Vec<_> = writer.frames.iter().map(|f| f.payload[0]).collect();
        assert_eq!(owners, vec![0, 0, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_empty_segments_advance_the_cursor() {
        let mut writer = RecordingWriter::default();
        let (tx, rx) = channel::unbounded();
        tx.send(segment(1, 0)).unwrap();
        tx.send(segment(0, 1)).unwrap();
        tx.send(segment(2, 1)).unwrap();
        drop(tx);

        let halted = AtomicBool::new(false);
        let frames = Reassembly::new(&mut writer, 3).run(rx, &halted).unwrap();

        assert_eq!(frames, 2);
        assert_eq!(writer.frames[1].payload, vec![2, 0]);
        assert_eq!(writer.frames[1].frame_number, 1);
    }

    #[test]
    fn test_missing_segment_after_production_stops() {
        let mut writer = RecordingWriter::default();
        let (tx, rx) = channel::unbounded();
        tx.send(segment(0, 1)).unwrap();
        tx.send(segment(2, 1)).unwrap();
        drop(tx);

        let halted = AtomicBool::new(false);
        let err = Reassembly::new(&mut writer, 3).run(rx, &halted).unwrap_err();

        assert!(matches!(err, Error::MissingSegment(1)));
        assert!(halted.load(Ordering::Acquire));
        assert!(!writer.finished);
        assert_eq!(writer.frames.len(), 1);
    }

    #[test]
    fn test_writer_failure_is_mux_error() {
        let mut writer = RecordingWriter {
            fail_at: Some(1),
            ..Default::default()
        };
        let (tx, rx) = channel::unbounded();
        tx.send(segment(0, 3)).unwrap();
        drop(tx);

        let halted = AtomicBool::new(false);
        let err = Reassembly::new(&mut writer, 1).run(rx, &halted).unwrap_err();

        assert!(matches!(err, Error::Mux(_)));
        assert!(halted.load(Ordering::Acquire));
        assert!(!writer.finished);
    }

    #[test]
    fn test_no_segments_finishes_immediately() {
        let mut writer = RecordingWriter::default();
        let (_tx, rx) = channel::unbounded();

        let halted = AtomicBool::new(false);
        let frames = Reassembly::new(&mut writer, 0).run(rx, &halted).unwrap();

        assert_eq!(frames, 0);
        assert!(writer.finished);
    }

    fn counts_and_arrival() -> impl Strategy<Value = (Vec<u32>, Vec<usize>)> {
        prop::collection::vec(0u32..4, 1..16).prop_flat_map(|counts| {
            let order: Vec<usize> = (0..counts.len()).collect();
            (Just(counts), Just(order).prop_shuffle())
        })
    }

    proptest! {
        #[test]
        fn arrival_order_does_not_change_output((counts, arrival) in counts_and_arrival()) {
            let expected: Vec<GlobalFrame> = counts
                .iter()
                .enumerate()
                .flat_map(|(index, &n)| segment(index, n).frames)
                .enumerate()
                .map(|(number, frame)| GlobalFrame::from_encoded(number as u64, frame))
                .collect();

            let mut writer = RecordingWriter::default();
            let (tx, rx) = channel::unbounded();
            for &index in &arrival {
                tx.send(segment(index, counts[index])).unwrap();
            }
            drop(tx);

            let halted = AtomicBool::new(false);
            let frames = Reassembly::new(&mut writer, counts.len()).run(rx, &halted).unwrap();

            prop_assert!(writer.finished);
            prop_assert_eq!(frames, expected.len() as u64);
            let numbers: Vec<u64> = writer.frames.iter().map(|f| f.frame_number).collect();
            prop_assert_eq!(numbers, (0..expected.len() as u64).collect::<Vec<_>>());
            prop_assert_eq!(writer.frames, expected);
        }
    }
}
