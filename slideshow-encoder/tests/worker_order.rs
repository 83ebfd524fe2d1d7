mod common;

use common::{color, MemorySource, RecordingWriter};
use crossbeam::channel;
use image::RgbaImage;
use slideshow_core::{SegmentKind, SegmentSpec};
use slideshow_encoder::reassembly::Reassembly;
use slideshow_encoder::{EncodedPayload, EncoderSession, FrameEncoder, ImageCache, Result, WorkerPool};
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

const IMAGES: usize = 4;

/// Sleeps longer the lower the image index, so segments finish in reverse
struct SlowFirstEncoder;

struct SlowFirstSession;

impl EncoderSession for SlowFirstSession {
    fn encode(&mut self, frame: &RgbaImage) -> Result<EncodedPayload> {
        let red = frame.get_pixel(0, 0)[0];
        let index = (0..IMAGES)
            .find(|&i| color(i)[0] == red)
            .unwrap_or(IMAGES);
        thread::sleep(Duration::from_millis(40 * (IMAGES - index) as u64));
        Ok(EncodedPayload {
            data: vec![index as u8],
            key_frame: true,
        })
    }
}

impl FrameEncoder for SlowFirstEncoder {
    type Session = SlowFirstSession;

    fn new_session(&self, _width: u32, _height: u32) -> Result<SlowFirstSession> {
        Ok(SlowFirstSession)
    }

    fn name(&self) -> &str {
        "slow-first"
    }
}

fn hold(index: usize) -> SegmentSpec {
    SegmentSpec {
        index,
        kind: SegmentKind::Hold,
        image_a: Some(index),
        image_b: None,
        frame_count: 1,
    }
}

#[test]
fn test_pool_wider_than_cpus_completes_out_of_order() {
    let source = MemorySource::new(IMAGES);
    let mut cache = ImageCache::new();
    cache
        .ensure_loaded(&source, &(0..IMAGES).collect::<BTreeSet<_>>())
        .unwrap();
    let batch: Vec<_> = (0..IMAGES).map(hold).collect();

    // the pool runs one thread per segment whatever the core count
    let pool = WorkerPool::new(&SlowFirstEncoder, IMAGES);
    let (tx, rx) = channel::unbounded();
    let outcome = pool.encode_batch(&batch, &cache, &tx).unwrap();
    drop(tx);
    assert_eq!(outcome.segments, IMAGES);

    let arrived: Vec<_> = rx.iter().collect();
    let arrival: Vec<_> = arrived.iter().map(|s| s.index).collect();
    assert_eq!(arrival, vec![3, 2, 1, 0]);

    let (tx, rx) = channel::unbounded();
    for segment in arrived {
        tx.send(segment).unwrap();
    }
    drop(tx);
    let mut writer = RecordingWriter::default();
    writer.track = Some(slideshow_core::TrackInfo {
        width: common::WIDTH,
        height: common::HEIGHT,
        frame_rate: slideshow_core::FrameRate::new(30, 1),
    });
    let halted = AtomicBool::new(false);
    let frames = Reassembly::new(&mut writer, IMAGES).run(rx, &halted).unwrap();

    assert_eq!(frames, IMAGES as u64);
    assert!(writer.finished);
    let payloads: Vec<_> = writer.frames.iter().map(|f| f.payload[0]).collect();
    assert_eq!(payloads, vec![0, 1, 2, 3]);
    assert_eq!(writer.frame_numbers(), vec![0, 1, 2, 3]);
}
