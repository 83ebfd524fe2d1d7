//! SSV container format serialization and deserialization
//!
//! An SSV file is a single video track of opaque encoded frames stored in
//! presentation order:
//!
//! ```text
//! header   "SSV\0" | version u16 | width u32 | height u32 | fps_num u32 | fps_den u32
//! frame*   frame_number u64 | flags u8 | length u32 | payload
//! trailer  u64::MAX | frame_count u64 | "SSVE"
//! ```
//!
//! All integers are little endian. A file without a valid trailer was never
//! finished and is reported as [`Error::Truncated`].

use crate::{Error, FrameRate, GlobalFrame, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes for SSV format: "SSV\0"
const MAGIC: [u8; 4] = [b'S', b'S', b'V', 0];

/// Magic bytes closing a finished file
const END_MAGIC: [u8; 4] = [b'S', b'S', b'V', b'E'];

/// Current SSV format version
const VERSION: u16 = 1;

/// Frame number value that introduces the trailer
const TRAILER_MARKER: u64 = u64::MAX;

const FLAG_KEY_FRAME: u8 = 0x01;

/// Track metadata handed to a container writer before the first frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfo {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timescale of the track
    pub frame_rate: FrameRate,
}

/// Sink for encoded frames in presentation order.
///
/// Ordering contract: `append_frame` is called with strictly increasing
/// `frame_number`, starting at 0. `finish` is called once, only when every
/// frame was appended; an aborted run never calls it.
pub trait ContainerWriter: Send {
    /// Called once before any frame is appended.
    fn begin(&mut self, track: TrackInfo) -> Result<()>;
    /// Append the next frame of the track.
    fn append_frame(&mut self, frame: &GlobalFrame) -> Result<()>;
    /// Flush and finalize the container.
    fn finish(&mut self) -> Result<()>;
}

/// SSV file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsvHeader {
    /// Format version
    pub version: u16,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame rate numerator
    pub fps_num: u32,
    /// Frame rate denominator
    pub fps_den: u32,
}

impl SsvHeader {
    /// Creates a header for the given track
    pub fn new(track: &TrackInfo) -> Self {
        Self {
            version: VERSION,
            width: track.width,
            height: track.height,
            fps_num: track.frame_rate.num,
            fps_den: track.frame_rate.den,
        }
    }

    /// Reads a header from a reader
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(truncated_on_eof)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic);
        }

        let version = reader.read_u16::<LittleEndian>().map_err(truncated_on_eof)?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let width = reader.read_u32::<LittleEndian>().map_err(truncated_on_eof)?;
        let height = reader.read_u32::<LittleEndian>().map_err(truncated_on_eof)?;
        let fps_num = reader.read_u32::<LittleEndian>().map_err(truncated_on_eof)?;
        let fps_den = reader.read_u32::<LittleEndian>().map_err(truncated_on_eof)?;

        Ok(Self {
            version,
            width,
            height,
            fps_num,
            fps_den,
        })
    }

    /// Writes the header to a writer
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.width)?;
        writer.write_u32::<LittleEndian>(self.height)?;
        writer.write_u32::<LittleEndian>(self.fps_num)?;
        writer.write_u32::<LittleEndian>(self.fps_den)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Writing,
    Finished,
}

/// Streams an SSV container into any writer
pub struct SsvWriter<W: Write> {
    writer: W,
    state: WriterState,
    next_frame: u64,
}

impl<W: Write> SsvWriter<W> {
    /// Wraps a writer; nothing is written until `begin`
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            state: WriterState::Idle,
            next_frame: 0,
        }
    }

    /// Number of frames appended so far
    pub fn frames_written(&self) -> u64 {
        self.next_frame
    }

    /// Returns true once the trailer was written
    pub fn is_finished(&self) -> bool {
        self.state == WriterState::Finished
    }

    /// Unwraps the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ContainerWriter for SsvWriter<W> {
    fn begin(&mut self, track: TrackInfo) -> Result<()> {
        if self.state != WriterState::Idle {
            return Err(Error::NotWriting);
        }
        SsvHeader::new(&track).write(&mut self.writer)?;
        self.state = WriterState::Writing;
        Ok(())
    }

    fn append_frame(&mut self, frame: &GlobalFrame) -> Result<()> {
        if self.state != WriterState::Writing {
            return Err(Error::NotWriting);
        }
        if frame.frame_number != self.next_frame {
            return Err(Error::FrameOrder {
                expected: self.next_frame,
                got: frame.frame_number,
            });
        }

        let flags = if frame.key_frame { FLAG_KEY_FRAME } else { 0 };
        let len = u32::try_from(frame.payload.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "frame payload exceeds 4 GiB")
        })?;

        self.writer.write_u64::<LittleEndian>(frame.frame_number)?;
        self.writer.write_u8(flags)?;
        self.writer.write_u32::<LittleEndian>(len)?;
        self.writer.write_all(&frame.payload)?;

        self.next_frame += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.state != WriterState::Writing {
            return Err(Error::NotWriting);
        }
        self.writer.write_u64::<LittleEndian>(TRAILER_MARKER)?;
        self.writer.write_u64::<LittleEndian>(self.next_frame)?;
        self.writer.write_all(&END_MAGIC)?;
        self.writer.flush()?;
        self.state = WriterState::Finished;
        Ok(())
    }
}

/// Writes an SSV file next to its final path and moves it into place only
/// after `finish` succeeds, so an aborted run never leaves a file that looks
/// complete.
pub struct FileContainerWriter {
    path: PathBuf,
    partial_path: PathBuf,
    inner: Option<SsvWriter<BufWriter<File>>>,
}

impl FileContainerWriter {
    /// Creates the temporary file for `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let partial_path = partial_path_for(&path);
        let file = File::create(&partial_path)?;
        debug!(path = %partial_path.display(), "created partial container");

        Ok(Self {
            path,
            partial_path,
            inner: Some(SsvWriter::new(BufWriter::new(file))),
        })
    }

    /// Final output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temporary path written until the container is finished
    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    fn writer(&mut self) -> Result<&mut SsvWriter<BufWriter<File>>> {
        self.inner.as_mut().ok_or(Error::NotWriting)
    }
}

impl ContainerWriter for FileContainerWriter {
    fn begin(&mut self, track: TrackInfo) -> Result<()> {
        self.writer()?.begin(track)
    }

    fn append_frame(&mut self, frame: &GlobalFrame) -> Result<()> {
        self.writer()?.append_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        self.writer()?.finish()?;

        let Some(writer) = self.inner.take() else {
            return Err(Error::NotWriting);
        };
        if let Err(e) = self.persist(writer) {
            remove_partial(&self.partial_path);
            return Err(e);
        }
        debug!(path = %self.path.display(), "container finished");
        Ok(())
    }
}

impl FileContainerWriter {
    fn persist(&self, writer: SsvWriter<BufWriter<File>>) -> Result<()> {
        let file = writer.into_inner().into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.partial_path, &self.path)?;
        Ok(())
    }
}

impl Drop for FileContainerWriter {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            remove_partial(&self.partial_path);
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove partial container");
    }
}

/// Complete SSV container read back into memory
#[derive(Debug, Clone)]
pub struct SsvContainer {
    /// Container header
    pub header: SsvHeader,
    /// Frames in presentation order
    pub frames: Vec<GlobalFrame>,
}

impl SsvContainer {
    /// Reads an SSV container from a reader
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let header = SsvHeader::read(&mut reader)?;

        let mut frames = Vec::new();
        loop {
            let frame_number = reader.read_u64::<LittleEndian>().map_err(truncated_on_eof)?;
            if frame_number == TRAILER_MARKER {
                break;
            }

            let flags = reader.read_u8().map_err(truncated_on_eof)?;
            let len = reader.read_u32::<LittleEndian>().map_err(truncated_on_eof)?;
            let mut payload = Vec::new();
            reader.by_ref().take(len as u64).read_to_end(&mut payload)?;
            if payload.len() != len as usize {
                return Err(Error::Truncated);
            }

            frames.push(GlobalFrame {
                frame_number,
                payload,
                key_frame: flags & FLAG_KEY_FRAME != 0,
            });
        }

        let frame_count = reader.read_u64::<LittleEndian>().map_err(truncated_on_eof)?;
        let mut end_magic = [0u8; 4];
        reader.read_exact(&mut end_magic).map_err(truncated_on_eof)?;
        if end_magic != END_MAGIC || frame_count != frames.len() as u64 {
            return Err(Error::Truncated);
        }

        Ok(Self { header, frames })
    }

    /// Opens and reads an SSV file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::read(io::BufReader::new(file))
    }

    /// Calculates the frame rate as a float
    pub fn fps(&self) -> f64 {
        self.header.fps_num as f64 / self.header.fps_den as f64
    }

    /// Duration of the track in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 / self.fps()
    }

    /// Number of key frames in the track
    pub fn key_frame_count(&self) -> usize {
        self.frames.iter().filter(|f| f.key_frame).count()
    }

    /// Total payload size in bytes
    pub fn payload_size(&self) -> usize {
        self.frames.iter().map(|f| f.payload.len()).sum()
    }
}

fn partial_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

fn truncated_on_eof(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Truncated
    } else {
        Error::Io(e)
    }
}
