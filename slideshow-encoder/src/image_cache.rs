//! Input images: discovery, decoding and the sliding-window cache

use crate::{Error, Result};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions accepted as slideshow input (compared case-insensitively)
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// An ordered, indexable sequence of still images
pub trait ImageSource: Sync {
    /// Number of images in the sequence
    fn len(&self) -> usize;

    /// Returns true when the sequence has no images
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canvas size every loaded image is delivered at
    fn dimensions(&self) -> (u32, u32);

    /// Decodes image `index`
    fn load(&self, index: usize) -> Result<RgbaImage>;

    /// Where the images come from, for messages
    fn location(&self) -> String;
}

/// Images found in a directory, ordered by file name
#[derive(Debug, Clone)]
pub struct DirectoryImages {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    width: u32,
    height: u32,
}

impl DirectoryImages {
    /// Scans `dir` for `.jpg`, `.jpeg` and `.png` files.
    ///
    /// The canvas takes the size of the first image; its header is read
    /// without decoding the pixels.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not a directory: {}", dir.display()),
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let Some(first) = paths.first() else {
            return Err(Error::NoInputFound(dir.display().to_string()));
        };
        let (width, height) = image::image_dimensions(first).map_err(|e| Error::ImageLoad {
            index: 0,
            message: format!("{}: {}", first.display(), e),
        })?;

        debug!(dir = %dir.display(), images = paths.len(), width, height, "scanned input directory");
        Ok(Self {
            dir,
            paths,
            width,
            height,
        })
    }

    /// Paths of the images in slideshow order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl ImageSource for DirectoryImages {
    fn len(&self) -> usize {
        self.paths.len()
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn load(&self, index: usize) -> Result<RgbaImage> {
        let path = self.paths.get(index).ok_or_else(|| Error::ImageLoad {
            index,
            message: format!("index out of range ({} images)", self.paths.len()),
        })?;
        let decoded = image::open(path).map_err(|e| Error::ImageLoad {
            index,
            message: format!("{}: {}", path.display(), e),
        })?;
        Ok(fit_to_canvas(decoded.to_rgba8(), self.width, self.height))
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Flattens `image` onto opaque black and, if its size differs from the
/// canvas, scales it to fit (preserving aspect ratio) and centers it.
pub fn fit_to_canvas(mut image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    for pixel in image.pixels_mut() {
        let alpha = pixel[3] as u32;
        if alpha < 255 {
            *pixel = Rgba([
                (pixel[0] as u32 * alpha / 255) as u8,
                (pixel[1] as u32 * alpha / 255) as u8,
                (pixel[2] as u32 * alpha / 255) as u8,
                255,
            ]);
        }
    }

    if image.dimensions() == (width, height) {
        return image;
    }

    let scale = f64::min(
        width as f64 / image.width() as f64,
        height as f64 / image.height() as f64,
    );
    let fit_width = ((image.width() as f64 * scale).round() as u32).clamp(1, width);
    let fit_height = ((image.height() as f64 * scale).round() as u32).clamp(1, height);
    let resized = imageops::resize(&image, fit_width, fit_height, FilterType::Triangle);

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    let x = (width - fit_width) / 2;
    let y = (height - fit_height) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
    canvas
}

/// Decoded images kept resident while some pending segment still needs them.
///
/// Only the coordinator mutates the cache, and only between batches; workers
/// read it through a shared reference while a batch runs.
#[derive(Debug, Default)]
pub struct ImageCache {
    resident: HashMap<usize, RgbaImage>,
    loads: usize,
}

impl ImageCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every image in `indices` that is not resident yet.
    ///
    /// Returns the number of images decoded by this call.
    pub fn ensure_loaded<S: ImageSource + ?Sized>(
        &mut self,
        source: &S,
        indices: &BTreeSet<usize>,
    ) -> Result<usize> {
        let mut loaded = 0;
        for &index in indices {
            if self.resident.contains_key(&index) {
                continue;
            }
            let image = source.load(index)?;
            debug!(index, "loaded image");
            self.resident.insert(index, image);
            loaded += 1;
        }
        self.loads += loaded;
        Ok(loaded)
    }

    /// Drops every resident image whose index is not in `keep`.
    ///
    /// Returns the number of images evicted.
    pub fn evict_except(&mut self, keep: &BTreeSet<usize>) -> usize {
        let before = self.resident.len();
        self.resident.retain(|index, _| keep.contains(index));
        let evicted = before - self.resident.len();
        if evicted > 0 {
            debug!(evicted, resident = self.resident.len(), "evicted images");
        }
        evicted
    }

    /// Borrows a resident image
    pub fn get(&self, index: usize) -> Option<&RgbaImage> {
        self.resident.get(&index)
    }

    /// Indices of resident images, ascending
    pub fn resident_indices(&self) -> BTreeSet<usize> {
        self.resident.keys().copied().collect()
    }

    /// Number of resident images
    pub fn len(&self) -> usize {
        self.resident.len()
    }

    /// Returns true when no image is resident
    pub fn is_empty(&self) -> bool {
        self.resident.is_empty()
    }

    /// Total images decoded over the cache's lifetime
    pub fn total_loads(&self) -> usize {
        self.loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        count: usize,
        loads: AtomicUsize,
    }

    impl ImageSource for CountingSource {
        fn len(&self) -> usize {
            self.count
        }

        fn dimensions(&self) -> (u32, u32) {
            (2, 2)
        }

        fn load(&self, index: usize) -> Result<RgbaImage> {
            if index >= self.count {
                return Err(Error::ImageLoad {
                    index,
                    message: "out of range".to_string(),
                });
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(RgbaImage::from_pixel(2, 2, Rgba([index as u8, 0, 0, 255])))
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    fn set(indices: &[usize]) -> BTreeSet<usize> {
        indices.iter().copied().collect()
    }

    #[test]
    fn test_ensure_loaded_skips_resident_images() {
        let source = CountingSource {
            count: 4,
            loads: AtomicUsize::new(0),
        };
        let mut cache = ImageCache::new();

        assert_eq!(cache.ensure_loaded(&source, &set(&[0, 1])).unwrap(), 2);
        assert_eq!(cache.ensure_loaded(&source, &set(&[1, 2])).unwrap(), 1);
        assert_eq!(source.loads.load(Ordering::SeqCst), 3);
        assert_eq!(cache.total_loads(), 3);
        assert_eq!(cache.get(2).unwrap().get_pixel(0, 0)[0], 2);
    }

    #[test]
    fn test_evict_except() {
        let source = CountingSource {
            count: 4,
            loads: AtomicUsize::new(0),
        };
        let mut cache = ImageCache::new();
        cache.ensure_loaded(&source, &set(&[0, 1, 2])).unwrap();

        assert_eq!(cache.evict_except(&set(&[2, 3])), 2);
        assert_eq!(cache.resident_indices(), set(&[2]));
        assert!(cache.get(0).is_none());
    }

    #[test]
    fn test_load_failure_propagates() {
        let source = CountingSource {
            count: 1,
            loads: AtomicUsize::new(0),
        };
        let mut cache = ImageCache::new();

        let err = cache.ensure_loaded(&source, &set(&[0, 5])).unwrap_err();
        assert!(matches!(err, Error::ImageLoad { index: 5, .. }));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fit_to_canvas_letterboxes() {
        let image = RgbaImage::from_pixel(4, 2, Rgba([255, 255, 255, 255]));
        let fitted = fit_to_canvas(image, 4, 4);

        assert_eq!(fitted.dimensions(), (4, 4));
        assert_eq!(fitted.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(fitted.get_pixel(2, 2)[3], 255);
        assert_eq!(fitted.get_pixel(0, 3), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_fit_to_canvas_flattens_transparency() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 0]));
        let fitted = fit_to_canvas(image, 2, 2);
        assert_eq!(fitted.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
    }
}
