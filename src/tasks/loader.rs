use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fast_image_resize as fir;
use futures::FutureExt;
use futures::future::BoxFuture;
use image::RgbaImage;
use parking_lot::Mutex;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{FetchError, FetchResult};
use crate::events::DecodedFrame;
use crate::gallery::{FrameFetcher, IdentityResolver, UrlResolver};

pub const DEFAULT_FULL_CACHE_CAPACITY: usize = 64;

/// Frame backend that decodes local image files.
///
/// Resolved locations are file paths, optionally prefixed with `file://`;
/// a query string is ignored here since the width hint is honoured by
/// downscaling after decode. Full-size results are kept in a small cache so
/// the prefetch pass makes later binds instantaneous.
pub struct DecodingFetcher {
    resolver: Arc<dyn UrlResolver>,
    cancel: Mutex<CancellationToken>,
    full_cache: Arc<Mutex<FullSizeCache>>,
}

impl DecodingFetcher {
    pub fn new(resolver: Arc<dyn UrlResolver>, full_cache_capacity: usize) -> Self {
        Self {
            resolver,
            cancel: Mutex::new(CancellationToken::new()),
            full_cache: Arc::new(Mutex::new(FullSizeCache::new(full_cache_capacity))),
        }
    }

    /// Cached full-size frame for an already resolved location.
    pub fn cached_full(&self, location: &str) -> Option<Arc<DecodedFrame>> {
        self.full_cache.lock().get(location)
    }

    fn request(&self, url: &str, width: u32, index: usize, memoize: bool) -> BoxFuture<'static, FetchResult> {
        let location = self.resolver.resolve(url, width);
        let token = self.cancel.lock().clone();
        let cache = memoize.then(|| Arc::clone(&self.full_cache));

        async move {
            if let Some(hit) = cache.as_ref().and_then(|cache| cache.lock().get(&location)) {
                trace!(index, %location, "full-size cache hit");
                return Ok(Some(DecodedFrame::clone(&hit)));
            }

            let path = local_path(&location);
            let source = location.clone();
            let decode = tokio::task::spawn_blocking(move || decode_frame(&path, source, width));
            let frame = select! {
                _ = token.cancelled() => return Err(FetchError::Cancelled),
                joined = decode => joined??,
            };
            debug!(index, %location, width = frame.width, height = frame.height, "decoded frame");

            if let Some(cache) = cache {
                cache.lock().insert(location, Arc::new(frame.clone()));
            }
            Ok(Some(frame))
        }
        .boxed()
    }
}

impl Default for DecodingFetcher {
    fn default() -> Self {
        Self::new(Arc::new(IdentityResolver), DEFAULT_FULL_CACHE_CAPACITY)
    }
}

impl FrameFetcher for DecodingFetcher {
    fn load_thumbnail(&self, url: &str, width: u32, index: usize) -> BoxFuture<'static, FetchResult> {
        self.request(url, width, index, false)
    }

    fn load_full(&self, url: &str, width: u32, index: usize) -> BoxFuture<'static, FetchResult> {
        self.request(url, width, index, true)
    }

    fn cancel_all(&self) {
        let mut token = self.cancel.lock();
        token.cancel();
        *token = CancellationToken::new();
        debug!("cancelled outstanding frame requests");
    }
}

/// Insertion-ordered cache; the oldest entry goes first once full.
struct FullSizeCache {
    capacity: usize,
    order: VecDeque<String>,
    frames: HashMap<String, Arc<DecodedFrame>>,
}

impl FullSizeCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            frames: HashMap::new(),
        }
    }

    fn get(&self, location: &str) -> Option<Arc<DecodedFrame>> {
        self.frames.get(location).cloned()
    }

    fn insert(&mut self, location: String, frame: Arc<DecodedFrame>) {
        if self.capacity == 0 {
            return;
        }
        if self.frames.insert(location.clone(), frame).is_none() {
            self.order.push_back(location);
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.frames.remove(&evicted);
            }
        }
    }
}

fn local_path(location: &str) -> PathBuf {
    let location = location.strip_prefix("file://").unwrap_or(location);
    let location = location.split(['?', '#']).next().unwrap_or(location);
    PathBuf::from(location)
}

fn decode_frame(path: &Path, source: String, width: u32) -> Result<DecodedFrame, FetchError> {
    let img = decode_rgba8_apply_exif(path, &source)?;
    let img = fit_width(img, width, &source)?;
    let (width, height) = img.dimensions();
    Ok(DecodedFrame {
        source,
        width,
        height,
        pixels: img.into_raw(),
    })
}

// Decodes an image to RGBA8 and applies EXIF orientation if available.
// Orientation handling is best-effort; without metadata the decoded
// orientation is kept.
fn decode_rgba8_apply_exif(path: &Path, location: &str) -> Result<RgbaImage, FetchError> {
    let io_error = |source| FetchError::Io {
        location: location.to_owned(),
        source,
    };
    let img = image::ImageReader::open(path)
        .map_err(io_error)?
        .with_guessed_format()
        .map_err(io_error)?
        .decode()
        .map_err(|source| FetchError::Decode {
            location: location.to_owned(),
            source,
        })?;
    let img = img.to_rgba8();

    let oriented = match read_orientation(path).unwrap_or(1) {
        2 => image::imageops::flip_horizontal(&img),
        3 => image::imageops::rotate180(&img),
        4 => image::imageops::flip_vertical(&img),
        // transpose: rotate90 + flip_horizontal
        5 => image::imageops::flip_horizontal(&image::imageops::rotate90(&img)),
        6 => image::imageops::rotate90(&img),
        // transverse: rotate270 + flip_horizontal
        7 => image::imageops::flip_horizontal(&image::imageops::rotate270(&img)),
        8 => image::imageops::rotate270(&img),
        _ => img,
    };
    Ok(oriented)
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    trace!(orientation, path = %path.display(), "exif orientation");
    Some(orientation)
}

/// Downscales to `width`, keeping the aspect ratio. Never upscales.
fn fit_width(source: RgbaImage, width: u32, location: &str) -> Result<RgbaImage, FetchError> {
    if width == 0 || source.width() <= width {
        return Ok(source);
    }
    let height = ((u64::from(source.height()) * u64::from(width)) / u64::from(source.width())).max(1) as u32;
    let resize_error = |message: String| FetchError::Resize {
        location: location.to_owned(),
        message,
    };

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .map_err(|err| resize_error(err.to_string()))?;
    let mut dst_image = fir::images::Image::new(width, height, fir::PixelType::U8x4);
    let options =
        fir::ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .map_err(|err| resize_error(err.to_string()))?;
    RgbaImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| resize_error("resized buffer has unexpected length".into()))
}
