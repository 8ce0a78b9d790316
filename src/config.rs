use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::gallery::DEFAULT_THUMBNAIL_PROPORTION;
use crate::presenter::DEFAULT_FRAME_DELAY;
use crate::presenter::fling::DefaultFlingPhysics;
use crate::tasks::loader::DEFAULT_FULL_CACHE_CAPACITY;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Frame locations in rotation order.
    pub frames: Vec<String>,
    /// Directory whose image files are appended to `frames`, sorted by path.
    pub frame_directory: Option<PathBuf>,
    /// Full-size frame width in pixels.
    pub base_width: u32,
    /// Thumbnails are requested at `base-width / thumbnail-proportion`.
    pub thumbnail_proportion: u32,
    pub fling: DefaultFlingPhysics,
    pub gesture: GestureSettings,
    pub rotation: RotationSettings,
    /// Full-size frames memoised by the decoding backend.
    pub full_cache_capacity: usize,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.base_width > 0, "base-width must be greater than zero");
        ensure!(
            self.thumbnail_proportion >= 1,
            "thumbnail-proportion must be >= 1"
        );
        ensure!(
            self.base_width / self.thumbnail_proportion > 0,
            "thumbnail width (base-width / thumbnail-proportion) must be greater than zero"
        );
        self.gesture.validate()?;
        ensure!(
            self.fling.min_spins >= 1,
            "fling.min-spins must be >= 1"
        );
        Ok(self)
    }

    /// Configured frames followed by the image files of `frame-directory`.
    pub fn frame_urls(&self) -> Result<Vec<String>> {
        let mut urls = self.frames.clone();
        if let Some(dir) = &self.frame_directory {
            let found = scan_frame_directory(dir)
                .with_context(|| format!("scanning frame directory {}", dir.display()))?;
            debug!(count = found.len(), dir = %dir.display(), "scanned frame directory");
            urls.extend(found);
        }
        Ok(urls)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            frame_directory: None,
            base_width: 1080,
            thumbnail_proportion: DEFAULT_THUMBNAIL_PROPORTION,
            fling: DefaultFlingPhysics::default(),
            gesture: GestureSettings::default(),
            rotation: RotationSettings::default(),
            full_cache_capacity: DEFAULT_FULL_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct GestureSettings {
    /// Device maximum fling velocity in pixels per second.
    pub maximum_fling_velocity: f32,
    /// Drag threshold is the view width divided by this.
    pub touch_distance_divisor: u32,
}

impl GestureSettings {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.maximum_fling_velocity > 0.0,
            "gesture.maximum-fling-velocity must be positive"
        );
        ensure!(
            self.touch_distance_divisor >= 1,
            "gesture.touch-distance-divisor must be >= 1"
        );
        Ok(())
    }
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            maximum_fling_velocity: 8000.0,
            touch_distance_divisor: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RotationSettings {
    /// Delay between frames of a programmatic rotation at speed factor 1.
    #[serde(with = "humantime_serde")]
    pub frame_delay: Duration,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            frame_delay: DEFAULT_FRAME_DELAY,
        }
    }
}

fn scan_frame_directory(dir: &Path) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect())
}

#[inline]
fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if ["jpg","jpeg","png","webp"].contains(&e.as_str())
    )
}
