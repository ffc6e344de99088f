use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use image::error::{LimitError, LimitErrorKind, ParameterError, ParameterErrorKind};
use image::{imageops::FilterType, DynamicImage, ImageError, ImageFormat};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Public prefix every stored reference starts with.
pub const PUBLIC_PREFIX: &str = "/uploads/";

const TILES_DIR: &str = "tiles";

/// Largest output raster, in pixels, the normalizer will allocate.
pub const DEFAULT_MAX_PIXELS: u64 = 16_000_000;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] ImageError),

    #[error("Failed to write image: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl NormalizeError {
    fn encode(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        NormalizeError::Encode(err.into())
    }
}

/// Canvas uploaded tile images are fitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetBox {
    pub width: u32,
    pub height: u32,
}

impl TargetBox {
    pub const STANDARD: TargetBox = TargetBox {
        width: 800,
        height: 600,
    };

    /// Output dimensions for a `width` x `height` source.
    ///
    /// A source relatively wider than the box is pinned to the box height and
    /// may overflow its width; anything else is pinned to the box width and may
    /// overflow its height. The free dimension is rounded to the nearest pixel.
    pub fn fit(&self, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = (u128::from(width), u128::from(height));
        let (tw, th) = (u128::from(self.width), u128::from(self.height));

        // w/h > tw/th, compared without floating point so an exact box ratio
        // never flips branch.
        if w * th > tw * h {
            (round_div(th * w, h), self.height)
        } else {
            (self.width, round_div(tw * h, w))
        }
    }
}

impl Default for TargetBox {
    fn default() -> Self {
        TargetBox::STANDARD
    }
}

fn round_div(num: u128, den: u128) -> u32 {
    let den = den.max(1);
    let rounded = (num * 2 + den) / (den * 2);
    rounded.clamp(1, u128::from(u32::MAX)) as u32
}

/// Encoding picked from the declared file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl OutputFormat {
    pub fn from_file_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".png") {
            OutputFormat::Png
        } else if name.ends_with(".gif") {
            OutputFormat::Gif
        } else if name.ends_with(".bmp") {
            OutputFormat::Bmp
        } else {
            OutputFormat::Jpeg
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Gif => ImageFormat::Gif,
            OutputFormat::Bmp => ImageFormat::Bmp,
        }
    }
}

/// Result of a successful [`Normalizer::normalize`] call.
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Reference persisted on the tile record, e.g. `/uploads/tiles/1700000000000_oak.jpg`.
    pub path: String,
    /// Location of the written file on disk.
    pub file: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// Rescales uploaded images into a fixed box and writes them under the upload root.
#[derive(Debug, Clone)]
pub struct Normalizer {
    root: PathBuf,
    target: TargetBox,
    max_pixels: u64,
}

impl Normalizer {
    pub fn new(root: impl Into<PathBuf>, target: TargetBox) -> Self {
        Self {
            root: root.into(),
            target,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }

    /// Cap on `width * height` of the fitted output. Sources whose fit
    /// exceeds it are rejected before anything is allocated.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decode, fit, re-encode and place one image. Nothing is left on disk
    /// when this returns an error.
    pub fn normalize(
        &self,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<StoredImage, NormalizeError> {
        let source = image::load_from_memory(bytes).map_err(NormalizeError::Decode)?;
        if source.width() == 0 || source.height() == 0 {
            return Err(NormalizeError::Decode(ImageError::Parameter(
                ParameterError::from_kind(ParameterErrorKind::DimensionMismatch),
            )));
        }

        let (width, height) = self.target.fit(source.width(), source.height());
        debug!(
            "Fitting {}x{} into {}x{}",
            source.width(),
            source.height(),
            width,
            height
        );
        if u64::from(width) * u64::from(height) > self.max_pixels {
            warn!(
                "Rejecting {}x{} source: fitted size {width}x{height} exceeds {} pixels",
                source.width(),
                source.height(),
                self.max_pixels
            );
            return Err(NormalizeError::Decode(ImageError::Limits(
                LimitError::from_kind(LimitErrorKind::DimensionError),
            )));
        }

        // Always an opaque RGB raster, whatever the target format.
        let resized = DynamicImage::ImageRgb8(
            source
                .resize_exact(width, height, FilterType::Lanczos3)
                .to_rgb8(),
        );

        let format = OutputFormat::from_file_name(original_name);
        let mut encoded = Vec::new();
        resized
            .write_to(&mut Cursor::new(&mut encoded), format.image_format())
            .map_err(NormalizeError::encode)?;

        let file_name = stored_file_name(Utc::now().timestamp_millis(), original_name, format);
        let file = self.place(&encoded, &file_name)?;
        info!("Image saved: {} ({width}x{height})", file.display());

        Ok(StoredImage {
            path: format!("{PUBLIC_PREFIX}{TILES_DIR}/{file_name}"),
            file,
            width,
            height,
            format,
        })
    }

    /// Write `encoded` to `tiles/<file_name>`, failing rather than replacing
    /// a file that is already there.
    fn place(&self, encoded: &[u8], file_name: &str) -> Result<PathBuf, NormalizeError> {
        let dir = self.root.join(TILES_DIR);
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(NormalizeError::encode)?;
            info!("Created tiles directory: {}", dir.display());
        }
        let file = dir.join(file_name);

        // Staged next to the destination so the final rename stays on one
        // filesystem. The temp file is removed on drop if anything fails.
        let mut staged = NamedTempFile::new_in(&dir).map_err(NormalizeError::encode)?;
        staged
            .write_all(encoded)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(NormalizeError::encode)?;
        staged
            .persist_noclobber(&file)
            .map_err(|e| NormalizeError::encode(e.error))?;

        Ok(file)
    }

    /// Box-sized solid fill stored under a fixed name, used for demo data.
    /// An existing file of that name is kept as is.
    pub fn placeholder(&self, file_name: &str, rgb: [u8; 3]) -> Result<String, NormalizeError> {
        let path = format!("{PUBLIC_PREFIX}{TILES_DIR}/{file_name}");
        let file = self.resolve(&path).ok_or_else(|| {
            NormalizeError::encode(format!("invalid placeholder name {file_name:?}"))
        })?;
        if file.exists() {
            return Ok(path);
        }

        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir).map_err(NormalizeError::encode)?;
        }
        let fill = image::RgbImage::from_pixel(self.target.width, self.target.height, image::Rgb(rgb));
        DynamicImage::ImageRgb8(fill)
            .save_with_format(&file, OutputFormat::from_file_name(file_name).image_format())
            .map_err(NormalizeError::encode)?;

        debug!("Wrote placeholder {}", file.display());
        Ok(path)
    }

    /// Delete the file behind a stored reference. Returns `false` when the
    /// file was already gone.
    pub fn remove(&self, stored_path: &str) -> io::Result<bool> {
        let file = self.resolve(stored_path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not an upload reference: {stored_path}"),
            )
        })?;

        match fs::remove_file(&file) {
            Ok(()) => {
                info!("Deleted image file: {}", file.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Map a stored reference back onto the upload root.
    pub fn resolve(&self, stored_path: &str) -> Option<PathBuf> {
        let relative = Path::new(stored_path.strip_prefix(PUBLIC_PREFIX)?);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        (plain && !relative.as_os_str().is_empty()).then(|| self.root.join(relative))
    }
}

fn stored_file_name(millis: i64, original_name: &str, format: OutputFormat) -> String {
    // Only the last path segment of whatever the client declared.
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("image");

    format!("{millis}_{stem}.{}", format.extension())
}
