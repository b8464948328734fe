use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat};
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::open_image;

/// Converts source images into canonical JPEGs under `{output}/{label}/`.
///
/// The cache is the file system itself: a destination that already exists is
/// handed back without touching the source again.
#[derive(Debug, Clone)]
pub struct JpgCache {
    output_dir: PathBuf,
    mindim: Option<u32>,
    // destination -> source that produced it in this run
    sources: RefCell<HashMap<PathBuf, PathBuf>>,
}

impl JpgCache {
    pub fn new(output_dir: impl Into<PathBuf>, mindim: Option<u32>) -> Self {
        Self {
            output_dir: output_dir.into(),
            mindim,
            sources: RefCell::new(HashMap::new()),
        }
    }

    /// Where the JPEG for `source` under `label` lives.
    pub fn destination(&self, source: &Path, label: &str) -> PathBuf {
        let file_name = source.file_name().unwrap_or(source.as_os_str());
        self.output_dir
            .join(label)
            .join(file_name)
            .with_extension("jpg")
    }

    /// Remember `source` as the origin of `jpg_path`. Returns the other
    /// source if a different file already claimed the same destination.
    fn claim(&self, jpg_path: &Path, source: &Path) -> Option<PathBuf> {
        let mut sources = self.sources.borrow_mut();
        match sources.get(jpg_path) {
            Some(previous) if previous != source => Some(previous.clone()),
            Some(_) => None,
            None => {
                sources.insert(jpg_path.to_path_buf(), source.to_path_buf());
                None
            }
        }
    }

    /// Return the normalized JPEG for `source`, creating it on first use.
    pub fn to_jpg(&self, source: &Path, label: &str) -> Result<PathBuf> {
        let jpg_path = self.destination(source, label);
        if let Some(previous) = self.claim(&jpg_path, source) {
            warn!(
                "{} and {} both map to {}, reusing the image of the first",
                previous.display(),
                source.display(),
                jpg_path.display()
            );
        }
        if jpg_path.exists() {
            debug!("reusing {}", jpg_path.display());
            return Ok(jpg_path);
        }

        if let Some(parent) = jpg_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let image = open_image(source)?;
        let image = match self.mindim {
            Some(mindim) => resize_to_min_dim(&image, mindim),
            None => image,
        };

        let rgb = image.to_rgb8();
        rgb.save_with_format(&jpg_path, ImageFormat::Jpeg)
            .map_err(|e| write_error(&jpg_path, e))?;
        debug!("wrote {}", jpg_path.display());
        Ok(jpg_path)
    }
}

fn write_error(jpg_path: &Path, e: ImageError) -> Error {
    match e {
        ImageError::IoError(io_err) => Error::io(jpg_path, io_err),
        other => Error::UnwritableImage {
            path: jpg_path.to_path_buf(),
            source: other,
        },
    }
}

/// Target size so that the smaller side becomes `mindim`, keeping the aspect
/// ratio. The other side is truncated.
pub fn min_dim_size(width: u32, height: u32, mindim: u32) -> (u32, u32) {
    if width < height {
        let scale = mindim as f64 / width as f64;
        (mindim, ((height as f64 * scale) as u32).max(1))
    } else {
        let scale = mindim as f64 / height as f64;
        (((width as f64 * scale) as u32).max(1), mindim)
    }
}

/// Resize with Lanczos3 so the smaller side equals `mindim`.
pub fn resize_to_min_dim(image: &DynamicImage, mindim: u32) -> DynamicImage {
    let (width, height) = min_dim_size(image.width(), image.height(), mindim);
    image.resize_exact(width, height, FilterType::Lanczos3)
}
