use log::info;
use std::fs;
use std::path::Path;

use crate::detector::{DetectionModel, TargetDetector};
use crate::error::{Error, Result};
use crate::label_map::LabelMap;
use crate::record::{bytes_feature, float_feature, int64_feature};
use crate::types::{BoundingBox, Detected};

pub const IMAGE_FORMAT: &str = "jpg";

/// One labeled training record.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub encoded: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub filename: String,
    pub label: String,
    pub label_id: i64,
    pub bbox: BoundingBox,
}

impl Example {
    /// Features in the layout expected by the Object Detection API input
    /// readers.
    pub fn to_tf_example(&self) -> tfrecord::Example {
        vec![
            ("image/height", int64_feature(self.height as i64)),
            ("image/width", int64_feature(self.width as i64)),
            ("image/filename", bytes_feature(self.filename.as_str())),
            ("image/source_id", bytes_feature(self.filename.as_str())),
            ("image/encoded", bytes_feature(self.encoded.clone())),
            ("image/format", bytes_feature(IMAGE_FORMAT)),
            ("image/object/bbox/xmin", float_feature(self.bbox.xmin)),
            ("image/object/bbox/xmax", float_feature(self.bbox.xmax)),
            ("image/object/bbox/ymin", float_feature(self.bbox.ymin)),
            ("image/object/bbox/ymax", float_feature(self.bbox.ymax)),
            ("image/object/class/text", bytes_feature(self.label.as_str())),
            ("image/object/class/label", int64_feature(self.label_id)),
        ]
        .into_iter()
        .map(|(key, feature)| (key.to_string(), feature))
        .collect()
    }
}

/// Turns normalized JPEGs into [`Example`]s.
#[derive(Debug)]
pub struct ExampleBuilder<'a, M> {
    label_map: &'a LabelMap,
    detector: &'a TargetDetector<M>,
}

impl<'a, M: DetectionModel> ExampleBuilder<'a, M> {
    pub fn new(label_map: &'a LabelMap, detector: &'a TargetDetector<M>) -> Self {
        Self {
            label_map,
            detector,
        }
    }

    /// Build the record for `jpg_path`, running the detector exactly once.
    pub fn build(&self, jpg_path: &Path, label: &str) -> Result<Detected<Example>> {
        info!("label {} example {}", label, jpg_path.display());

        let label_id = self.label_map.id(label)?;
        let encoded = fs::read(jpg_path).map_err(|e| Error::io(jpg_path, e))?;
        let image =
            image::load_from_memory(&encoded).map_err(|source| Error::UndecodableImage {
                path: jpg_path.to_path_buf(),
                source,
            })?;

        let (width, height) = (image.width(), image.height());
        let filename = jpg_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(self.detector.find(&image)?.map(|bbox| Example {
            encoded,
            width,
            height,
            filename,
            label: label.to_string(),
            label_id,
            bbox,
        }))
    }
}
