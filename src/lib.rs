//! Detection dataset preparation
//!
//! This library turns folders of labeled images into TFRecord files for
//! object detection training: near-duplicates are dropped with a difference
//! hash, images are normalized to JPEG, and a pretrained detector supplies the
//! bounding box of the target class.

pub mod config;
pub mod dataset;
pub mod dedupe;
pub mod detector;
pub mod error;
pub mod example;
pub mod hash;
pub mod jpg_cache;
pub mod label_gen;
pub mod label_map;
pub mod record;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use config::Args;
pub use dataset::{process_dataset, TEST_RECORD_FILE, TRAIN_RECORD_FILE};
pub use detector::{DetectionModel, LazyModel, OnnxDetectionModel, TargetDetector};
pub use error::{Error, Result};
pub use example::{Example, ExampleBuilder};
pub use jpg_cache::JpgCache;
pub use label_gen::LabelGen;
pub use label_map::{write_label_map, LabelMap, LABEL_MAP_FILE};
pub use types::{BoundingBox, ClassMismatch, Detected, LabelStats, RawDetection, RunStats};
