use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

use crate::detector::{DEFAULT_INPUT_SIZE, DEFAULT_TARGET_CLASS};
use crate::hash::{is_valid_hash_size, DEFAULT_HASH_SIZE, MAX_HASH_SIZE, MIN_HASH_SIZE};

/// Build TFRecord object-detection datasets from folders of labeled images.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// Directory that contains the dataset, one subdirectory per label
    #[arg(long = "dataset")]
    pub dataset: PathBuf,

    /// Directory where the generated files will go
    #[arg(long = "output")]
    pub output: PathBuf,

    /// Pretrained COCO detection model (ONNX file or a directory holding model.onnx)
    #[arg(long = "coco")]
    pub coco: PathBuf,

    /// Fraction of every label's detected examples used for training
    #[arg(long = "split", default_value_t = 0.8, value_parser = validate_split)]
    pub split: f64,

    /// Limit the number of detected examples per label
    #[arg(long = "maxperlabel")]
    pub max_per_label: Option<usize>,

    /// Resize images so their smaller side equals this many pixels
    #[arg(long = "mindim", value_parser = clap::value_parser!(u32).range(1..))]
    pub min_dim: Option<u32>,

    /// COCO class id the model must report as its top detection
    #[arg(long = "target_class", default_value_t = DEFAULT_TARGET_CLASS)]
    pub target_class: i64,

    /// Seed for shuffling every label's files
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    /// Grid size of the difference hash used for deduplication
    #[arg(long = "hash_size", default_value_t = DEFAULT_HASH_SIZE, value_parser = validate_hash_size)]
    pub hash_size: u32,

    /// Side length of the square image fed to the model
    #[arg(long = "input_size", default_value_t = DEFAULT_INPUT_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    pub input_size: u32,
}

// Validate that the split is between 0.0 and 1.0
fn validate_split(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("SPLIT must be between 0.0 and 1.0".to_string()),
    }
}

// Validate that the hash grid fits in the hash width
fn validate_hash_size(s: &str) -> Result<u32, String> {
    match u32::from_str(s) {
        Ok(val) if is_valid_hash_size(val) => Ok(val),
        _ => Err(format!(
            "HASH_SIZE must be between {} and {}",
            MIN_HASH_SIZE, MAX_HASH_SIZE
        )),
    }
}
