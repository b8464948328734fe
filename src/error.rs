use std::io;
use std::path::PathBuf;

/// Errors raised while preparing the dataset.
///
/// Class mismatches are not represented here: a detection that lands on the
/// wrong class is an ordinary outcome, see [`crate::types::Detected`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot decode image {}: {source}", .path.display())]
    UndecodableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot write image {}: {source}", .path.display())]
    UnwritableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("inference with {} failed: {source}", .path.display())]
    Inference {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to load detection model from {}: {source}", .path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to access record file {}: {source}", .path.display())]
    Record {
        path: PathBuf,
        #[source]
        source: tfrecord::Error,
    },

    #[error("label {0:?} is missing from the label map")]
    UnknownLabel(String),

    #[error("no files left to visit for label {label:?}")]
    Exhausted { label: String },

    #[error("{0}")]
    Setup(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error only concerns the image being processed, so the run
    /// can count it and move on to the next file.
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            Error::UndecodableImage { .. }
                | Error::UnwritableImage { .. }
                | Error::Io { .. }
                | Error::Inference { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
