use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The file does not carry the extension the requested parser expects
    #[error("Annotation must be a {expected} file: {}", path.display())]
    InvalidFormat { path: PathBuf, expected: &'static str },

    #[error("Unsupported format for {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// The file has the right extension but its contents could not be decoded
    #[error("Malformed {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("{count} candidates matched in {}", dir.display())]
    AmbiguousMatch { dir: PathBuf, count: usize },

    #[error("No match found in {}", dir.display())]
    NoMatch { dir: PathBuf },

    #[error("No annotation can infer the tomogram shape")]
    NoShapeSource,

    #[error("Inconsistent tomogram shapes {first:?} and {second:?} implied by annotations")]
    InconsistentShape { first: [usize; 3], second: [usize; 3] },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Annotation index {index} out of range ({len} annotations)")]
    AnnotationIndex { index: usize, len: usize },

    #[error("No sample without annotation points found after {attempts} attempts")]
    NoNegativeSample { attempts: usize },

    #[error("Sample shape {sample:?} does not fit in volume {volume:?}")]
    InvalidSampleShape { sample: [usize; 3], volume: [usize; 3] },
}

impl DatasetError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DatasetError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DatasetError::UnsupportedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
