use crate::exif::MetadataError;
use crate::planes::PlaneError;

/// Failure of a single encode or decode call. No partial output is ever
/// returned alongside one of these.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("quality {0} is outside 1-100")]
    InvalidQuality(u8),

    #[error(transparent)]
    Plane(#[from] PlaneError),

    #[error("compressed image needs {needed} bytes, destination holds {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error(
        "JPEG image size {actual_width}x{actual_height}, expected {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("{count} corrupt-data warnings during decode")]
    TooManyWarnings { count: usize },

    #[error("codec error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl CodecError {
    pub(crate) fn fatal(e: impl std::fmt::Debug) -> Self {
        CodecError::Fatal(format!("{e:?}"))
    }
}
