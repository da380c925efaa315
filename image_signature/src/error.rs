// THEORY:
// Errors are split by *where* they surface, not by which module raised them.
//
// - `ConfigurationError` is synchronous: it is returned straight to whoever
//   called `initialize`, `submit` or loaded a configuration file. It never
//   touches tasks that are already running.
// - `ExtractionError` is asynchronous and scoped to one image. It travels back
//   through the scheduler inside an `ExtractionRecord`, which is why it is
//   `Clone` and carries owned data only.
// - `SerializationError` covers SVF rendering of a record that has no
//   signature and SVF parse-back.
// - `ImageSourceError` belongs to the external acquisition collaborator.

use thiserror::Error;

/// Invalid setup of the scheduler or of an `ExtractionConfiguration`.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid number of requested workers {0} (must be in range 1-64)")]
    InvalidPoolSize(usize),

    #[error("extraction workers have already been initialized")]
    AlreadyInitialized,

    #[error("extraction workers have not been initialized")]
    NotInitialized,

    #[error("the scheduler has been shut down")]
    ShutDown,

    #[error("the scheduler must be initialized from within a tokio runtime")]
    NoRuntime,

    #[error("invalid configuration parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Failure of a single extraction task.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("pixel buffer length {len} does not match {width}x{height} RGBA")]
    BufferMismatch { len: usize, width: u32, height: u32 },

    #[error("image dimensions cannot be zero")]
    EmptyImage,

    #[error("the configuration has no sample points")]
    NoSamplePoints,

    #[error("invalid extraction configuration: {0}")]
    InvalidConfiguration(String),

    #[error("sample point ({x}, {y}) lies outside the {width}x{height} image")]
    SampleOutOfBounds { x: u32, y: u32, width: u32, height: u32 },

    #[error(
        "texture window at ({x}, {y}) with radius {radius} is {width}x{height} after clipping, at least 2x2 is required"
    )]
    WindowTooSmall {
        x: u32,
        y: u32,
        radius: u32,
        width: u32,
        height: u32,
    },

    #[error("all centroids were pruned in k-means iteration {iteration}")]
    AllCentroidsPruned { iteration: u32 },

    #[error("signature total weight is zero, cannot normalize")]
    ZeroTotalWeight,

    #[error("extraction worker panicked: {0}")]
    WorkerPanicked(String),
}

/// SVF rendering or parsing failure.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("signature is not available, the image has not been extracted: {0}")]
    NotExtracted(String),

    #[error("malformed SVF: {0}")]
    Malformed(String),
}

/// Failure of an `ImageSource` to produce a pixel buffer.
#[derive(Debug, Error)]
pub enum ImageSourceError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("decoded pixel data is inconsistent: {0}")]
    Extraction(#[from] ExtractionError),
}
