// THEORY:
// This is the entry point of the `image_signature` library crate.
//
// An image signature is a small, weighted set of centroids in a 7-dimensional
// feature space (position, Lab color, co-occurrence contrast and entropy) that
// summarizes what an image looks like. Two images can then be compared by
// comparing their signatures instead of their pixels.
//
// The crate has two layers:
//
// - `core_modules`: the pure, synchronous extraction pipeline. Sampling, color
//   conversion, texture statistics, k-means clustering, SVF text encoding and
//   the image acquisition and rendering seams all live here.
// - `scheduler`: the `ExtractionScheduler`, which runs extractions on a fixed
//   pool of workers and reports each result as an `ExtractionRecord`.
//
// `config` holds the tunable `ExtractionConfiguration` and `error` the error
// taxonomy shared by both layers.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod record;
pub mod scheduler;

pub use config::ExtractionConfiguration;
pub use core_modules::feature_point::{Centroid, FeaturePoint, Signature};
pub use core_modules::pixel::{Pixel, PixelBuffer};
pub use core_modules::signature_builder::{SignatureBuilder, SignatureExtractor, extract};
pub use error::{ConfigurationError, ExtractionError, ImageSourceError, SerializationError};
pub use record::{ExtractionOutcome, ExtractionRecord, TaskId, WorkerId};
pub use scheduler::{ExtractionScheduler, ExtractionTicket, PoolStatus};
