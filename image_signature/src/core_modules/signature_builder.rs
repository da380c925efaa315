// THEORY:
// `SignatureBuilder` is the unit of work a scheduler worker executes. It is
// stateless: everything it needs arrives as a read-only image and configuration.
//
// Stages:
// 1.  **Sampling**: every configured normalized coordinate is mapped to a pixel.
//     Lab color comes from the color module, contrast and entropy from the
//     texture module.
// 2.  **Feature assembly**: each raw quantity is rescaled to a canonical range
//     (L/100, a/50, b/50, contrast/25, entropy/4, positions already in [0, 1])
//     and multiplied by its configured weight. The weights are what let space,
//     color and texture share a single Euclidean metric.
// 3.  **Clustering**: the constrained k-means in `kmeans`.
// 4.  **Normalization**: centroids are sorted heaviest first and their weights
//     divided by the total, so a signature is a probability mass.
//
// Any failure aborts this image only; the scheduler reports it and moves on.

use crate::config::{ExtractionConfiguration, SamplePoint};
use crate::core_modules::color::{rgb_to_lab, round_half_up};
use crate::core_modules::feature_point::{FeaturePoint, Signature};
use crate::core_modules::kmeans;
use crate::core_modules::pixel::PixelBuffer;
use crate::core_modules::texture::contrast_entropy;
use crate::error::ExtractionError;

const L_RANGE: f64 = 100.0;
const AB_RANGE: f64 = 50.0;
const CONTRAST_RANGE: f64 = 25.0;
const ENTROPY_RANGE: f64 = 4.0;

/// Something a scheduler worker can run to turn an image into a signature.
pub trait SignatureExtractor: Send + Sync + 'static {
    fn extract(&self, image: &PixelBuffer, config: &ExtractionConfiguration) -> Result<Signature, ExtractionError>;
}

/// The production extractor: Lab + co-occurrence texture + constrained k-means.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureBuilder;

impl SignatureBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Maps a normalized coordinate to a pixel inside the image.
    fn pixel_position(sample: &SamplePoint, width: u32, height: u32) -> (u32, u32) {
        let x = round_half_up(sample.x * width as f64).clamp(0.0, (width - 1) as f64);
        let y = round_half_up(sample.y * height as f64).clamp(0.0, (height - 1) as f64);
        (x as u32, y as u32)
    }

    /// Measures every configured sample and returns the weighted feature points.
    pub fn sample(
        &self,
        image: &PixelBuffer,
        config: &ExtractionConfiguration,
    ) -> Result<Vec<FeaturePoint>, ExtractionError> {
        if config.points.is_empty() {
            return Err(ExtractionError::NoSamplePoints);
        }
        config
            .validate()
            .map_err(|error| ExtractionError::InvalidConfiguration(error.to_string()))?;

        let width = image.width();
        let height = image.height();
        let weights = &config.weights;

        config
            .points
            .iter()
            .map(|sample| {
                let (x, y) = Self::pixel_position(sample, width, height);
                let lab = rgb_to_lab(image.pixel(x, y));
                let texture = contrast_entropy(image, x, y, config.radius, config.grey_levels)?;

                Ok(FeaturePoint {
                    x: x as f64 / width as f64 * weights.x,
                    y: y as f64 / height as f64 * weights.y,
                    l: round_half_up(lab.l) / L_RANGE * weights.l,
                    a: round_half_up(lab.a) / AB_RANGE * weights.a,
                    b: round_half_up(lab.b) / AB_RANGE * weights.b,
                    c: texture.contrast / CONTRAST_RANGE * weights.c,
                    e: texture.entropy / ENTROPY_RANGE * weights.e,
                })
            })
            .collect()
    }

    /// Extracts the signature of `image`.
    pub fn extract(
        &self,
        image: &PixelBuffer,
        config: &ExtractionConfiguration,
    ) -> Result<Signature, ExtractionError> {
        let samples = self.sample(image, config)?;
        let mut centroids = kmeans::cluster(&samples, &config.kmeans)?;

        centroids.sort_by(|left, right| right.weight.total_cmp(&left.weight));

        let total: f64 = centroids.iter().map(|centroid| centroid.weight).sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(ExtractionError::ZeroTotalWeight);
        }
        for centroid in centroids.iter_mut() {
            centroid.weight /= total;
        }

        Ok(Signature::from_centroids(centroids))
    }
}

impl SignatureExtractor for SignatureBuilder {
    fn extract(&self, image: &PixelBuffer, config: &ExtractionConfiguration) -> Result<Signature, ExtractionError> {
        SignatureBuilder::extract(self, image, config)
    }
}

/// Convenience wrapper around `SignatureBuilder::extract`.
pub fn extract(image: &PixelBuffer, config: &ExtractionConfiguration) -> Result<Signature, ExtractionError> {
    SignatureBuilder.extract(image, config)
}
