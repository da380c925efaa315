// THEORY:
// `ExtractionConfiguration` is the single, immutable bundle of knobs that fully
// determines a signature: where to sample, how to measure texture, how to weight
// each feature axis and how hard k-means may merge and prune. Two signatures are
// only comparable if they were extracted with the same configuration, so it is
// shared read-only with every task and never mutated by a worker.
//
// Configurations load from TOML. Every field is optional and falls back to the
// defaults below; `validate` is the single gate that rejects nonsense before a
// task is ever queued.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_POINT_COUNT: usize = 600;
pub const DEFAULT_RADIUS: u32 = 3;
pub const DEFAULT_GREY_LEVELS: u32 = 16;
pub const DEFAULT_SEEDS: usize = 40;
pub const DEFAULT_ITERATIONS: u32 = 5;
pub const DEFAULT_JOIN_THRESHOLD: f64 = 0.1;
pub const DEFAULT_CLUSTER_MIN_SIZE: f64 = 2.0;
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 200;
pub const MAX_GREY_LEVELS: u32 = 256;

/// A sample coordinate in normalized image space, `[0, 1]²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
}

impl SamplePoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Per-axis multipliers applied after each feature is rescaled to its canonical range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    pub x: f64,
    pub y: f64,
    pub l: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub e: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            l: 1.0,
            a: 1.0,
            b: 1.0,
            c: 1.0,
            e: 1.0,
        }
    }
}

impl FeatureWeights {
    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("weights.x", self.x),
            ("weights.y", self.y),
            ("weights.l", self.l),
            ("weights.a", self.a),
            ("weights.b", self.b),
            ("weights.c", self.c),
            ("weights.e", self.e),
        ]
    }
}

/// Parameters of the constrained k-means step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansParameters {
    /// Number of initial centroids, taken from the first samples in order.
    pub seeds: usize,
    /// Fixed number of assignment/update rounds.
    pub iterations: u32,
    /// Centroids closer than this are joined (the later one is dropped).
    pub join_threshold: f64,
    /// Multiplied by the zero-based iteration index to get the pruning threshold.
    pub cluster_min_size: f64,
}

impl Default for KMeansParameters {
    fn default() -> Self {
        Self {
            seeds: DEFAULT_SEEDS,
            iterations: DEFAULT_ITERATIONS,
            join_threshold: DEFAULT_JOIN_THRESHOLD,
            cluster_min_size: DEFAULT_CLUSTER_MIN_SIZE,
        }
    }
}

/// Target size of the thumbnail the extractor samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub keep_aspect_ratio: bool,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_THUMBNAIL_SIZE,
            height: DEFAULT_THUMBNAIL_SIZE,
            keep_aspect_ratio: true,
        }
    }
}

/// Everything that determines how a signature is extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfiguration {
    /// Ordered sample coordinates. Order matters: k-means seeds from the first ones.
    pub points: Vec<SamplePoint>,
    /// Texture window radius; the window is `(2·radius + 1)²` before clipping.
    pub radius: u32,
    /// Number of grey levels the texture window is quantized to.
    pub grey_levels: u32,
    pub weights: FeatureWeights,
    pub kmeans: KMeansParameters,
    pub thumbnail: ThumbnailConfig,
}

impl Default for ExtractionConfiguration {
    fn default() -> Self {
        Self {
            points: halton_points(DEFAULT_POINT_COUNT),
            radius: DEFAULT_RADIUS,
            grey_levels: DEFAULT_GREY_LEVELS,
            weights: FeatureWeights::default(),
            kmeans: KMeansParameters::default(),
            thumbnail: ThumbnailConfig::default(),
        }
    }
}

impl ExtractionConfiguration {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigurationError> {
        Ok(toml::to_string(self)?)
    }

    /// Rejects parameter values the extractor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.points.is_empty() {
            return Err(invalid("points", "at least one sample point is required"));
        }
        if let Some((index, point)) = self
            .points
            .iter()
            .enumerate()
            .find(|(_, p)| !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y))
        {
            return Err(invalid(
                "points",
                format!("point {index} ({}, {}) lies outside [0, 1]²", point.x, point.y),
            ));
        }
        if self.radius == 0 {
            return Err(invalid("radius", "must be at least 1"));
        }
        if !(2..=MAX_GREY_LEVELS).contains(&self.grey_levels) {
            return Err(invalid(
                "grey_levels",
                format!("must be in range 2-{MAX_GREY_LEVELS}, got {}", self.grey_levels),
            ));
        }
        for (name, weight) in self.weights.named() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(name, format!("must be finite and non-negative, got {weight}")));
            }
        }
        if self.kmeans.seeds == 0 {
            return Err(invalid("kmeans.seeds", "must be at least 1"));
        }
        if self.kmeans.iterations == 0 {
            return Err(invalid("kmeans.iterations", "must be at least 1"));
        }
        if !self.kmeans.join_threshold.is_finite() || self.kmeans.join_threshold < 0.0 {
            return Err(invalid("kmeans.join_threshold", "must be finite and non-negative"));
        }
        if !self.kmeans.cluster_min_size.is_finite() || self.kmeans.cluster_min_size < 0.0 {
            return Err(invalid("kmeans.cluster_min_size", "must be finite and non-negative"));
        }
        if self.thumbnail.width == 0 || self.thumbnail.height == 0 {
            return Err(invalid("thumbnail", "width and height must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

fn radical_inverse(mut index: usize, base: usize) -> f64 {
    let mut result = 0.0;
    let mut fraction = 1.0 / base as f64;
    while index > 0 {
        result += (index % base) as f64 * fraction;
        index /= base;
        fraction /= base as f64;
    }
    result
}

/// Deterministic, evenly spread sample points from the 2-D Halton sequence
/// (bases 2 and 3), skipping the degenerate origin.
pub fn halton_points(count: usize) -> Vec<SamplePoint> {
    (1..=count)
        .map(|index| SamplePoint::new(radical_inverse(index, 2), radical_inverse(index, 3)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExtractionConfiguration::default();
        config.validate().unwrap();
        assert_eq!(config.points.len(), DEFAULT_POINT_COUNT);
    }

    #[test]
    fn halton_sequence_starts_where_expected() {
        let points = halton_points(3);
        assert_eq!(points[0], SamplePoint::new(0.5, 1.0 / 3.0));
        assert_eq!(points[1], SamplePoint::new(0.25, 2.0 / 3.0));
        assert_eq!(points[2], SamplePoint::new(0.75, 1.0 / 9.0));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = ExtractionConfiguration::from_toml_str(
            r#"
            radius = 2

            [kmeans]
            seeds = 12

            [weights]
            x = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.radius, 2);
        assert_eq!(config.kmeans.seeds, 12);
        assert_eq!(config.kmeans.iterations, DEFAULT_ITERATIONS);
        assert_eq!(config.weights.x, 0.5);
        assert_eq!(config.weights.y, 1.0);
        assert_eq!(config.points.len(), DEFAULT_POINT_COUNT);
    }

    #[test]
    fn explicit_points_replace_the_default_grid() {
        let config = ExtractionConfiguration::from_toml_str(
            r#"
            points = [{ x = 0.1, y = 0.2 }, { x = 0.9, y = 0.8 }]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.points,
            vec![SamplePoint::new(0.1, 0.2), SamplePoint::new(0.9, 0.8)]
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = ExtractionConfiguration::default();
        config.grey_levels = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidParameter { name: "grey_levels", .. })
        ));

        let mut config = ExtractionConfiguration::default();
        config.points.push(SamplePoint::new(1.5, 0.0));
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidParameter { name: "points", .. })
        ));

        let mut config = ExtractionConfiguration::default();
        config.weights.c = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidParameter { name: "weights.c", .. })
        ));
    }

    #[test]
    fn toml_round_trips() {
        let mut config = ExtractionConfiguration::default();
        config.points = halton_points(4);
        config.kmeans.join_threshold = 0.25;
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(ExtractionConfiguration::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn parse_errors_surface_as_configuration_errors() {
        let err = ExtractionConfiguration::from_toml_str("radius = \"wide\"").unwrap_err();
        assert!(matches!(err, ConfigurationError::Parse(_)));
    }
}
