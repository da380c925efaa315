// THEORY:
// A feature point places one image sample in a joint 7-dimensional space:
// position (x, y), Lab color (l, a, b) and local texture (c, e). Every axis is
// rescaled to a canonical range and multiplied by a configurable weight before
// it lands here, so plain Euclidean distance is the similarity measure for
// k-means and for anyone comparing signatures downstream.
//
// A centroid is a feature point with a mass. During clustering the mass is the
// number of assigned samples; in a finished `Signature` masses are normalized to
// sum to one and the centroids are sorted heaviest first.

use std::ops::{AddAssign, Index};

/// Number of coordinates per feature point.
pub const DIMENSIONS: usize = 7;

/// A weighted sample in (x, y, L, a, b, contrast, entropy) space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeaturePoint {
    pub x: f64,
    pub y: f64,
    pub l: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub e: f64,
}

impl FeaturePoint {
    pub const fn new(x: f64, y: f64, l: f64, a: f64, b: f64, c: f64, e: f64) -> Self {
        Self { x, y, l, a, b, c, e }
    }

    pub fn coordinates(&self) -> [f64; DIMENSIONS] {
        [self.x, self.y, self.l, self.a, self.b, self.c, self.e]
    }

    pub fn from_coordinates(coordinates: [f64; DIMENSIONS]) -> Self {
        let [x, y, l, a, b, c, e] = coordinates;
        Self { x, y, l, a, b, c, e }
    }

    pub fn distance_sq(&self, other: &FeaturePoint) -> f64 {
        self.coordinates()
            .iter()
            .zip(other.coordinates())
            .map(|(left, right)| (left - right) * (left - right))
            .sum()
    }

    pub fn distance(&self, other: &FeaturePoint) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Divides every coordinate by `divisor`.
    pub fn scaled_down(&self, divisor: f64) -> FeaturePoint {
        Self::from_coordinates(self.coordinates().map(|value| value / divisor))
    }
}

impl AddAssign<&FeaturePoint> for FeaturePoint {
    fn add_assign(&mut self, other: &FeaturePoint) {
        self.x += other.x;
        self.y += other.y;
        self.l += other.l;
        self.a += other.a;
        self.b += other.b;
        self.c += other.c;
        self.e += other.e;
    }
}

/// A cluster center and its mass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Centroid {
    pub point: FeaturePoint,
    pub weight: f64,
}

impl Centroid {
    pub const fn new(point: FeaturePoint, weight: f64) -> Self {
        Self { point, weight }
    }
}

/// The output of an extraction: centroids sorted by descending weight whose
/// weights sum to one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    centroids: Vec<Centroid>,
}

impl Signature {
    /// Wraps centroids as they are, without sorting or normalizing.
    pub fn from_centroids(centroids: Vec<Centroid>) -> Self {
        Self { centroids }
    }

    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    pub fn into_centroids(self) -> Vec<Centroid> {
        self.centroids
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Centroid> {
        self.centroids.iter()
    }

    pub fn total_weight(&self) -> f64 {
        self.centroids.iter().map(|centroid| centroid.weight).sum()
    }

    /// True when weights sum to one within `tolerance` and never increase.
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        let sorted = self
            .centroids
            .windows(2)
            .all(|pair| pair[0].weight >= pair[1].weight);
        sorted && (self.total_weight() - 1.0).abs() <= tolerance
    }
}

impl Index<usize> for Signature {
    type Output = Centroid;

    fn index(&self, index: usize) -> &Self::Output {
        &self.centroids[index]
    }
}

impl<'a> IntoIterator for &'a Signature {
    type Item = &'a Centroid;
    type IntoIter = std::slice::Iter<'a, Centroid>;

    fn into_iter(self) -> Self::IntoIter {
        self.centroids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_spans_all_seven_axes() {
        let origin = FeaturePoint::default();
        let unit = FeaturePoint::new(1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0);
        assert_eq!(origin.distance_sq(&unit), 7.0);
        assert!((origin.distance(&unit) - 7f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn accumulate_then_scale_gives_mean() {
        let mut sum = FeaturePoint::default();
        sum += &FeaturePoint::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0);
        sum += &FeaturePoint::new(3.0, 2.0, 1.0, 0.0, -1.0, -2.0, -3.0);
        assert_eq!(
            sum.scaled_down(2.0),
            FeaturePoint::new(2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0)
        );
    }

    #[test]
    fn normalization_check_requires_order_and_unit_mass() {
        let point = FeaturePoint::default();
        let good = Signature::from_centroids(vec![Centroid::new(point, 0.7), Centroid::new(point, 0.3)]);
        let unsorted = Signature::from_centroids(vec![Centroid::new(point, 0.3), Centroid::new(point, 0.7)]);
        let light = Signature::from_centroids(vec![Centroid::new(point, 0.5)]);
        assert!(good.is_normalized(1e-9));
        assert!(!unsorted.is_normalized(1e-9));
        assert!(!light.is_normalized(1e-9));
    }
}
