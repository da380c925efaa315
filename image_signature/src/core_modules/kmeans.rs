// THEORY:
// The clustering step collapses hundreds of feature points into a handful of
// weighted centroids. It is a fixed-iteration k-means with two extra rules that
// let the number of clusters adapt to the image:
//
// 1.  **Deterministic seeding**: the first `seeds` feature points, in sample
//     order, are the initial centroids. The same image and configuration always
//     give the same signature.
// 2.  **Joining**: after each update, for every pair i < j closer than
//     `join_threshold`, centroid j gets zero weight. Its points are not merged
//     into i; their mass is simply discarded. Downstream weight distributions
//     depend on this, so it is kept as is.
// 3.  **Iteration-scaled pruning**: centroids whose weight does not exceed
//     `cluster_min_size · iteration` (zero-based) are dropped. Round 0 only
//     removes empty and joined clusters; later rounds get progressively
//     stricter, so a small cluster may survive early and still be eliminated
//     if it stays small.
//
// Assignment uses Euclidean distance over all seven weighted axes, ties going to
// the lowest centroid index.

use crate::config::KMeansParameters;
use crate::core_modules::feature_point::{Centroid, FeaturePoint};
use crate::error::ExtractionError;
use log::debug;

/// Index of the centroid nearest to `point`. `centroids` must not be empty.
fn nearest(point: &FeaturePoint, centroids: &[Centroid]) -> usize {
    let mut nearest = 0;
    let mut min_distance = point.distance_sq(&centroids[0].point);
    for (index, centroid) in centroids.iter().enumerate().skip(1) {
        let distance = point.distance_sq(&centroid.point);
        if distance < min_distance {
            min_distance = distance;
            nearest = index;
        }
    }
    nearest
}

/// One assignment + update round. Empty clusters come back at the origin with
/// zero weight.
fn reassign(points: &[FeaturePoint], centroids: &[Centroid]) -> Vec<Centroid> {
    let mut sums = vec![Centroid::default(); centroids.len()];
    for point in points {
        let target = &mut sums[nearest(point, centroids)];
        target.point += point;
        target.weight += 1.0;
    }
    for centroid in sums.iter_mut().filter(|c| c.weight > 0.0) {
        centroid.point = centroid.point.scaled_down(centroid.weight);
    }
    sums
}

/// Zeroes the weight of the later centroid of every pair closer than `threshold`.
fn join_close(centroids: &mut [Centroid], threshold: f64) {
    for i in 0..centroids.len().saturating_sub(1) {
        for j in i + 1..centroids.len() {
            if centroids[i].point.distance(&centroids[j].point) < threshold {
                centroids[j].weight = 0.0;
            }
        }
    }
}

/// Clusters `points` into at most `params.seeds` weighted centroids.
///
/// Weights in the result are raw member counts; sorting and normalization are
/// left to the caller.
pub fn cluster(points: &[FeaturePoint], params: &KMeansParameters) -> Result<Vec<Centroid>, ExtractionError> {
    if points.is_empty() {
        return Err(ExtractionError::NoSamplePoints);
    }

    if params.seeds == 0 {
        return Err(ExtractionError::InvalidConfiguration(
            "k-means needs at least one seed".to_string(),
        ));
    }

    let seeds = params.seeds.min(points.len());
    let mut centroids: Vec<Centroid> = points[..seeds]
        .iter()
        .map(|point| Centroid::new(*point, 0.0))
        .collect();

    for iteration in 0..params.iterations {
        centroids = reassign(points, &centroids);
        join_close(&mut centroids, params.join_threshold);

        let min_weight = params.cluster_min_size * iteration as f64;
        centroids.retain(|centroid| centroid.weight > min_weight);
        debug!(
            "k-means iteration {iteration}: {} centroids above weight {min_weight}",
            centroids.len()
        );

        if centroids.is_empty() {
            return Err(ExtractionError::AllCentroidsPruned { iteration });
        }
    }

    Ok(centroids)
}
