// THEORY:
// Drawing is an external concern; this module only decides *what* to draw.
// A `Renderer` is any canvas that can stroke and fill circles in pixel
// coordinates. Two visualizations are defined on top of it:
//
// - sample points: a small outlined dot per configured sample coordinate;
// - signatures: one disc per centroid, placed at its de-weighted (x, y),
//   sized by its weight and filled with its de-weighted Lab color converted
//   back to sRGB.
//
// De-weighting divides by the configured feature weights. An axis with zero
// weight carries no information, so it maps to 0.

use crate::config::{FeatureWeights, SamplePoint};
use crate::core_modules::color::{Lab, lab_to_rgb, round_half_up};
use crate::core_modules::feature_point::{Centroid, Signature};

pub const SAMPLE_POINT_STROKE: [u8; 3] = [0x55, 0x55, 0x99];
pub const SIGNATURE_STROKE: [u8; 3] = [0x55, 0x55, 0x55];
pub const SAMPLE_POINT_RADIUS: f64 = 0.5;
/// Recommended multiplier for centroid radii.
pub const DEFAULT_MAGNIFY: f64 = 5.0;

/// A circle in canvas pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
    pub stroke: [u8; 3],
    pub fill: Option<[u8; 3]>,
}

/// A canvas the visualizations can draw on.
pub trait Renderer {
    /// Canvas width and height in pixels.
    fn size(&self) -> (u32, u32);
    fn clear(&mut self);
    fn draw_circle(&mut self, circle: &Circle);
}

fn unweight(value: f64, weight: f64) -> f64 {
    if weight > 0.0 { value / weight } else { 0.0 }
}

pub fn sample_point_circles(points: &[SamplePoint], width: u32, height: u32) -> Vec<Circle> {
    points
        .iter()
        .map(|point| Circle {
            cx: point.x * width as f64,
            cy: point.y * height as f64,
            radius: SAMPLE_POINT_RADIUS,
            stroke: SAMPLE_POINT_STROKE,
            fill: None,
        })
        .collect()
}

/// The sRGB color of a centroid, with its Lab axes de-weighted.
pub fn centroid_color(centroid: &Centroid, weights: &FeatureWeights) -> [u8; 3] {
    let point = &centroid.point;
    lab_to_rgb(Lab::new(
        unweight(point.l * 100.0, weights.l),
        unweight(point.a * 50.0, weights.a),
        unweight(point.b * 50.0, weights.b),
    ))
}

pub fn signature_circles(
    signature: &Signature,
    weights: &FeatureWeights,
    width: u32,
    height: u32,
    magnify: f64,
) -> Vec<Circle> {
    let radius_factor = width.min(height) as f64 * magnify;
    signature
        .iter()
        .map(|centroid| {
            let point = &centroid.point;
            Circle {
                cx: round_half_up(unweight(point.x, weights.x) * width as f64),
                cy: round_half_up(unweight(point.y, weights.y) * height as f64),
                radius: round_half_up(centroid.weight * radius_factor),
                stroke: SIGNATURE_STROKE,
                fill: Some(centroid_color(centroid, weights)),
            }
        })
        .collect()
}

/// Clears the canvas and draws every sample point.
pub fn visualize_points<R: Renderer>(renderer: &mut R, points: &[SamplePoint]) {
    let (width, height) = renderer.size();
    renderer.clear();
    for circle in sample_point_circles(points, width, height) {
        renderer.draw_circle(&circle);
    }
}

/// Clears the canvas and draws every centroid of `signature`.
pub fn visualize_signature<R: Renderer>(
    renderer: &mut R,
    signature: &Signature,
    weights: &FeatureWeights,
    magnify: f64,
) {
    let (width, height) = renderer.size();
    renderer.clear();
    for circle in signature_circles(signature, weights, width, height, magnify) {
        renderer.draw_circle(&circle);
    }
}
