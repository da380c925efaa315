// THEORY:
// The color module converts raw sRGB bytes into the two color representations the
// extractor works in:
//
// - CIE-Lab (D65), the color axes of every feature point. Lab is used because
//   Euclidean distance in it roughly tracks perceived color difference, which is
//   what lets k-means treat color as just three more coordinates.
// - Quantized greyscale, the input of the co-occurrence texture statistics.
//
// The sRGB decode uses a plain 2.2 exponent above the linear toe (not the 2.4 of
// the IEC curve); stored signatures depend on it. The inverse, `lab_to_rgb`,
// encodes with 1/2.2 so the pair round-trips at byte precision.
//
// The per-byte decode is a 256-entry `OnceLock` table; the hot path is a lookup
// and a 3x3 multiply.

use crate::core_modules::pixel::Pixel;
use std::sync::OnceLock;

/// D65 reference white.
const WHITE_X: f64 = 0.9505;
const WHITE_Y: f64 = 1.0;
const WHITE_Z: f64 = 1.0890;

const LAB_EPSILON: f64 = 0.008856;
const LAB_KAPPA: f64 = 7.787;
const LAB_OFFSET: f64 = 16.0 / 116.0;

const SRGB_GAMMA: f64 = 2.2;

static SRGB_TO_LINEAR_LUT: OnceLock<[f64; 256]> = OnceLock::new();

/// A CIE-Lab color. `l` in [0, 100], `a`/`b` roughly in [-128, 128].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    pub const fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }
}

#[inline]
fn srgb_to_linear(value: u8) -> f64 {
    let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
        let mut table = [0.0f64; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let normalized = i as f64 / 255.0;
            *slot = if normalized > 0.04045 {
                ((normalized + 0.055) / 1.055).powf(SRGB_GAMMA)
            } else {
                normalized / 12.92
            };
        }
        table
    });
    table[value as usize]
}

#[inline]
fn linear_to_srgb(value: f64) -> f64 {
    if value > 0.0031308 {
        1.055 * value.powf(1.0 / SRGB_GAMMA) - 0.055
    } else {
        12.92 * value
    }
}

#[inline]
fn lab_f(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        LAB_KAPPA * t + LAB_OFFSET
    }
}

#[inline]
fn lab_f_inverse(t: f64) -> f64 {
    let cube = t * t * t;
    if cube > LAB_EPSILON {
        cube
    } else {
        (t - LAB_OFFSET) / LAB_KAPPA
    }
}

/// Rounds half towards positive infinity.
///
/// Lab components and grey levels have always been rounded this way; `f64::round`
/// differs on negative halves (`-2.5` becomes `-3` instead of `-2`).
#[inline]
pub(crate) fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Converts an sRGB pixel to CIE-Lab under D65. Alpha is ignored.
pub fn rgb_to_lab(pixel: Pixel) -> Lab {
    let r = srgb_to_linear(pixel.red);
    let g = srgb_to_linear(pixel.green);
    let b = srgb_to_linear(pixel.blue);

    let x = r * 0.4124 + g * 0.3576 + b * 0.1805;
    let y = r * 0.2126 + g * 0.7152 + b * 0.0722;
    let z = r * 0.0193 + g * 0.1192 + b * 0.9505;

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// Converts a CIE-Lab color back to clamped sRGB bytes.
pub fn lab_to_rgb(lab: Lab) -> [u8; 3] {
    let fy = (lab.l + 16.0) / 116.0;
    let fx = lab.a / 500.0 + fy;
    let fz = fy - lab.b / 200.0;

    let x = lab_f_inverse(fx) * WHITE_X;
    let y = lab_f_inverse(fy) * WHITE_Y;
    let z = lab_f_inverse(fz) * WHITE_Z;

    let r = x * 3.2406 + y * -1.5372 + z * -0.4986;
    let g = x * -0.9689 + y * 1.8758 + z * 0.0415;
    let b = x * 0.0557 + y * -0.2040 + z * 1.0570;

    [r, g, b].map(|channel| {
        round_half_up(linear_to_srgb(channel) * 255.0).clamp(0.0, 255.0) as u8
    })
}

/// Projects a pixel to a grey level in `[0, max_level]` using 0.30/0.59/0.11 luma weights.
#[inline]
pub fn rgb_to_greyscale(pixel: Pixel, max_level: u32) -> u32 {
    let luma = (0.30 * pixel.red as f64 + 0.59 * pixel.green as f64 + 0.11 * pixel.blue as f64) / 255.0;
    round_half_up(max_level as f64 * luma) as u32
}

/// Formats an sRGB triple as `#rrggbb`.
pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}
