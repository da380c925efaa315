// THEORY:
// Texture is summarized by two statistics of a grey-level co-occurrence
// accumulation (GLCM) over a small square window around a sample point:
//
// - contrast = Σ (i - j)² p(i, j): how different neighboring grey levels are;
// - entropy  = -Σ p(i, j) ln p(i, j): how disordered the neighbor pairs are.
//
// The window is quantized to `grey_levels` levels, then every 2x2 cell
// contributes four pairs: right, down, down-right and the anti-diagonal
// (top-right with bottom-left). The matrix is symmetric, so only its lower
// triangle is stored: a pair (i, j) always lands in [max(i, j)][min(i, j)].
//
// Windows at the image border are clipped rather than padded, and the
// normalizer shrinks with the window. A clipped window narrower or shorter than
// two pixels has no pairs at all and is rejected.

use crate::core_modules::color::rgb_to_greyscale;
use crate::core_modules::pixel::PixelBuffer;
use crate::error::ExtractionError;

/// Local texture statistics around one sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextureStats {
    pub contrast: f64,
    pub entropy: f64,
}

/// Lower-triangular co-occurrence counts for `levels` grey levels.
#[derive(Debug, Clone)]
pub struct CooccurrenceMatrix {
    levels: usize,
    counts: Vec<u32>,
    total: u32,
}

impl CooccurrenceMatrix {
    pub fn new(levels: usize) -> Self {
        Self {
            levels,
            counts: vec![0; levels * levels],
            total: 0,
        }
    }

    /// Records one neighboring pair of grey levels.
    #[inline]
    pub fn accumulate(&mut self, first: u32, second: u32) {
        let (row, column) = if first >= second {
            (first as usize, second as usize)
        } else {
            (second as usize, first as usize)
        };
        self.counts[row * self.levels + column] += 1;
        self.total += 1;
    }

    pub fn count(&self, first: u32, second: u32) -> u32 {
        let (row, column) = (first.max(second) as usize, first.min(second) as usize);
        self.counts[row * self.levels + column]
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Contrast and entropy with every count divided by `normalizer`.
    pub fn statistics(&self, normalizer: f64) -> TextureStats {
        let mut stats = TextureStats::default();
        for row in 0..self.levels {
            for column in 0..=row {
                let count = self.counts[row * self.levels + column];
                if count == 0 {
                    continue;
                }
                let probability = count as f64 / normalizer;
                let difference = row as f64 - column as f64;
                stats.contrast += difference * difference * probability;
                stats.entropy -= probability * probability.ln();
            }
        }
        stats
    }
}

/// Computes local contrast and entropy around `(x, y)` from a `(2·radius+1)²`
/// window clipped to the image, quantized to `grey_levels` levels. The centre
/// must lie inside the image.
pub fn contrast_entropy(
    image: &PixelBuffer,
    x: u32,
    y: u32,
    radius: u32,
    grey_levels: u32,
) -> Result<TextureStats, ExtractionError> {
    if x >= image.width() || y >= image.height() {
        return Err(ExtractionError::SampleOutOfBounds {
            x,
            y,
            width: image.width(),
            height: image.height(),
        });
    }
    let from_x = x.saturating_sub(radius);
    let from_y = y.saturating_sub(radius);
    let to_x = x.saturating_add(radius).min(image.width() - 1);
    let to_y = y.saturating_add(radius).min(image.height() - 1);
    let width = (to_x + 1).saturating_sub(from_x);
    let height = (to_y + 1).saturating_sub(from_y);

    if width < 2 || height < 2 {
        return Err(ExtractionError::WindowTooSmall {
            x,
            y,
            radius,
            width,
            height,
        });
    }

    let max_level = grey_levels.saturating_sub(1);
    let mut window = Vec::with_capacity((width * height) as usize);
    for window_y in from_y..=to_y {
        for window_x in from_x..=to_x {
            window.push(rgb_to_greyscale(image.pixel(window_x, window_y), max_level));
        }
    }

    let stride = width as usize;
    let mut matrix = CooccurrenceMatrix::new(max_level as usize + 1);
    for row in 0..height as usize - 1 {
        for column in 0..stride - 1 {
            let top_left = window[row * stride + column];
            let top_right = window[row * stride + column + 1];
            let bottom_left = window[(row + 1) * stride + column];
            let bottom_right = window[(row + 1) * stride + column + 1];

            matrix.accumulate(top_left, top_right);
            matrix.accumulate(top_left, bottom_left);
            matrix.accumulate(top_left, bottom_right);
            matrix.accumulate(top_right, bottom_left);
        }
    }

    let normalizer = 4.0 * (width - 1) as f64 * (height - 1) as f64;
    Ok(matrix.statistics(normalizer))
}
