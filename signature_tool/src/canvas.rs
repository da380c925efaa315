use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError, Rgba, RgbaImage};
use image_signature::core_modules::render::{Circle, Renderer};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Half the stroke width, in pixels.
const STROKE_HALF_WIDTH: f64 = 0.5;

/// An in-memory RGBA canvas for the signature visualizations.
pub struct ImageCanvas {
    image: RgbaImage,
}

impl ImageCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, BACKGROUND),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn save_png(&self, path: &Path) -> Result<(), ImageError> {
        let output = BufWriter::new(File::create(path)?);
        PngEncoder::new(output).write_image(
            self.image.as_raw(),
            self.image.width(),
            self.image.height(),
            ExtendedColorType::Rgba8,
        )
    }
}

fn opaque([red, green, blue]: [u8; 3]) -> Rgba<u8> {
    Rgba([red, green, blue, 255])
}

impl Renderer for ImageCanvas {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = BACKGROUND;
        }
    }

    fn draw_circle(&mut self, circle: &Circle) {
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let reach = circle.radius + STROKE_HALF_WIDTH;
        let x_min = (circle.cx - reach).floor().max(0.0) as u32;
        let y_min = (circle.cy - reach).floor().max(0.0) as u32;
        let x_max = ((circle.cx + reach).ceil().max(0.0) as u32).min(width - 1);
        let y_max = ((circle.cy + reach).ceil().max(0.0) as u32).min(height - 1);

        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let distance = (x as f64 - circle.cx).hypot(y as f64 - circle.cy);
                if (distance - circle.radius).abs() <= STROKE_HALF_WIDTH {
                    self.image.put_pixel(x, y, opaque(circle.stroke));
                } else if let Some(fill) = circle.fill.filter(|_| distance < circle.radius) {
                    self.image.put_pixel(x, y, opaque(fill));
                }
            }
        }
    }
}
