use super::{AugInput, Augmentation};
use crate::common::*;

/// Rotates the image around its center by an angle in degrees drawn from a
/// range. Positive angles rotate counter-clockwise. The canvas keeps its size,
/// so corners leaving the canvas are cut and uncovered pixels become black.
#[derive(Debug, Clone)]
pub struct RandomRotation {
    min_degrees: f64,
    max_degrees: f64,
}

impl RandomRotation {
    pub fn new(min_degrees: f64, max_degrees: f64) -> Result<Self> {
        ensure!(
            min_degrees.is_finite() && max_degrees.is_finite() && min_degrees <= max_degrees,
            "invalid rotation range [{}, {}]",
            min_degrees,
            max_degrees
        );
        Ok(Self {
            min_degrees,
            max_degrees,
        })
    }
}

impl Augmentation for RandomRotation {
    fn apply(&self, input: &mut AugInput, rng: &mut StdRng) -> Result<()> {
        let degrees = if self.min_degrees == self.max_degrees {
            self.min_degrees
        } else {
            rng.gen_range(self.min_degrees..self.max_degrees)
        };
        if degrees % 360.0 == 0.0 {
            return Ok(());
        }

        let (width, height) = input.image.dimensions();
        let rotation = Rotation::new(degrees, width, height);
        input.image = rotation.apply_image(&input.image);
        input.map_points(|point| rotation.apply_coords(point))?;
        Ok(())
    }
}

/// A fixed rotation around the center of a `width` x `height` canvas.
#[derive(Debug, Clone, Copy)]
struct Rotation {
    cos: f64,
    sin: f64,
    width: u32,
    height: u32,
}

impl Rotation {
    fn new(degrees: f64, width: u32, height: u32) -> Self {
        let radians = degrees.to_radians();
        let (sin, cos) = radians.sin_cos();

        // snap the exact quarter turns
        let snap = |value: f64| {
            let rounded = value.round();
            if (value - rounded).abs() < 1e-12 {
                rounded
            } else {
                value
            }
        };

        Self {
            cos: snap(cos),
            sin: snap(sin),
            width,
            height,
        }
    }

    /// Rotate a point around `center`.
    fn rotate_around(&self, point: [f64; 2], center: [f64; 2]) -> [f64; 2] {
        let Self { cos, sin, .. } = *self;
        let [x, y] = point;
        let [cx, cy] = center;
        let dx = x - cx;
        let dy = y - cy;
        [cos * dx + sin * dy + cx, -sin * dx + cos * dy + cy]
    }

    /// Inverse of [rotate_around](Self::rotate_around).
    fn unrotate_around(&self, point: [f64; 2], center: [f64; 2]) -> [f64; 2] {
        let Self { cos, sin, .. } = *self;
        let [x, y] = point;
        let [cx, cy] = center;
        let dx = x - cx;
        let dy = y - cy;
        [cos * dx - sin * dy + cx, sin * dx + cos * dy + cy]
    }

    /// Coordinates rotate around the geometric center of the canvas.
    fn apply_coords(&self, point: [f64; 2]) -> [f64; 2] {
        let center = [self.width as f64 / 2.0, self.height as f64 / 2.0];
        self.rotate_around(point, center)
    }

    /// Pixel indices rotate around the center pixel, which is half a pixel
    /// off the geometric center.
    fn apply_image(&self, image: &RgbImage) -> RgbImage {
        let center = [
            self.width as f64 / 2.0 - 0.5,
            self.height as f64 / 2.0 - 0.5,
        ];

        RgbImage::from_fn(self.width, self.height, |x, y| {
            let [src_x, src_y] = self.unrotate_around([x as f64, y as f64], center);
            let src_x = src_x.round();
            let src_y = src_y.round();

            let inside = src_x >= 0.0
                && src_y >= 0.0
                && src_x < self.width as f64
                && src_y < self.height as f64;
            if inside {
                *image.get_pixel(src_x as u32, src_y as u32)
            } else {
                Rgb([0, 0, 0])
            }
        })
    }
}
