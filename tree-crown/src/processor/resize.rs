use super::{AugInput, Augmentation};
use crate::common::*;

/// Resizes the image to a fixed size with bilinear interpolation.
#[derive(Debug, Clone)]
pub struct Resize {
    height: u32,
    width: u32,
}

impl Resize {
    pub fn new(height: u32, width: u32) -> Result<Self> {
        ensure!(
            height > 0 && width > 0,
            "resize target must be non-empty, but get {}x{}",
            width,
            height
        );
        Ok(Self { height, width })
    }
}

impl Augmentation for Resize {
    fn apply(&self, input: &mut AugInput, _rng: &mut StdRng) -> Result<()> {
        let (orig_w, orig_h) = input.image.dimensions();
        if (orig_w, orig_h) == (self.width, self.height) {
            return Ok(());
        }
        ensure!(
            orig_w > 0 && orig_h > 0,
            "cannot resize an empty image"
        );

        input.image = image::imageops::resize(
            &input.image,
            self.width,
            self.height,
            FilterType::Triangle,
        );

        let transform = Transform::from_sizes_exact(
            [orig_w as f64, orig_h as f64],
            [self.width as f64, self.height as f64],
        );
        input.map_points(|point| transform.apply_point(point))?;
        Ok(())
    }
}
