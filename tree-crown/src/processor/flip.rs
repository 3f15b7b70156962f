use super::{AugInput, Augmentation};
use crate::common::*;

/// Flips the image along one axis with a probability.
#[derive(Debug, Clone)]
pub struct RandomFlip {
    prob: f64,
    horizontal: bool,
}

impl RandomFlip {
    /// Exactly one of `horizontal` and `vertical` must be set.
    pub fn new(prob: f64, horizontal: bool, vertical: bool) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&prob),
            "flip probability must be within [0, 1], but get {}",
            prob
        );
        ensure!(
            horizontal ^ vertical,
            "exactly one of horizontal and vertical flip must be enabled"
        );
        Ok(Self { prob, horizontal })
    }
}

impl Augmentation for RandomFlip {
    fn apply(&self, input: &mut AugInput, rng: &mut StdRng) -> Result<()> {
        if rng.gen::<f64>() >= self.prob {
            return Ok(());
        }

        let (width, height) = input.image.dimensions();
        let transform = if self.horizontal {
            image::imageops::flip_horizontal_in_place(&mut input.image);
            Transform::horizontal_flip(width as f64)
        } else {
            image::imageops::flip_vertical_in_place(&mut input.image);
            Transform::vertical_flip(height as f64)
        };
        input.map_points(|point| transform.apply_point(point))?;
        Ok(())
    }
}
