use super::{color_jitter::to_channel, AugInput, Augmentation};
use crate::common::*;
use rand_distr::Normal;

/// The principal components of ImageNet RGB pixels, one eigenvector per column.
const EIGEN_VECS: [[f64; 3]; 3] = [
    [-0.5675, 0.7192, 0.4009],
    [-0.5808, -0.0045, -0.8140],
    [-0.5836, -0.6948, 0.4203],
];
const EIGEN_VALS: [f64; 3] = [0.2175, 0.0188, 0.0045];

/// AlexNet-style lighting noise along the principal color components.
#[derive(Debug, Clone)]
pub struct RandomLighting {
    normal: Normal<f64>,
}

impl RandomLighting {
    /// `scale` is the standard deviation of the component weights.
    pub fn new(scale: f64) -> Result<Self> {
        ensure!(scale >= 0.0, "lighting scale must be non-negative");
        let normal = Normal::new(0.0, scale)?;
        Ok(Self { normal })
    }

    /// The per-channel offset for the given component weights.
    fn offset(weights: [f64; 3]) -> [f64; 3] {
        let scaled: Vec<f64> = izip!(weights, EIGEN_VALS)
            .map(|(weight, val)| weight * val)
            .collect();
        EIGEN_VECS.map(|row| izip!(row, &scaled).map(|(vec, scaled)| vec * scaled).sum())
    }
}

impl Augmentation for RandomLighting {
    fn apply(&self, input: &mut AugInput, rng: &mut StdRng) -> Result<()> {
        let weights = [
            self.normal.sample(rng),
            self.normal.sample(rng),
            self.normal.sample(rng),
        ];
        let offset = Self::offset(weights);

        input.image.pixels_mut().for_each(|pixel| {
            izip!(pixel.0.iter_mut(), offset).for_each(|(channel, offset)| {
                *channel = to_channel(*channel as f64 + offset);
            });
        });
        Ok(())
    }
}
