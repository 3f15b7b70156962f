//! The augmentation interface and the fixed training pipeline.

use super::{
    RandomBrightness, RandomContrast, RandomFlip, RandomLighting, RandomRotation,
    RandomSaturation, Resize,
};
use crate::{common::*, dataset::Annotation};

/// The side length of the square training resolution.
pub const TRAINING_RESOLUTION: u32 = 800;

/// An image with its annotations in pixel coordinates.
#[derive(Debug, Clone)]
pub struct AugInput {
    pub image: RgbImage,
    pub annotations: Vec<Annotation>,
}

impl AugInput {
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Move every polygon vertex. Boxes are rebuilt from the moved polygons.
    pub fn map_points<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut([f64; 2]) -> [f64; 2],
    {
        self.annotations = self
            .annotations
            .iter()
            .map(|annotation| annotation.map_points(&mut f))
            .try_collect()?;
        Ok(())
    }
}

/// A randomized transform applied to an image and its annotations.
pub trait Augmentation
where
    Self: Debug + Send + Sync,
{
    fn apply(&self, input: &mut AugInput, rng: &mut StdRng) -> Result<()>;
}

/// Augmentations applied in order, each on the output of the previous one.
#[derive(Debug, Default)]
pub struct AugmentationList {
    augmentations: Vec<Box<dyn Augmentation>>,
}

impl AugmentationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<A>(mut self, augmentation: A) -> Self
    where
        A: Augmentation + 'static,
    {
        self.augmentations.push(Box::new(augmentation));
        self
    }

    pub fn len(&self) -> usize {
        self.augmentations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.augmentations.is_empty()
    }

    /// The fixed pipeline for tree crown training.
    pub fn tree_crown_training() -> Result<Self> {
        let list = Self::new()
            .push(Resize::new(TRAINING_RESOLUTION, TRAINING_RESOLUTION)?)
            .push(RandomBrightness::new(0.8, 1.8)?)
            .push(RandomContrast::new(0.6, 1.3)?)
            .push(RandomSaturation::new(0.8, 1.4)?)
            .push(RandomRotation::new(90.0, 90.0)?)
            .push(RandomLighting::new(0.7)?)
            .push(RandomFlip::new(0.4, false, true)?);
        Ok(list)
    }
}

impl Augmentation for AugmentationList {
    fn apply(&self, input: &mut AugInput, rng: &mut StdRng) -> Result<()> {
        self.augmentations
            .iter()
            .try_for_each(|augmentation| augmentation.apply(input, rng))
    }
}
