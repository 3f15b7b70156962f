//! The random color distortion algorithms.
//!
//! Every transform here blends the image with a source value,
//! `src * (1 - w) + image * w`, for a weight `w` drawn uniformly from a range.

use super::{AugInput, Augmentation};
use crate::common::*;

const GRAY_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// Round and clip a channel value into the `u8` range.
pub(crate) fn to_channel(value: f64) -> u8 {
    value.clamp(0.0, 255.0).round() as u8
}

fn check_weight_range(min: f64, max: f64) -> Result<Range<f64>> {
    ensure!(
        min >= 0.0 && min <= max,
        "the weight range must satisfy 0 <= min <= max, but get [{}, {}]",
        min,
        max
    );
    Ok(min..max)
}

fn sample_weight(range: &Range<f64>, rng: &mut StdRng) -> f64 {
    if range.start == range.end {
        range.start
    } else {
        rng.gen_range(range.clone())
    }
}

/// Scales pixel intensities by a random factor.
#[derive(Debug, Clone)]
pub struct RandomBrightness {
    range: Range<f64>,
}

impl RandomBrightness {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        Ok(Self {
            range: check_weight_range(min, max)?,
        })
    }
}

impl Augmentation for RandomBrightness {
    fn apply(&self, input: &mut AugInput, rng: &mut StdRng) -> Result<()> {
        let weight = sample_weight(&self.range, rng);
        input.image.pixels_mut().for_each(|pixel| {
            pixel
                .0
                .iter_mut()
                .for_each(|channel| *channel = to_channel(*channel as f64 * weight));
        });
        Ok(())
    }
}

/// Blends the image with its mean intensity.
#[derive(Debug, Clone)]
pub struct RandomContrast {
    range: Range<f64>,
}

impl RandomContrast {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        Ok(Self {
            range: check_weight_range(min, max)?,
        })
    }
}

impl Augmentation for RandomContrast {
    fn apply(&self, input: &mut AugInput, rng: &mut StdRng) -> Result<()> {
        let weight = sample_weight(&self.range, rng);
        let raw = input.image.as_raw();
        if raw.is_empty() {
            return Ok(());
        }
        let mean = raw.iter().map(|&value| value as f64).sum::<f64>() / raw.len() as f64;

        input.image.pixels_mut().for_each(|pixel| {
            pixel.0.iter_mut().for_each(|channel| {
                *channel = to_channel(mean * (1.0 - weight) + *channel as f64 * weight)
            });
        });
        Ok(())
    }
}

/// Blends the image with its grayscale version.
#[derive(Debug, Clone)]
pub struct RandomSaturation {
    range: Range<f64>,
}

impl RandomSaturation {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        Ok(Self {
            range: check_weight_range(min, max)?,
        })
    }
}

impl Augmentation for RandomSaturation {
    fn apply(&self, input: &mut AugInput, rng: &mut StdRng) -> Result<()> {
        let weight = sample_weight(&self.range, rng);
        input.image.pixels_mut().for_each(|pixel| {
            let gray: f64 = izip!(pixel.0, GRAY_WEIGHTS)
                .map(|(channel, coef)| channel as f64 * coef)
                .sum();
            pixel.0.iter_mut().for_each(|channel| {
                *channel = to_channel(gray * (1.0 - weight) + *channel as f64 * weight)
            });
        });
        Ok(())
    }
}
