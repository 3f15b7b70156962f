#![allow(dead_code)]

use anyhow::{bail, Result};
use image::{Rgb, RgbImage};
use serde_json::json;
use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tree_crown::{
    data::Batch,
    engine::Synchronize,
    model::{DetectionModel, LossDict, Prediction},
};

/// An image and the raw label rings of its features.
pub struct LabeledImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub rings: Vec<Vec<[f64; 2]>>,
}

/// Write a raster and a label file per image into `dir`.
pub fn write_label_dir(dir: &Path, images: &[LabeledImage]) -> Result<()> {
    fs::create_dir_all(dir)?;

    for image in images {
        let LabeledImage {
            ref name,
            width,
            height,
            ref rings,
        } = *image;

        let image_name = format!("{}.png", name);
        RgbImage::from_pixel(width, height, Rgb([40, 120, 60])).save(dir.join(&image_name))?;

        let features: Vec<_> = rings
            .iter()
            .map(|ring| {
                json!({
                    "type": "Feature",
                    "properties": {},
                    "geometry": { "type": "Polygon", "coordinates": [ring] },
                })
            })
            .collect();
        let label = json!({
            "type": "FeatureCollection",
            "imagePath": image_name,
            "features": features,
        });
        fs::write(
            dir.join(format!("{}.geojson", name)),
            serde_json::to_string_pretty(&label)?,
        )?;
    }

    Ok(())
}

/// A square crown with the lower-left corner at `(x, y)`.
pub fn square(x: f64, y: f64, side: f64) -> Vec<[f64; 2]> {
    vec![
        [x, y],
        [x + side, y],
        [x + side, y + side],
        [x, y + side],
        [x, y],
    ]
}

/// A model that replays a list of validation losses.
pub struct ScriptedModel {
    pub validation_losses: Vec<f64>,
    pub compute_calls: Arc<AtomicUsize>,
    pub fail_validation: bool,
    cursor: usize,
}

impl ScriptedModel {
    pub fn new(validation_losses: Vec<f64>) -> Self {
        Self {
            validation_losses,
            compute_calls: Arc::new(AtomicUsize::new(0)),
            fail_validation: false,
            cursor: 0,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_validation: true,
            ..Self::new(vec![1.0])
        }
    }
}

impl DetectionModel for ScriptedModel {
    fn train_step(&mut self, _batch: &Batch) -> Result<LossDict> {
        Ok([("loss_cls".to_string(), 0.5), ("loss_mask".to_string(), 0.25)]
            .into_iter()
            .collect())
    }

    fn compute_losses(&mut self, _batch: &Batch) -> Result<LossDict> {
        self.compute_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_validation {
            bail!("forward pass failed");
        }

        let loss = self.validation_losses[self.cursor % self.validation_losses.len()];
        self.cursor += 1;
        // the components sum up to the scripted loss
        Ok([
            ("loss_cls".to_string(), loss * 0.25),
            ("loss_box_reg".to_string(), loss * 0.75),
        ]
        .into_iter()
        .collect())
    }

    fn inference(&mut self, batch: &Batch) -> Result<Vec<Vec<Prediction>>> {
        let predictions = batch
            .iter()
            .map(|sample| {
                sample
                    .annotations
                    .iter()
                    .map(|annotation| Prediction {
                        bbox: *annotation.bbox(),
                        score: 0.8,
                        category_id: annotation.category_id(),
                        polygon: Some(annotation.polygon().clone()),
                    })
                    .collect()
            })
            .collect();
        Ok(predictions)
    }
}

/// A single worker counting barrier calls.
#[derive(Debug, Default)]
pub struct CountingSync {
    pub calls: AtomicUsize,
}

impl CountingSync {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Synchronize for CountingSync {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn synchronize(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
