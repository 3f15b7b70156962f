//! The interface of the trainable detector.

use crate::{common::*, data::Batch, dataset::Polygon};

/// Named loss components of a forward pass, normalized to plain numbers.
pub type LossDict = IndexMap<String, f64>;

/// Sum every component of a loss dictionary.
pub fn total_loss(losses: &LossDict) -> f64 {
    losses.values().sum()
}

/// A detected instance in the coordinates of the original image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub bbox: XYXY<f64>,
    pub score: f64,
    pub category_id: usize,
    /// The instance mask outline, if the model predicts masks.
    pub polygon: Option<Polygon>,
}

/// A detection model together with its optimizer.
///
/// Implementations convert their native loss outputs into [LossDict] before
/// returning, so the training loop only deals with `f64` values.
pub trait DetectionModel
where
    Self: Send,
{
    /// Run forward and backward passes and update the weights.
    fn train_step(&mut self, batch: &Batch) -> Result<LossDict>;

    /// Compute the training losses without updating the weights.
    fn compute_losses(&mut self, batch: &Batch) -> Result<LossDict>;

    /// Predict instances, one list per sample in the batch.
    fn inference(&mut self, batch: &Batch) -> Result<Vec<Vec<Prediction>>>;

    fn set_lr(&mut self, _lr: f64) {}
}
