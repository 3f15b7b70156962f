//! Accuracy evaluators.

use crate::{common::*, data::Batch, model::Prediction};

/// The file the COCO evaluator writes predictions to.
pub const COCO_RESULTS_FILE_NAME: &str = "coco_instances_results.json";

/// Accumulates model predictions over a dataset and summarizes them.
pub trait DatasetEvaluator
where
    Self: Send,
{
    /// Clear the state of the previous evaluation.
    fn reset(&mut self);

    /// Take the predictions for a batch, one list per sample.
    fn process(&mut self, batch: &Batch, predictions: Vec<Vec<Prediction>>) -> Result<()>;

    /// Summarize the processed predictions into named scores.
    fn evaluate(&mut self) -> Result<IndexMap<String, f64>>;
}

/// One prediction in the COCO results format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoInstance {
    pub image_id: String,
    pub category_id: usize,
    /// `[x, y, w, h]` in absolute pixels.
    pub bbox: [f64; 4],
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Vec<Vec<f64>>>,
}

/// Collects predictions in the COCO results format and writes them to the
/// output directory. Scoring the results is left to the COCO tools.
#[derive(Debug)]
pub struct CocoEvaluator {
    dataset_name: String,
    output_dir: PathBuf,
    segm: bool,
    num_images: usize,
    instances: Vec<CocoInstance>,
}

impl CocoEvaluator {
    /// Create the evaluator. The output directory is created if absent.
    pub fn new(
        dataset_name: impl Into<String>,
        output_dir: impl AsRef<Path>,
        segm: bool,
    ) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_owned();
        fs::create_dir_all(&output_dir).with_context(|| {
            format!(
                "failed to create evaluation directory '{}'",
                output_dir.display()
            )
        })?;

        Ok(Self {
            dataset_name: dataset_name.into(),
            output_dir,
            segm,
            num_images: 0,
            instances: vec![],
        })
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join(COCO_RESULTS_FILE_NAME)
    }
}

impl DatasetEvaluator for CocoEvaluator {
    fn reset(&mut self) {
        self.num_images = 0;
        self.instances.clear();
    }

    fn process(&mut self, batch: &Batch, predictions: Vec<Vec<Prediction>>) -> Result<()> {
        ensure!(
            batch.len() == predictions.len(),
            "expect predictions for {} images, but get {}",
            batch.len(),
            predictions.len()
        );

        let segm = self.segm;
        for (sample, predictions) in izip!(batch, predictions) {
            self.num_images += 1;
            let instances = predictions.into_iter().map(|prediction| {
                let Prediction {
                    bbox,
                    score,
                    category_id,
                    polygon,
                } = prediction;
                let segmentation = if segm {
                    polygon.map(|polygon| vec![polygon.as_flat().to_vec()])
                } else {
                    None
                };

                CocoInstance {
                    image_id: sample.image_id.clone(),
                    category_id,
                    bbox: bbox.xywh(),
                    score,
                    segmentation,
                }
            });
            self.instances.extend(instances);
        }
        Ok(())
    }

    fn evaluate(&mut self) -> Result<IndexMap<String, f64>> {
        let path = self.results_path();
        let writer = BufWriter::new(
            File::create(&path)
                .with_context(|| format!("failed to create '{}'", path.display()))?,
        );
        serde_json::to_writer(writer, &self.instances)?;

        info!(
            "saved {} predictions on {} images of '{}' to '{}'",
            self.instances.len(),
            self.num_images,
            self.dataset_name,
            path.display()
        );

        let results: IndexMap<_, _> = [
            ("num_images".to_string(), self.num_images as f64),
            ("num_predictions".to_string(), self.instances.len() as f64),
        ]
        .into_iter()
        .collect();
        Ok(results)
    }
}
