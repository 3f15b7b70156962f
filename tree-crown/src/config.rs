//! Training program configuration format.

use crate::common::*;

pub use dataset::*;
pub use solver::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub datasets: DatasetsConfig,
    #[serde(default)]
    pub input: InputConfig,
    pub dataloader: DataLoaderConfig,
    pub model: ModelConfig,
    pub solver: SolverConfig,
    pub test: TestConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let DatasetsConfig { train, test } = &self.datasets;
        ensure!(!train.name.is_empty(), "the train split name must not be empty");
        ensure!(!test.name.is_empty(), "the test split name must not be empty");
        ensure!(
            train.name != test.name,
            "train and test splits must have distinct names"
        );
        ensure!(self.solver.max_iter > 0, "solver.max_iter must be positive");
        ensure!(
            self.input.max_image_id_len > 0,
            "input.max_image_id_len must be positive"
        );
        Ok(())
    }
}

mod dataset {
    use super::*;

    /// The dataset splits used by a training run.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetsConfig {
        pub train: SplitConfig,
        pub test: SplitConfig,
    }

    /// A named split backed by a directory of label files.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SplitConfig {
        /// The name under which the split is registered.
        pub name: String,
        /// The directory of `*.geojson` label files.
        pub dir: PathBuf,
    }

    /// Options of label ingestion.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct InputConfig {
        /// The maximum number of characters kept in an image id.
        #[serde(default = "default_max_image_id_len")]
        pub max_image_id_len: usize,
    }

    impl Default for InputConfig {
        fn default() -> Self {
            Self {
                max_image_id_len: default_max_image_id_len(),
            }
        }
    }

    /// Data loader options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DataLoaderConfig {
        /// The number of images per training batch.
        pub batch_size: NonZeroUsize,
        /// The number of images per validation batch.
        #[serde(default = "default_test_batch_size")]
        pub test_batch_size: NonZeroUsize,
        /// The seed of shuffling and augmentations. It is drawn from entropy if not set.
        pub seed: Option<u64>,
    }

    fn default_max_image_id_len() -> usize {
        400
    }

    fn default_test_batch_size() -> NonZeroUsize {
        NonZeroUsize::new(1).unwrap()
    }
}

/// The model options read by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub num_classes: NonZeroUsize,
}

mod solver {
    use super::*;

    /// The optimization options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SolverConfig {
        /// The number of training iterations.
        pub max_iter: usize,
        /// Learning rate scheduling strategy.
        pub lr_schedule: LearningRateSchedule,
    }

    /// The learning rate scheduling strategy.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LearningRateSchedule {
        /// Use constant learning rate.
        Constant { lr: R64 },
        /// Use specific learning rate at specified steps.
        StepWise { steps: Vec<(usize, R64)> },
    }
}

/// Periodic evaluation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Run evaluation and validation loss per this steps. Zero disables periodic runs,
    /// leaving only the run at the final step.
    pub eval_period: usize,
}

/// Accuracy evaluator options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// The directory where evaluation results are written.
    pub output_dir: PathBuf,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("eval_2"),
        }
    }
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    /// Write metrics per this steps.
    #[serde(default = "default_writer_period")]
    pub writer_period: NonZeroUsize,
}

fn default_writer_period() -> NonZeroUsize {
    NonZeroUsize::new(20).unwrap()
}
