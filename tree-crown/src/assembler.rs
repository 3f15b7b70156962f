//! Composition of a training run from the configuration.

use crate::{
    common::*,
    config::{Config, DatasetsConfig},
    data::{DataLoader, DatasetMapper},
    dataset::DatasetCatalog,
    engine::{
        EvalHook, IterationTimer, JsonWriter, LrSchedulerHook, PeriodicWriter, Synchronize,
        TrainHook, Trainer, ValidationLossHook, METRICS_FILE_NAME,
    },
    evaluation::CocoEvaluator,
    model::DetectionModel,
    processor::AugmentationList,
};

/// The time format of logging directory names.
pub const DIR_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";

/// A trainer ready to run, with its logging directory.
#[derive(Debug)]
pub struct TrainingRun {
    logging_dir: PathBuf,
    trainer: Trainer,
}

impl TrainingRun {
    /// Assemble a run logging to a new timestamped directory under `logging.dir`.
    pub fn assemble(
        config: &Config,
        catalog: &DatasetCatalog,
        model: Box<dyn DetectionModel>,
        comm: Arc<dyn Synchronize>,
    ) -> Result<Self> {
        let start_time = Local::now();
        let logging_dir = config
            .logging
            .dir
            .join(format!("{}", start_time.format(DIR_STRFTIME)));
        Self::assemble_in(config, catalog, model, comm, logging_dir)
    }

    /// Assemble a run logging to the given directory.
    pub fn assemble_in(
        config: &Config,
        catalog: &DatasetCatalog,
        model: Box<dyn DetectionModel>,
        comm: Arc<dyn Synchronize>,
        logging_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let logging_dir = logging_dir.as_ref().to_owned();
        let DatasetsConfig { train, test } = &config.datasets;

        let num_classes = config.model.num_classes.get();
        let thing_classes = &catalog.metadata(&train.name)?.thing_classes;
        ensure!(
            thing_classes.len() == num_classes,
            "model.num_classes is {}, but the dataset '{}' has {} classes",
            num_classes,
            train.name,
            thing_classes.len()
        );

        // create dirs and save config
        fs::create_dir_all(&logging_dir)?;
        {
            let path = logging_dir.join("config.json5");
            let text = serde_json::to_string_pretty(config)?;
            fs::write(&path, text)?;
        }

        let train_loader = Self::build_train_loader(config, catalog)?;
        let test_loader = Arc::new(Self::build_test_loader(config, catalog)?);
        let evaluator = Self::build_evaluator(config, &test.name)?;
        info!(
            "assembled {} train batches and {} validation batches",
            train_loader.len(),
            test_loader.len()
        );

        let mut hooks = Self::build_default_hooks(
            config,
            &logging_dir,
            test_loader.clone(),
            evaluator,
            comm.clone(),
        )?;
        let loss_hook = ValidationLossHook::new(config.test.eval_period, test_loader, comm);
        hooks.insert(hooks.len().saturating_sub(1), loss_hook.into());

        let mut trainer = Trainer::new(model, train_loader, 0, config.solver.max_iter);
        trainer.register_hooks(hooks);

        Ok(Self {
            logging_dir,
            trainer,
        })
    }

    /// The train loader with the fixed training augmentations.
    pub fn build_train_loader(config: &Config, catalog: &DatasetCatalog) -> Result<DataLoader> {
        let name = &config.datasets.train.name;
        let records = catalog.get(name)?;
        ensure!(!records.is_empty(), "the train dataset '{}' is empty", name);

        let mapper = DatasetMapper::new(Some(AugmentationList::tree_crown_training()?));
        Ok(DataLoader::new(
            records,
            mapper,
            config.dataloader.batch_size,
            config.dataloader.seed,
        ))
    }

    /// The validation loader without augmentation.
    pub fn build_test_loader(config: &Config, catalog: &DatasetCatalog) -> Result<DataLoader> {
        let name = &config.datasets.test.name;
        let records = catalog.get(name)?;
        ensure!(!records.is_empty(), "the test dataset '{}' is empty", name);

        Ok(DataLoader::new(
            records,
            DatasetMapper::new(None),
            config.dataloader.test_batch_size,
            config.dataloader.seed,
        ))
    }

    /// The COCO evaluator with segmentation enabled.
    pub fn build_evaluator(config: &Config, dataset_name: &str) -> Result<CocoEvaluator> {
        CocoEvaluator::new(dataset_name, &config.evaluation.output_dir, true)
    }

    /// The default hooks. The metrics writer runs last on the main process only.
    pub fn build_default_hooks(
        config: &Config,
        logging_dir: &Path,
        test_loader: Arc<DataLoader>,
        evaluator: CocoEvaluator,
        comm: Arc<dyn Synchronize>,
    ) -> Result<Vec<TrainHook>> {
        let mut hooks: Vec<TrainHook> = vec![
            IterationTimer::new().into(),
            LrSchedulerHook::new(&config.solver.lr_schedule)?.into(),
            EvalHook::new(
                config.test.eval_period,
                test_loader,
                Box::new(evaluator),
                comm.clone(),
            )
            .into(),
        ];

        if comm.is_main_process() {
            let writer = JsonWriter::new(logging_dir.join(METRICS_FILE_NAME))?;
            hooks.push(PeriodicWriter::new(config.logging.writer_period, writer).into());
        }

        Ok(hooks)
    }

    pub fn logging_dir(&self) -> &Path {
        &self.logging_dir
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    pub fn trainer_mut(&mut self) -> &mut Trainer {
        &mut self.trainer
    }

    pub fn into_trainer(self) -> Trainer {
        self.trainer
    }

    /// Run the training loop to the end.
    pub fn train(&mut self) -> Result<()> {
        let _span = info_span!("train", logging_dir = %self.logging_dir.display()).entered();
        self.trainer.train()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Batch,
        dataset::{DatasetMetadata, DetectionRecord},
        engine::LocalWorker,
        model::{LossDict, Prediction},
    };
    use tempfile::TempDir;

    struct NullModel;

    impl DetectionModel for NullModel {
        fn train_step(&mut self, _batch: &Batch) -> Result<LossDict> {
            Ok(LossDict::new())
        }

        fn compute_losses(&mut self, _batch: &Batch) -> Result<LossDict> {
            Ok(LossDict::new())
        }

        fn inference(&mut self, batch: &Batch) -> Result<Vec<Vec<Prediction>>> {
            Ok(vec![vec![]; batch.len()])
        }
    }

    fn config(dir: &Path) -> Config {
        let text = format!(
            r#"{{
                datasets: {{
                    train: {{ name: "tree_train", dir: "train" }},
                    test: {{ name: "tree_val", dir: "val" }},
                }},
                dataloader: {{ batch_size: 2 }},
                model: {{ num_classes: 1 }},
                solver: {{ max_iter: 20, lr_schedule: {{ type: "Constant", lr: 0.01 }} }},
                test: {{ eval_period: 10 }},
                evaluation: {{ output_dir: {:?} }},
                logging: {{ dir: {:?} }},
            }}"#,
            dir.join("eval_2"),
            dir.join("logs"),
        );
        json5::from_str(&text).unwrap()
    }

    fn catalog(num_val: usize) -> DatasetCatalog {
        let record = |name: &str| DetectionRecord {
            image_path: PathBuf::from(name),
            height: 8,
            width: 8,
            image_id: name.to_string(),
            annotations: vec![],
        };
        let mut catalog = DatasetCatalog::new();
        catalog
            .register(
                "tree_train",
                vec![record("a.png"), record("b.png"), record("c.png")],
                DatasetMetadata::tree_crowns(),
            )
            .unwrap();
        catalog
            .register(
                "tree_val",
                (0..num_val).map(|index| record(&format!("v{}.png", index))).collect(),
                DatasetMetadata::tree_crowns(),
            )
            .unwrap();
        catalog
    }

    #[test]
    fn hook_order_test() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let run = TrainingRun::assemble(
            &config,
            &catalog(3),
            Box::new(NullModel),
            Arc::new(LocalWorker),
        )
        .unwrap();

        let names = run.trainer().hooks().iter().map(|hook| hook.name()).collect_vec();
        assert_eq!(
            names,
            [
                "IterationTimer",
                "LrScheduler",
                "Eval",
                "ValidationLoss",
                "PeriodicWriter"
            ]
        );
        assert!(run.logging_dir().starts_with(dir.path().join("logs")));
        assert!(run.logging_dir().join("config.json5").is_file());
        assert!(dir.path().join("eval_2").is_dir());
    }

    #[test]
    fn loaders_test() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let catalog = catalog(3);

        let train_loader = TrainingRun::build_train_loader(&config, &catalog).unwrap();
        assert_eq!(train_loader.batch_size(), 2);
        assert_eq!(train_loader.num_records(), 3);

        // one image per validation batch by default
        let test_loader = TrainingRun::build_test_loader(&config, &catalog).unwrap();
        assert_eq!(test_loader.len(), 3);
    }

    #[test]
    fn empty_validation_set_fails() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let result = TrainingRun::assemble_in(
            &config,
            &catalog(0),
            Box::new(NullModel),
            Arc::new(LocalWorker),
            dir.path().join("run"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn class_count_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.model.num_classes = NonZeroUsize::new(2).unwrap();
        let result = TrainingRun::assemble_in(
            &config,
            &catalog(1),
            Box::new(NullModel),
            Arc::new(LocalWorker),
            dir.path().join("run"),
        );
        assert!(result.is_err());
    }
}
