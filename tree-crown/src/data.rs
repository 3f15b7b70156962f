//! Sample mapping and batch loading.

use crate::{
    common::*,
    dataset::{Annotation, DetectionRecord},
    processor::{AugInput, Augmentation, AugmentationList},
};

/// A decoded image with its annotations, ready to be fed to a model.
#[derive(Debug, Clone)]
pub struct Sample {
    pub image_id: String,
    pub image_path: PathBuf,
    /// The height of the source image before augmentation.
    pub height: usize,
    /// The width of the source image before augmentation.
    pub width: usize,
    pub image: RgbImage,
    pub annotations: Vec<Annotation>,
}

pub type Batch = Vec<Sample>;

/// Turns a record into a [Sample], optionally augmenting it.
#[derive(Debug, Default)]
pub struct DatasetMapper {
    augmentations: Option<AugmentationList>,
}

impl DatasetMapper {
    pub fn new(augmentations: Option<AugmentationList>) -> Self {
        Self { augmentations }
    }

    pub fn is_augmented(&self) -> bool {
        self.augmentations.is_some()
    }

    pub fn map(&self, record: &DetectionRecord, rng: &mut StdRng) -> Result<Sample> {
        let DetectionRecord {
            image_path,
            height,
            width,
            image_id,
            annotations,
        } = record;

        let image = image::open(image_path)
            .with_context(|| format!("failed to decode image '{}'", image_path.display()))?
            .to_rgb8();
        let (image_w, image_h) = image.dimensions();
        ensure!(
            (image_w as usize, image_h as usize) == (*width, *height),
            "the size of image '{}' is {}x{}, but the record says {}x{}",
            image_path.display(),
            image_w,
            image_h,
            width,
            height
        );

        let mut input = AugInput {
            image,
            annotations: annotations.clone(),
        };
        if let Some(augmentations) = &self.augmentations {
            augmentations.apply(&mut input, rng)?;
        }
        let AugInput { image, annotations } = input;

        Ok(Sample {
            image_id: image_id.clone(),
            image_path: image_path.clone(),
            height: *height,
            width: *width,
            image,
            annotations,
        })
    }
}

/// Loads batches of samples from a set of records.
#[derive(Debug, Clone)]
pub struct DataLoader {
    records: Arc<[DetectionRecord]>,
    mapper: Arc<DatasetMapper>,
    batch_size: NonZeroUsize,
    seed: u64,
}

impl DataLoader {
    /// The seed is drawn from entropy if not given.
    pub fn new(
        records: Arc<[DetectionRecord]>,
        mapper: DatasetMapper,
        batch_size: NonZeroUsize,
        seed: Option<u64>,
    ) -> Self {
        Self {
            records,
            mapper: Arc::new(mapper),
            batch_size,
            seed: seed.unwrap_or_else(rand::random),
        }
    }

    /// The number of batches in one pass, including the last partial batch.
    pub fn len(&self) -> usize {
        let batch_size = self.batch_size.get();
        (self.records.len() + batch_size - 1) / batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    /// One pass over the records in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Batch>> + '_ {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.records.chunks(self.batch_size.get()).map(move |chunk| {
            chunk
                .iter()
                .map(|record| self.mapper.map(record, &mut rng))
                .try_collect()
        })
    }

    /// An endless stream of batches. The records are reshuffled on every epoch.
    pub fn cycle(&self) -> Cycle {
        Cycle {
            records: self.records.clone(),
            mapper: self.mapper.clone(),
            batch_size: self.batch_size.get(),
            rng: StdRng::seed_from_u64(self.seed),
            order: vec![],
            cursor: 0,
            epoch: 0,
        }
    }
}

/// The iterator returned by [DataLoader::cycle].
#[derive(Debug)]
pub struct Cycle {
    records: Arc<[DetectionRecord]>,
    mapper: Arc<DatasetMapper>,
    batch_size: usize,
    rng: StdRng,
    order: Vec<usize>,
    cursor: usize,
    epoch: usize,
}

impl Cycle {
    /// The number of started epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    fn next_index(&mut self) -> usize {
        if self.cursor == self.order.len() {
            self.order = (0..self.records.len()).collect();
            self.order.shuffle(&mut self.rng);
            self.cursor = 0;
            self.epoch += 1;
        }
        let index = self.order[self.cursor];
        self.cursor += 1;
        index
    }
}

impl Iterator for Cycle {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.records.is_empty() {
            return None;
        }

        let indices = (0..self.batch_size)
            .map(|_| self.next_index())
            .collect_vec();
        let batch = indices
            .into_iter()
            .map(|index| self.mapper.map(&self.records[index], &mut self.rng))
            .try_collect();
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Polygon, TREE_CATEGORY_ID};
    use tempfile::TempDir;

    fn write_records(dir: &Path, count: usize) -> Vec<DetectionRecord> {
        (0..count)
            .map(|index| {
                let image_path = dir.join(format!("{}.png", index));
                RgbImage::from_pixel(6, 4, Rgb([index as u8, 0, 0]))
                    .save(&image_path)
                    .unwrap();
                let polygon = Polygon::from_points([[1.0, 1.0], [3.0, 1.0], [3.0, 2.0]]);
                DetectionRecord {
                    image_id: image_path.display().to_string(),
                    image_path,
                    height: 4,
                    width: 6,
                    annotations: vec![
                        Annotation::from_polygon(polygon, TREE_CATEGORY_ID).unwrap()
                    ],
                }
            })
            .collect()
    }

    fn loader(records: Vec<DetectionRecord>, batch_size: usize) -> DataLoader {
        DataLoader::new(
            records.into(),
            DatasetMapper::default(),
            NonZeroUsize::new(batch_size).unwrap(),
            Some(0),
        )
    }

    #[test]
    fn ordered_pass_test() {
        let dir = TempDir::new().unwrap();
        let loader = loader(write_records(dir.path(), 5), 2);
        assert_eq!(loader.len(), 3);

        let batches: Vec<Batch> = loader.iter().try_collect().unwrap();
        let sizes = batches.iter().map(|batch| batch.len()).collect_vec();
        assert_eq!(sizes, [2, 2, 1]);

        let reds = batches
            .iter()
            .flatten()
            .map(|sample| sample.image.get_pixel(0, 0).0[0])
            .collect_vec();
        assert_eq!(reds, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn cycle_covers_every_record_per_epoch() {
        let dir = TempDir::new().unwrap();
        let loader = loader(write_records(dir.path(), 3), 1);

        let mut cycle = loader.cycle();
        let ids: IndexSet<String> = (&mut cycle)
            .take(3)
            .map(|batch| batch.unwrap().remove(0).image_id)
            .collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(cycle.epoch(), 1);

        cycle.next().unwrap().unwrap();
        assert_eq!(cycle.epoch(), 2);
    }

    #[test]
    fn size_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let mut records = write_records(dir.path(), 1);
        records[0].height = 5;
        let loader = loader(records, 1);
        assert!(loader.iter().next().unwrap().is_err());
    }

    #[test]
    fn augmented_sample_keeps_source_size() {
        let dir = TempDir::new().unwrap();
        let records = write_records(dir.path(), 1);
        let mapper = DatasetMapper::new(Some(
            AugmentationList::new().push(crate::processor::Resize::new(8, 12).unwrap()),
        ));
        let mut rng = StdRng::seed_from_u64(0);
        let sample = mapper.map(&records[0], &mut rng).unwrap();

        assert_eq!(sample.image.dimensions(), (12, 8));
        assert_eq!((sample.width, sample.height), (6, 4));
        assert_eq!(sample.annotations[0].bbox().xyxy(), [2.0, 2.0, 6.0, 4.0]);
    }

    #[test]
    fn empty_loader_test() {
        let loader = loader(vec![], 2);
        assert_eq!(loader.len(), 0);
        assert!(loader.iter().next().is_none());
        assert!(loader.cycle().next().is_none());
    }
}
