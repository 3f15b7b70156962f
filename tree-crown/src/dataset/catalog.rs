use super::{DetectionRecord, GeoAnnotationParser, TREE_CLASSES};
use crate::{common::*, config::SplitConfig};

/// Descriptive information attached to a registered dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// The class names indexed by category id.
    pub thing_classes: Vec<String>,
    /// The kind of evaluator that understands this dataset.
    pub evaluator_type: String,
}

impl DatasetMetadata {
    /// The metadata of tree crown datasets.
    pub fn tree_crowns() -> Self {
        Self {
            thing_classes: TREE_CLASSES.iter().map(|name| name.to_string()).collect(),
            evaluator_type: "coco".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    records: Arc<[DetectionRecord]>,
    metadata: DatasetMetadata,
}

/// The in-memory registry of named datasets.
///
/// The catalog is an explicit value passed to whoever needs it.
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    entries: IndexMap<String, CatalogEntry>,
}

impl DatasetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the records under a unique name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        records: Vec<DetectionRecord>,
        metadata: DatasetMetadata,
    ) -> Result<()> {
        let name = name.into();
        ensure!(
            !self.entries.contains_key(&name),
            "dataset '{}' is already registered",
            name
        );
        debug!("register dataset '{}' with {} records", name, records.len());
        self.entries.insert(
            name,
            CatalogEntry {
                records: records.into(),
                metadata,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<[DetectionRecord]>> {
        Ok(self.entry(name)?.records.clone())
    }

    pub fn metadata(&self, name: &str) -> Result<&DatasetMetadata> {
        Ok(&self.entry(name)?.metadata)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn entry(&self, name: &str) -> Result<&CatalogEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| format_err!("dataset '{}' is not registered", name))
    }
}

/// Parse the directory of a split and register it under the split name.
///
/// Returns the number of registered records.
pub fn register_tree_split(
    catalog: &mut DatasetCatalog,
    split: &SplitConfig,
    parser: &GeoAnnotationParser,
) -> Result<usize> {
    let SplitConfig { name, dir } = split;
    let records = parser.parse(dir)?;
    let num_records = records.len();
    catalog.register(name.clone(), records, DatasetMetadata::tree_crowns())?;
    Ok(num_records)
}

/// Summary counts of a set of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DatasetStats {
    pub num_images: usize,
    pub num_annotations: usize,
    pub num_degenerate: usize,
}

impl DatasetStats {
    pub fn from_records(records: &[DetectionRecord]) -> Self {
        records
            .iter()
            .flat_map(|record| &record.annotations)
            .fold(
                Self {
                    num_images: records.len(),
                    ..Default::default()
                },
                |mut stats, annotation| {
                    stats.num_annotations += 1;
                    if annotation.polygon().is_degenerate() {
                        stats.num_degenerate += 1;
                    }
                    stats
                },
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Annotation, Polygon, TREE_CATEGORY_ID};

    fn record(name: &str, polygons: &[&[[f64; 2]]]) -> DetectionRecord {
        DetectionRecord {
            image_path: PathBuf::from(name),
            height: 10,
            width: 10,
            image_id: name.to_string(),
            annotations: polygons
                .iter()
                .map(|points| {
                    Annotation::from_polygon(
                        Polygon::from_points(points.iter().copied()),
                        TREE_CATEGORY_ID,
                    )
                    .unwrap()
                })
                .collect(),
        }
    }

    #[test]
    fn register_and_get_test() {
        let mut catalog = DatasetCatalog::new();
        catalog
            .register(
                "tree_train",
                vec![record("a.png", &[])],
                DatasetMetadata::tree_crowns(),
            )
            .unwrap();

        assert!(catalog.contains("tree_train"));
        assert_eq!(catalog.get("tree_train").unwrap().len(), 1);
        assert_eq!(
            catalog.metadata("tree_train").unwrap().thing_classes,
            ["tree"]
        );
        assert!(catalog.get("tree_val").is_err());
        assert_eq!(catalog.names().collect_vec(), ["tree_train"]);
    }

    #[test]
    fn duplicated_registration_fails() {
        let mut catalog = DatasetCatalog::new();
        catalog
            .register("trees", vec![], DatasetMetadata::tree_crowns())
            .unwrap();
        assert!(catalog
            .register("trees", vec![], DatasetMetadata::tree_crowns())
            .is_err());
    }

    #[test]
    fn stats_test() {
        let records = vec![
            record("a.png", &[&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]], &[[2.0, 2.0]]]),
            record("b.png", &[]),
        ];
        let stats = DatasetStats::from_records(&records);
        assert_eq!(
            stats,
            DatasetStats {
                num_images: 2,
                num_annotations: 2,
                num_degenerate: 1,
            }
        );
    }
}
