use super::{Annotation, DetectionRecord, Polygon, TREE_CATEGORY_ID};
use crate::common::*;

/// The default bound of the image id length.
pub const DEFAULT_MAX_IMAGE_ID_LEN: usize = 400;

/// The label file extension.
pub const LABEL_FILE_EXTENSION: &str = "geojson";

/// The per-image label file.
#[derive(Debug, Clone, Deserialize)]
struct LabelFile {
    #[serde(rename = "imagePath")]
    image_path: PathBuf,
    features: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
struct Feature {
    geometry: Geometry,
}

/// A polygon geometry. Each ring is a sequence of positions, and each position
/// carries at least x and y.
#[derive(Debug, Clone, Deserialize)]
struct Geometry {
    coordinates: Vec<Vec<Vec<f64>>>,
}

/// Converts a directory of GeoJSON label files into detection records.
///
/// Label geometries have the y axis pointing up from the bottom edge of the
/// raster, so every vertex is mapped to `(x, height - y)`.
#[derive(Debug, Clone)]
pub struct GeoAnnotationParser {
    max_image_id_len: usize,
}

impl Default for GeoAnnotationParser {
    fn default() -> Self {
        Self {
            max_image_id_len: DEFAULT_MAX_IMAGE_ID_LEN,
        }
    }
}

impl GeoAnnotationParser {
    pub fn new(max_image_id_len: usize) -> Result<Self> {
        ensure!(max_image_id_len > 0, "max_image_id_len must be positive");
        Ok(Self { max_image_id_len })
    }

    pub fn max_image_id_len(&self) -> usize {
        self.max_image_id_len
    }

    /// List the label files of a directory in file name order.
    pub fn label_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        ensure!(
            dir.is_dir(),
            "the label directory '{}' does not exist",
            dir.display()
        );
        let dir_str = dir
            .to_str()
            .ok_or_else(|| format_err!("non-unicode path '{}'", dir.display()))?;
        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(dir_str),
            LABEL_FILE_EXTENSION
        );

        let paths: Vec<_> = glob::glob(&pattern)?.try_collect()?;
        Ok(paths)
    }

    /// Parse every label file in `dir`.
    ///
    /// A single unreadable label file or raster fails the whole directory.
    pub fn parse(&self, dir: impl AsRef<Path>) -> Result<Vec<DetectionRecord>> {
        let dir = dir.as_ref();
        let _span = info_span!("parse_labels", dir = %dir.display()).entered();

        let records: Vec<_> = Self::label_files(dir)?
            .into_iter()
            .map(|label_file| {
                self.parse_label_file(dir, &label_file)
                    .with_context(|| format!("failed to parse '{}'", label_file.display()))
            })
            .try_collect()?;

        info!(
            "loaded {} records with {} annotations from '{}'",
            records.len(),
            records
                .iter()
                .map(|record| record.annotations.len())
                .sum::<usize>(),
            dir.display()
        );

        Ok(records)
    }

    /// Parse one label file. Relative image paths are resolved against `dir`.
    pub fn parse_label_file(&self, dir: &Path, label_file: &Path) -> Result<DetectionRecord> {
        let LabelFile {
            image_path,
            features,
        } = {
            let text = fs::read_to_string(label_file)?;
            serde_json::from_str(&text)?
        };
        let image_path = dir.join(image_path);

        // the decoded raster is the source of truth of the image size
        let (width, height) = image::open(&image_path)
            .with_context(|| format!("failed to read image '{}'", image_path.display()))?
            .dimensions();
        let (width, height) = (width as usize, height as usize);
        let flip = Transform::vertical_flip(height as f64);

        let annotations: Vec<_> = features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| -> Result<_> {
                let ring = feature
                    .geometry
                    .coordinates
                    .into_iter()
                    .next()
                    .ok_or_else(|| format_err!("feature {} has no coordinate ring", index))?;
                let points: Vec<_> = ring
                    .into_iter()
                    .map(|position| -> Result<_> {
                        match *position.as_slice() {
                            [x, y, ..] => Ok(flip.apply_point([x, y])),
                            _ => bail!("feature {} has a position with less than 2 values", index),
                        }
                    })
                    .try_collect()?;

                let polygon = Polygon::from_points(points);
                if polygon.is_degenerate() {
                    warn!(
                        "feature {} in '{}' is degenerate with {} vertices",
                        index,
                        label_file.display(),
                        polygon.num_vertices()
                    );
                }

                Annotation::from_polygon(polygon, TREE_CATEGORY_ID)
                    .with_context(|| format!("invalid geometry in feature {}", index))
            })
            .try_collect()?;

        let image_id: String = image_path
            .to_string_lossy()
            .chars()
            .take(self.max_image_id_len)
            .collect();

        Ok(DetectionRecord {
            image_path,
            height,
            width,
            image_id,
            annotations,
        })
    }
}

/// Parse a label directory with default options.
pub fn parse_tree_dir(dir: impl AsRef<Path>) -> Result<Vec<DetectionRecord>> {
    GeoAnnotationParser::default().parse(dir)
}
