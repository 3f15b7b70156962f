use crate::common::*;

/// The category id of tree crowns, the only class in this domain.
pub const TREE_CATEGORY_ID: usize = 0;

/// The class names indexed by category id.
pub const TREE_CLASSES: &[&str] = &["tree"];

/// A polygon ring stored as flat `[x1, y1, x2, y2, ...]` pixel coordinates.
///
/// The ring is kept as given by the source geometry, closed or open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Polygon(Vec<f64>);

impl Polygon {
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        Self(points.into_iter().flatten().collect())
    }

    pub fn as_flat(&self) -> &[f64] {
        &self.0
    }

    pub fn num_vertices(&self) -> usize {
        self.0.len() / 2
    }

    /// Polygons with fewer than 3 vertices have no area.
    pub fn is_degenerate(&self) -> bool {
        self.num_vertices() < 3
    }

    pub fn points(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.0.chunks_exact(2).map(|xy| [xy[0], xy[1]])
    }

    pub fn map_points<F>(&self, f: F) -> Self
    where
        F: FnMut([f64; 2]) -> [f64; 2],
    {
        Self::from_points(self.points().map(f))
    }

    pub fn envelope(&self) -> Result<XYXY<f64>> {
        XYXY::envelope(self.points())
    }
}

impl TryFrom<Vec<f64>> for Polygon {
    type Error = Error;

    fn try_from(flat: Vec<f64>) -> Result<Self, Self::Error> {
        ensure!(
            flat.len() % 2 == 0,
            "polygon must have an even number of coordinates, but get {}",
            flat.len()
        );
        Ok(Self(flat))
    }
}

impl From<Polygon> for Vec<f64> {
    fn from(from: Polygon) -> Self {
        from.0
    }
}

/// One polygon instance with its bounding box.
///
/// The bounding box is always the axis-aligned envelope of the polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AnnotationRepr", into = "AnnotationRepr")]
pub struct Annotation {
    bbox: XYXY<f64>,
    polygon: Polygon,
    category_id: usize,
    is_crowd: bool,
}

impl Annotation {
    /// Build an annotation whose box is the envelope of `polygon`.
    pub fn from_polygon(polygon: Polygon, category_id: usize) -> Result<Self> {
        let bbox = polygon.envelope()?;
        Ok(Self {
            bbox,
            polygon,
            category_id,
            is_crowd: false,
        })
    }

    pub fn bbox(&self) -> &XYXY<f64> {
        &self.bbox
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn category_id(&self) -> usize {
        self.category_id
    }

    pub fn is_crowd(&self) -> bool {
        self.is_crowd
    }

    /// Map every vertex and rebuild the box from the moved polygon.
    pub fn map_points<F>(&self, f: F) -> Result<Self>
    where
        F: FnMut([f64; 2]) -> [f64; 2],
    {
        Self::from_polygon(self.polygon.map_points(f), self.category_id)
    }
}

/// The serialized form of [Annotation].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnnotationRepr {
    bbox: [f64; 4],
    bbox_mode: BoxMode,
    segmentation: Vec<Polygon>,
    category_id: usize,
    iscrowd: u8,
}

impl From<Annotation> for AnnotationRepr {
    fn from(from: Annotation) -> Self {
        let Annotation {
            bbox,
            polygon,
            category_id,
            is_crowd,
        } = from;

        Self {
            bbox: bbox.into(),
            bbox_mode: BoxMode::XyxyAbs,
            segmentation: vec![polygon],
            category_id,
            iscrowd: is_crowd as u8,
        }
    }
}

impl TryFrom<AnnotationRepr> for Annotation {
    type Error = Error;

    fn try_from(from: AnnotationRepr) -> Result<Self, Self::Error> {
        let AnnotationRepr {
            bbox,
            bbox_mode,
            segmentation,
            category_id,
            iscrowd,
        } = from;

        let polygon = match <[Polygon; 1]>::try_from(segmentation) {
            Ok([polygon]) => polygon,
            Err(segmentation) => bail!(
                "expect exactly one segmentation polygon, but get {}",
                segmentation.len()
            ),
        };
        let annotation = Self {
            is_crowd: iscrowd != 0,
            ..Self::from_polygon(polygon, category_id)?
        };

        let given = XYXY::try_from_xyxy(bbox_mode.convert(bbox, BoxMode::XyxyAbs))
            .with_context(|| format!("invalid {:?} bbox {:?}", bbox_mode, bbox))?
            .xyxy();
        let expect = annotation.bbox.xyxy();
        ensure!(
            izip!(given, expect).all(|(lhs, rhs)| (lhs - rhs).abs() <= 1e-6),
            "bbox {:?} is not the envelope {:?} of its polygon",
            given,
            expect
        );

        Ok(annotation)
    }
}

/// The annotations of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(rename = "file_name")]
    pub image_path: PathBuf,
    pub height: usize,
    pub width: usize,
    pub image_id: String,
    pub annotations: Vec<Annotation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_points_test() {
        let polygon = Polygon::from_points([[1.0, 2.0], [3.0, 4.0], [5.0, 0.0]]);
        assert_eq!(polygon.as_flat(), &[1.0, 2.0, 3.0, 4.0, 5.0, 0.0]);
        assert_eq!(polygon.num_vertices(), 3);
        assert!(!polygon.is_degenerate());
        assert_eq!(polygon.envelope().unwrap().xyxy(), [1.0, 0.0, 5.0, 4.0]);
        assert!(Polygon::try_from(vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn annotation_schema_test() {
        let polygon = Polygon::from_points([[10.0, 70.0], [20.0, 70.0], [20.0, 90.0]]);
        let annotation = Annotation::from_polygon(polygon, TREE_CATEGORY_ID).unwrap();
        let value = serde_json::to_value(&annotation).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "bbox": [10.0, 70.0, 20.0, 90.0],
                "bbox_mode": "XYXY_ABS",
                "segmentation": [[10.0, 70.0, 20.0, 70.0, 20.0, 90.0]],
                "category_id": 0,
                "iscrowd": 0,
            })
        );

        let parsed: Annotation = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, annotation);
    }

    #[test]
    fn annotation_rejects_mismatched_bbox() {
        let value = serde_json::json!({
            "bbox": [0.0, 0.0, 1.0, 1.0],
            "bbox_mode": "XYXY_ABS",
            "segmentation": [[10.0, 70.0, 20.0, 70.0, 20.0, 90.0]],
            "category_id": 0,
            "iscrowd": 0,
        });
        assert!(serde_json::from_value::<Annotation>(value).is_err());

        // corners in the wrong order
        let value = serde_json::json!({
            "bbox": [20.0, 90.0, 10.0, 70.0],
            "bbox_mode": "XYXY_ABS",
            "segmentation": [[10.0, 70.0, 20.0, 70.0, 20.0, 90.0]],
            "category_id": 0,
            "iscrowd": 0,
        });
        assert!(serde_json::from_value::<Annotation>(value).is_err());

        let value = serde_json::json!({
            "bbox": [10.0, 70.0, 10.0, 20.0],
            "bbox_mode": "XYWH_ABS",
            "segmentation": [[10.0, 70.0, 20.0, 70.0, 20.0, 90.0]],
            "category_id": 0,
            "iscrowd": 0,
        });
        assert!(serde_json::from_value::<Annotation>(value).is_ok());
    }
}
