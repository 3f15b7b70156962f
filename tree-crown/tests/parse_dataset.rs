mod common;

use anyhow::Result;
use bbox::prelude::*;
use common::{square, write_label_dir, LabeledImage};
use std::fs;
use tempfile::TempDir;
use tree_crown::dataset::{
    parse_tree_dir, register_tree_split, DatasetCatalog, DatasetStats, GeoAnnotationParser,
};

fn label_dir() -> Result<TempDir> {
    let dir = TempDir::new()?;
    write_label_dir(
        dir.path(),
        &[
            LabeledImage {
                name: "tile_b".into(),
                width: 64,
                height: 100,
                rings: vec![square(10.0, 30.0, 5.0), square(40.0, 60.0, 12.0)],
            },
            LabeledImage {
                name: "tile_a".into(),
                width: 50,
                height: 40,
                rings: vec![vec![[1.0, 2.0], [8.0, 2.0], [5.0, 9.0]]],
            },
            LabeledImage {
                name: "tile_c".into(),
                width: 20,
                height: 20,
                rings: vec![],
            },
        ],
    )?;
    Ok(dir)
}

#[test]
fn parse_directory_test() -> Result<()> {
    let dir = label_dir()?;
    let records = parse_tree_dir(dir.path())?;

    // one record per label file, in file name order
    assert_eq!(records.len(), 3);
    let names: Vec<_> = records
        .iter()
        .map(|record| {
            let file_name = record.image_path.file_name().unwrap();
            file_name.to_string_lossy().into_owned()
        })
        .collect();
    assert_eq!(names, ["tile_a.png", "tile_b.png", "tile_c.png"]);

    let counts: Vec<_> = records
        .iter()
        .map(|record| record.annotations.len())
        .collect();
    assert_eq!(counts, [1, 2, 0]);

    // sizes come from the rasters
    let tile_b = &records[1];
    assert_eq!((tile_b.width, tile_b.height), (64, 100));
    assert_eq!(tile_b.image_path, dir.path().join("tile_b.png"));

    // y is flipped against the image height
    let first = &tile_b.annotations[0];
    assert_eq!(&first.polygon().as_flat()[0..2], &[10.0, 70.0]);
    assert_eq!(first.bbox().xyxy(), [10.0, 65.0, 15.0, 70.0]);

    // every box is the envelope of its polygon
    records
        .iter()
        .flat_map(|record| &record.annotations)
        .for_each(|annotation| {
            assert_eq!(
                annotation.bbox().xyxy(),
                annotation.polygon().envelope().unwrap().xyxy()
            );
            assert_eq!(annotation.category_id(), 0);
            assert!(!annotation.is_crowd());
        });

    Ok(())
}

#[test]
fn parse_is_reproducible() -> Result<()> {
    let dir = label_dir()?;
    let parser = GeoAnnotationParser::default();
    let first = parser.parse(dir.path())?;
    let second = parser.parse(dir.path())?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn failing_label_file_aborts_directory() -> Result<()> {
    let dir = label_dir()?;
    fs::write(
        dir.path().join("tile_d.geojson"),
        r#"{ "imagePath": "missing.png", "features": [] }"#,
    )?;
    assert!(parse_tree_dir(dir.path()).is_err());
    Ok(())
}

#[test]
fn record_schema_test() -> Result<()> {
    let dir = label_dir()?;
    let records = parse_tree_dir(dir.path())?;
    let value = serde_json::to_value(&records[0])?;

    assert!(value["file_name"].as_str().unwrap().ends_with("tile_a.png"));
    assert_eq!(value["height"], 40);
    assert_eq!(value["width"], 50);

    let annotation = &value["annotations"][0];
    assert_eq!(annotation["bbox_mode"], "XYXY_ABS");
    assert_eq!(annotation["bbox"], serde_json::json!([1.0, 31.0, 8.0, 38.0]));
    assert_eq!(
        annotation["segmentation"],
        serde_json::json!([[1.0, 38.0, 8.0, 38.0, 5.0, 31.0]])
    );
    assert_eq!(annotation["category_id"], 0);
    assert_eq!(annotation["iscrowd"], 0);
    Ok(())
}

#[test]
fn register_split_test() -> Result<()> {
    let dir = label_dir()?;
    let split = tree_crown::config::SplitConfig {
        name: "tree_train".into(),
        dir: dir.path().to_owned(),
    };

    let mut catalog = DatasetCatalog::new();
    let count = register_tree_split(&mut catalog, &split, &GeoAnnotationParser::default())?;
    assert_eq!(count, 3);

    let records = catalog.get("tree_train")?;
    let stats = DatasetStats::from_records(&records);
    assert_eq!(stats.num_images, 3);
    assert_eq!(stats.num_annotations, 3);
    assert_eq!(stats.num_degenerate, 0);

    // a second registration under the same name is refused
    assert!(register_tree_split(&mut catalog, &split, &GeoAnnotationParser::default()).is_err());
    Ok(())
}
