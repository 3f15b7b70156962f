use anyhow::{Context, Result};
use prettytable::{cell, row, Table};
use std::{
    env,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};
use tree_crown::{
    config::Config,
    dataset::{register_tree_split, DatasetCatalog, DatasetStats, GeoAnnotationParser},
    engine::load_json_arr,
};

#[derive(Debug, Clone, StructOpt)]
/// Tree crown dataset and training log tools
enum Opts {
    /// Convert a directory of GeoJSON label files into detection records
    Parse {
        /// label directory
        dir: PathBuf,
        #[structopt(long)]
        /// output JSON file, print to stdout if not set
        output: Option<PathBuf>,
        #[structopt(long, default_value = "400")]
        /// maximum number of characters in an image id
        max_image_id_len: usize,
    },
    /// Register the dataset splits of a training config and print their statistics
    Inspect {
        #[structopt(long, default_value = "train.json5")]
        /// configuration file
        config_file: PathBuf,
    },
    /// Print the losses recorded in a metrics log
    Metrics {
        /// line-delimited JSON metrics file
        metrics_file: PathBuf,
    },
}

fn main() -> Result<()> {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(io::stderr)
        .compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    match Opts::from_args() {
        Opts::Parse {
            dir,
            output,
            max_image_id_len,
        } => {
            parse(dir, output, max_image_id_len)?;
        }
        Opts::Inspect { config_file } => {
            inspect(config_file)?;
        }
        Opts::Metrics { metrics_file } => {
            metrics(metrics_file)?;
        }
    }

    Ok(())
}

fn parse(dir: impl AsRef<Path>, output: Option<PathBuf>, max_image_id_len: usize) -> Result<()> {
    let parser = GeoAnnotationParser::new(max_image_id_len)?;
    let records = parser.parse(dir)?;

    match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("failed to create '{}'", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &records)?;
            writer.flush()?;
            info!("wrote {} records to '{}'", records.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, &records)?;
            writeln!(writer)?;
        }
    }

    Ok(())
}

fn inspect(config_file: impl AsRef<Path>) -> Result<()> {
    let config_file = config_file.as_ref();
    let config = Config::open(config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))?;
    let parser = GeoAnnotationParser::new(config.input.max_image_id_len)?;

    let mut catalog = DatasetCatalog::new();
    let splits = [
        ("train", &config.datasets.train),
        ("test", &config.datasets.test),
    ];

    let mut table = Table::new();
    table.add_row(row!["split", "name", "dir", "images", "annotations", "degenerate"]);

    for (kind, split) in splits {
        register_tree_split(&mut catalog, split, &parser)?;
        let records = catalog.get(&split.name)?;
        let DatasetStats {
            num_images,
            num_annotations,
            num_degenerate,
        } = DatasetStats::from_records(&records);

        table.add_row(row![
            kind,
            split.name,
            split.dir.display(),
            num_images,
            num_annotations,
            num_degenerate
        ]);
    }

    table.printstd();
    Ok(())
}

fn metrics(metrics_file: impl AsRef<Path>) -> Result<()> {
    let lines = load_json_arr(metrics_file)?;

    let format_value = |value: Option<&f64>| {
        value
            .map(|value| format!("{:.4}", value))
            .unwrap_or_else(|| "-".to_string())
    };

    let mut table = Table::new();
    table.add_row(row!["iteration", "total_loss", "validation_loss"]);

    lines
        .iter()
        .filter(|line| line.contains_key("total_loss") || line.contains_key("validation_loss"))
        .for_each(|line| {
            let iteration = line
                .get("iteration")
                .map(|&iteration| format!("{}", iteration as usize))
                .unwrap_or_else(|| "-".to_string());
            table.add_row(row![
                iteration,
                format_value(line.get("total_loss")),
                format_value(line.get("validation_loss"))
            ]);
        });

    table.printstd();
    Ok(())
}
