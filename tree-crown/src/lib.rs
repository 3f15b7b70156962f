//! The training core for tree crown detection on aerial imagery.
//!
//! Label directories are parsed into [DetectionRecord](dataset::DetectionRecord)s,
//! registered in a [DatasetCatalog](dataset::DatasetCatalog) and assembled into a
//! [Trainer](engine::Trainer) by [TrainingRun](assembler::TrainingRun).

mod common;

pub mod assembler;
pub mod config;
pub mod data;
pub mod dataset;
pub mod engine;
pub mod evaluation;
pub mod model;
pub mod processor;
pub mod utils;

pub use assembler::TrainingRun;
pub use config::Config;
