//! Dataset processing toolkit.

mod catalog;
mod geojson;
mod record;

pub use catalog::*;
pub use geojson::*;
pub use record::*;
