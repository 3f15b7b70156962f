//! Safe bounding box types and functions.

mod common;

pub use rect::*;
pub mod rect;

pub use xyxy::*;
pub mod xyxy;

pub use box_mode::*;
pub mod box_mode;

pub use transform::*;
mod transform;

pub mod prelude {
    pub use crate::rect::{Rect, RectNum};
}
