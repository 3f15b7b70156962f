//! Data augmentation building blocks.

pub mod augmentation;
pub mod color_jitter;
pub mod flip;
pub mod lighting;
pub mod resize;
pub mod rotation;

pub use augmentation::*;
pub use color_jitter::*;
pub use flip::*;
pub use lighting::*;
pub use resize::*;
pub use rotation::*;
