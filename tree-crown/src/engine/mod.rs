//! The training loop and its hooks.

pub mod comm;
mod events;
mod hooks;
mod loss_eval;
mod trainer;

pub use comm::{launch, GroupWorker, LocalWorker, Synchronize, WorkerGroup};
pub use events::*;
pub use hooks::*;
pub use loss_eval::*;
pub use trainer::*;
